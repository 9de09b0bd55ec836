//! Shared fixtures: a pre-populated registry and gateway constructors

use gateway_config::RuntimeConfig;
use runtime_gateway::{
    current_actor, FunctionRegistry, Gateway, GatewayBuilder, LocalModeRuntime, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Stateful actor used across scenarios
pub struct Counter {
    pub value: i64,
    pub history: Vec<i64>,
}

/// Registry with the functions and actor classes the scenarios use
pub fn registry() -> Result<FunctionRegistry> {
    let registry = FunctionRegistry::new();

    registry.register_function("add_one", |(x,): (i64,)| x + 1)?;
    registry.register_function("add", |(a, b): (i64, i64)| a + b)?;
    registry.register_function("sum", |(values,): (Vec<i64>,)| values.iter().sum::<i64>())?;
    registry.register_function("sleep_then", |(millis, value): (u64, i64)| {
        std::thread::sleep(Duration::from_millis(millis));
        value
    })?;
    registry.register_fallible_function("divide", |(a, b): (i64, i64)| {
        if b == 0 {
            Err("division by zero")
        } else {
            Ok(a / b)
        }
    })?;
    registry.register_function("crash", |(): ()| -> i64 { panic!("worker lost") })?;

    registry.register_actor("Counter", |(start,): (i64,)| Counter {
        value: start,
        history: Vec::new(),
    })?;
    registry.register_method("Counter.incr", |c: &mut Counter, (by,): (i64,)| {
        c.value += by;
        c.value
    })?;
    registry.register_method("Counter.record", |c: &mut Counter, (x,): (i64,)| {
        c.history.push(x);
        c.history.clone()
    })?;
    registry.register_shared_method("Counter.value", |c: &Counter, (): ()| c.value)?;
    registry.register_method("Counter.restarted", |_: &mut Counter, (): ()| {
        current_actor().map(|ctx| ctx.was_restarted()).unwrap_or(false)
    })?;
    registry.register_method("Counter.exit", |c: &mut Counter, (): ()| {
        if let Some(ctx) = current_actor() {
            ctx.request_exit();
        }
        c.value
    })?;
    registry.register_method("Counter.crash", |_: &mut Counter, (): ()| -> i64 {
        panic!("counter state corrupted")
    })?;

    Ok(registry)
}

/// Local-mode configuration with a four CPU node
pub fn local_config() -> RuntimeConfig {
    RuntimeConfig {
        resources: HashMap::from([("CPU".to_string(), 4.0)]),
        shutdown_grace_ms: 1_000,
        ..RuntimeConfig::default()
    }
}

pub fn local_gateway() -> Result<Gateway> {
    GatewayBuilder::new(local_config())
        .registry(registry()?)
        .build()
}

/// Gateway plus direct access to the local runtime for failure injection
pub fn local_runtime() -> Result<(Gateway, Arc<LocalModeRuntime>)> {
    let config = local_config();
    let runtime = Arc::new(LocalModeRuntime::new(&config, Arc::new(registry()?))?);
    Ok((Gateway::with_runtime(runtime.clone(), config), runtime))
}
