//! Function Registry
//!
//! Explicit table from callable name to the code that runs it. Functions,
//! actor classes and actor methods are registered up front; submissions
//! resolve a name into a [`RemoteFunctionHandle`] and fail fast when the
//! name is missing, before anything is dispatched.

use crate::error::{GatewayError, Result};
use dashmap::DashMap;
use gateway_types::{encode, Bytes, FromArgs};
use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Type-erased actor instance owned by the actor's task loop
pub type ActorInstance = Box<dyn Any + Send + Sync>;

pub(crate) type TaskFn =
    Arc<dyn Fn(&[Bytes]) -> std::result::Result<Bytes, String> + Send + Sync>;
pub(crate) type ActorFactory =
    Arc<dyn Fn(&[Bytes]) -> std::result::Result<ActorInstance, String> + Send + Sync>;
pub(crate) type ExclusiveMethod = Arc<
    dyn Fn(&mut ActorInstance, &[Bytes]) -> std::result::Result<Bytes, String> + Send + Sync,
>;
pub(crate) type SharedMethod =
    Arc<dyn Fn(&ActorInstance, &[Bytes]) -> std::result::Result<Bytes, String> + Send + Sync>;

/// Actor method body; shared methods may overlap when concurrency allows
#[derive(Clone)]
pub(crate) enum MethodFn {
    Exclusive(ExclusiveMethod),
    Shared(SharedMethod),
}

/// What a registered name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Function,
    ActorClass,
    ActorMethod,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Function => f.write_str("function"),
            FunctionKind::ActorClass => f.write_str("actor class"),
            FunctionKind::ActorMethod => f.write_str("actor method"),
        }
    }
}

/// Resolved reference to a registered callable
///
/// Only [`FunctionRegistry::resolve`] hands these out, so a handle always
/// names something that was registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteFunctionHandle {
    name: String,
    kind: FunctionKind,
    arity: usize,
}

impl RemoteFunctionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// Positional arguments the callable expects
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub(crate) fn expect_kind(&self, kind: FunctionKind) -> Result<()> {
        if self.kind != kind {
            return Err(GatewayError::invalid_argument(format!(
                "'{}' is registered as a {}, not a {}",
                self.name, self.kind, kind
            )));
        }
        Ok(())
    }

    pub(crate) fn check_arity(&self, supplied: usize) -> Result<()> {
        if supplied != self.arity {
            return Err(GatewayError::invalid_argument(format!(
                "'{}' takes {} arguments, {} supplied",
                self.name, self.arity, supplied
            )));
        }
        Ok(())
    }
}

impl fmt::Display for RemoteFunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

#[derive(Clone)]
pub(crate) enum Callable {
    Function(TaskFn),
    ActorClass {
        state_type: TypeId,
        factory: ActorFactory,
    },
    ActorMethod {
        state_type: TypeId,
        method: MethodFn,
    },
}

impl Callable {
    fn kind(&self) -> FunctionKind {
        match self {
            Callable::Function(_) => FunctionKind::Function,
            Callable::ActorClass { .. } => FunctionKind::ActorClass,
            Callable::ActorMethod { .. } => FunctionKind::ActorMethod,
        }
    }
}

#[derive(Clone)]
struct Entry {
    arity: usize,
    callable: Callable,
}

/// Name to callable table shared by the gateway and its runtime
#[derive(Default)]
pub struct FunctionRegistry {
    entries: DashMap<String, Entry>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plain function taking a tuple of arguments
    ///
    /// ```rust
    /// use runtime_gateway::FunctionRegistry;
    ///
    /// let registry = FunctionRegistry::new();
    /// let handle = registry
    ///     .register_function("add", |(a, b): (i64, i64)| a + b)
    ///     .unwrap();
    /// assert_eq!(handle.arity(), 2);
    /// assert!(registry.resolve("add").is_ok());
    /// ```
    pub fn register_function<A, R, F>(&self, name: &str, f: F) -> Result<RemoteFunctionHandle>
    where
        A: FromArgs,
        R: Serialize,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.register_fallible_function(name, move |args: A| {
            Ok::<R, std::convert::Infallible>(f(args))
        })
    }

    /// Register a function whose error becomes the task's failure message
    pub fn register_fallible_function<A, R, E, F>(
        &self,
        name: &str,
        f: F,
    ) -> Result<RemoteFunctionHandle>
    where
        A: FromArgs,
        R: Serialize,
        E: fmt::Display,
        F: Fn(A) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        let task: TaskFn = Arc::new(move |payloads: &[Bytes]| {
            let args = A::from_args(payloads).map_err(|e| e.to_string())?;
            let value = f(args).map_err(|e| e.to_string())?;
            encode(&value).map_err(|e| e.to_string())
        });
        self.insert(name, A::ARITY, Callable::Function(task))
    }

    /// Register an actor class by its constructor
    pub fn register_actor<S, A, F>(&self, name: &str, ctor: F) -> Result<RemoteFunctionHandle>
    where
        S: Send + Sync + 'static,
        A: FromArgs,
        F: Fn(A) -> S + Send + Sync + 'static,
    {
        self.register_fallible_actor(name, move |args: A| {
            Ok::<S, std::convert::Infallible>(ctor(args))
        })
    }

    /// Register an actor class whose constructor may refuse to build
    pub fn register_fallible_actor<S, A, E, F>(
        &self,
        name: &str,
        ctor: F,
    ) -> Result<RemoteFunctionHandle>
    where
        S: Send + Sync + 'static,
        A: FromArgs,
        E: fmt::Display,
        F: Fn(A) -> std::result::Result<S, E> + Send + Sync + 'static,
    {
        let factory: ActorFactory = Arc::new(move |payloads: &[Bytes]| {
            let args = A::from_args(payloads).map_err(|e| e.to_string())?;
            let state = ctor(args).map_err(|e| e.to_string())?;
            Ok(Box::new(state) as ActorInstance)
        });
        self.insert(
            name,
            A::ARITY,
            Callable::ActorClass {
                state_type: TypeId::of::<S>(),
                factory,
            },
        )
    }

    /// Register a method that needs exclusive access to actor state `S`
    pub fn register_method<S, A, R, F>(&self, name: &str, f: F) -> Result<RemoteFunctionHandle>
    where
        S: Send + Sync + 'static,
        A: FromArgs,
        R: Serialize,
        F: Fn(&mut S, A) -> R + Send + Sync + 'static,
    {
        self.register_fallible_method(name, move |state: &mut S, args: A| {
            Ok::<R, std::convert::Infallible>(f(state, args))
        })
    }

    pub fn register_fallible_method<S, A, R, E, F>(
        &self,
        name: &str,
        f: F,
    ) -> Result<RemoteFunctionHandle>
    where
        S: Send + Sync + 'static,
        A: FromArgs,
        R: Serialize,
        E: fmt::Display,
        F: Fn(&mut S, A) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        let method_name = name.to_string();
        let method: ExclusiveMethod =
            Arc::new(move |instance: &mut ActorInstance, payloads: &[Bytes]| {
                let state = instance
                    .downcast_mut::<S>()
                    .ok_or_else(|| wrong_class(&method_name))?;
                let args = A::from_args(payloads).map_err(|e| e.to_string())?;
                let value = f(state, args).map_err(|e| e.to_string())?;
                encode(&value).map_err(|e| e.to_string())
            });
        self.insert(
            name,
            A::ARITY,
            Callable::ActorMethod {
                state_type: TypeId::of::<S>(),
                method: MethodFn::Exclusive(method),
            },
        )
    }

    /// Register a read-only method; calls may run in parallel on actors
    /// created with `max_concurrency > 1`
    pub fn register_shared_method<S, A, R, F>(
        &self,
        name: &str,
        f: F,
    ) -> Result<RemoteFunctionHandle>
    where
        S: Send + Sync + 'static,
        A: FromArgs,
        R: Serialize,
        F: Fn(&S, A) -> R + Send + Sync + 'static,
    {
        let method_name = name.to_string();
        let method: SharedMethod = Arc::new(move |instance: &ActorInstance, payloads: &[Bytes]| {
            let state = instance
                .downcast_ref::<S>()
                .ok_or_else(|| wrong_class(&method_name))?;
            let args = A::from_args(payloads).map_err(|e| e.to_string())?;
            encode(&f(state, args)).map_err(|e| e.to_string())
        });
        self.insert(
            name,
            A::ARITY,
            Callable::ActorMethod {
                state_type: TypeId::of::<S>(),
                method: MethodFn::Shared(method),
            },
        )
    }

    fn insert(&self, name: &str, arity: usize, callable: Callable) -> Result<RemoteFunctionHandle> {
        if name.trim().is_empty() {
            return Err(GatewayError::invalid_argument("callable name cannot be empty"));
        }

        let kind = callable.kind();
        match self.entries.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(GatewayError::invalid_argument(format!(
                    "'{}' is already registered",
                    name
                )))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Entry { arity, callable });
                debug!(callable = name, %kind, arity, "Registered callable");
                Ok(RemoteFunctionHandle {
                    name: name.to_string(),
                    kind,
                    arity,
                })
            }
        }
    }

    /// Look a name up; unknown names fail with `UnregisteredFunction`
    pub fn resolve(&self, name: &str) -> Result<RemoteFunctionHandle> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| GatewayError::unregistered(name))?;
        Ok(RemoteFunctionHandle {
            name: name.to_string(),
            kind: entry.callable.kind(),
            arity: entry.arity,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn callable(&self, handle: &RemoteFunctionHandle) -> Result<Callable> {
        self.entries
            .get(handle.name())
            .map(|entry| entry.callable.clone())
            .ok_or_else(|| GatewayError::unregistered(handle.name()))
    }

    pub(crate) fn task_fn(&self, handle: &RemoteFunctionHandle) -> Result<TaskFn> {
        handle.expect_kind(FunctionKind::Function)?;
        match self.callable(handle)? {
            Callable::Function(task) => Ok(task),
            _ => Err(GatewayError::unregistered(handle.name())),
        }
    }

    pub(crate) fn actor_factory(
        &self,
        handle: &RemoteFunctionHandle,
    ) -> Result<(TypeId, ActorFactory)> {
        handle.expect_kind(FunctionKind::ActorClass)?;
        match self.callable(handle)? {
            Callable::ActorClass {
                state_type,
                factory,
            } => Ok((state_type, factory)),
            _ => Err(GatewayError::unregistered(handle.name())),
        }
    }

    pub(crate) fn actor_method(&self, handle: &RemoteFunctionHandle) -> Result<(TypeId, MethodFn)> {
        handle.expect_kind(FunctionKind::ActorMethod)?;
        match self.callable(handle)? {
            Callable::ActorMethod { state_type, method } => Ok((state_type, method)),
            _ => Err(GatewayError::unregistered(handle.name())),
        }
    }
}

fn wrong_class(method: &str) -> String {
    format!("method '{}' called on an actor of another class", method)
}
