//! Runtime Configuration Module
//!
//! Loads gateway settings from an optional TOML file, then applies
//! environment overrides (`GATEWAY_` prefix) on top of built-in defaults.

use crate::defaults;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Which runtime variant backs the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Everything in-process; no cluster required
    #[default]
    Local,
    /// Storage and execution delegated to a cluster client
    Cluster,
}

impl FromStr for RuntimeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(RuntimeMode::Local),
            "cluster" => Ok(RuntimeMode::Cluster),
            other => bail!("Unknown runtime mode '{}' (expected 'local' or 'cluster')", other),
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeMode::Local => f.write_str("local"),
            RuntimeMode::Cluster => f.write_str("cluster"),
        }
    }
}

/// Gateway settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub mode: RuntimeMode,

    /// Cluster address handed to the cluster client; `"local"` forces local mode
    pub address: Option<String>,

    /// Scope for global actor names
    pub namespace: String,

    pub log_level: String,

    /// Resources advertised by the local-mode node
    pub resources: HashMap<String, f64>,

    pub default_task_retries: u32,
    pub default_max_pending_calls: usize,
    pub wait_poll_interval_ms: u64,
    pub shutdown_grace_ms: u64,

    /// Local object store budget; unlimited when absent
    pub object_store_memory_bytes: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::Local,
            address: None,
            namespace: defaults::DEFAULT_NAMESPACE.to_string(),
            log_level: defaults::DEFAULT_LOG_LEVEL.to_string(),
            resources: HashMap::from([("CPU".to_string(), defaults::node::DEFAULT_CPUS)]),
            default_task_retries: defaults::tasks::DEFAULT_MAX_RETRIES,
            default_max_pending_calls: defaults::actors::DEFAULT_MAX_PENDING_CALLS,
            wait_poll_interval_ms: defaults::objects::WAIT_POLL_INTERVAL_MS,
            shutdown_grace_ms: defaults::actors::SHUTDOWN_GRACE_MS,
            object_store_memory_bytes: None,
        }
    }
}

impl RuntimeConfig {
    /// Load from an optional file with `GATEWAY_` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, defaults::ENV_PREFIX)
    }

    /// Load with a custom environment prefix
    pub fn load_with_env_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&RuntimeConfig::default())
                .context("Failed to seed configuration defaults")?,
        );

        if let Some(path) = path {
            info!("Loading runtime config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator(defaults::ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let loaded: RuntimeConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        debug!(mode = %loaded.mode, namespace = %loaded.namespace, "Runtime config loaded");
        Ok(loaded)
    }

    /// Expand `$VAR` / `${VAR}` references in the cluster address
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let Some(address) = &self.address {
            let expanded = shellexpand::env(address).context("Failed to expand cluster address")?;
            self.address = Some(expanded.to_string());
        }
        Ok(())
    }

    /// Mode after applying the `address = "local"` shortcut
    pub fn effective_mode(&self) -> RuntimeMode {
        match self.address.as_deref() {
            Some("local") => RuntimeMode::Local,
            _ => self.mode,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            bail!("namespace cannot be empty");
        }
        if self.wait_poll_interval_ms == 0 {
            bail!("wait_poll_interval_ms must be greater than zero");
        }
        if self.default_max_pending_calls == 0 {
            bail!("default_max_pending_calls must be greater than zero");
        }
        for (name, quantity) in &self.resources {
            if name.trim().is_empty() {
                bail!("resource names cannot be empty");
            }
            if !quantity.is_finite() || *quantity < 0.0 {
                bail!("resource '{}' has invalid quantity {}", name, quantity);
            }
        }
        if let Some(address) = &self.address {
            if address.trim().is_empty() {
                bail!("address cannot be blank when set");
            }
        }
        Ok(())
    }
}

/// Load, expand and validate in one step
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::load(path)?;
    config.expand_env_vars()?;
    config.validate()?;
    Ok(config)
}
