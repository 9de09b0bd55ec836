//! Default values shared by the configuration loader and the runtimes

/// Namespace for global actor names when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Log level used when neither the file nor the environment sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Prefix of environment variable overrides (`GATEWAY_NAMESPACE=...`)
pub const ENV_PREFIX: &str = "GATEWAY";

/// Separator for nested keys in environment overrides (`GATEWAY_RESOURCES__GPU=1`)
pub const ENV_SEPARATOR: &str = "__";

/// Task defaults
pub mod tasks {
    /// Re-executions of a task after its worker crashed
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
}

/// Actor defaults
pub mod actors {
    /// Calls allowed to queue while an actor restarts
    pub const DEFAULT_MAX_PENDING_CALLS: usize = 1_000;

    /// Time actor loops get to wind down during shutdown
    pub const SHUTDOWN_GRACE_MS: u64 = 5_000;
}

/// Object store defaults
pub mod objects {
    /// Polling interval for readiness checks that cannot use notifications
    pub const WAIT_POLL_INTERVAL_MS: u64 = 10;
}

/// Local node defaults
pub mod node {
    /// CPUs advertised by the local-mode node
    pub const DEFAULT_CPUS: f64 = 4.0;
}
