//! # Runtime Gateway Configuration
//!
//! Centralized configuration and default constants for the runtime gateway.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gateway_config::{load_config, RuntimeMode};
//!
//! let config = load_config(None).expect("valid configuration");
//! if config.effective_mode() == RuntimeMode::Local {
//!     println!("running in-process with {:?}", config.resources);
//! }
//! ```

pub mod defaults;
pub mod runtime_config;

pub use runtime_config::{load_config, RuntimeConfig, RuntimeMode};
