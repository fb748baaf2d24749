//! Logging bootstrap for streamclips
//!
//! Every crate emits through `tracing`; this crate installs the global
//! subscriber once, at process start, from [`LoggingConfig`].

pub mod init;

pub use init::{build_env_filter, init_logging};
pub use streamclips_config::{LogFormat, LogLevel, LoggingConfig};
