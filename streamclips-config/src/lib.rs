//! Domain-driven configuration management for streamclips
//!
//! Configuration is split by functional domain (database, logging, instance,
//! scheduler, supervisor). Every domain carries serde defaults and validates
//! itself; [`ConfigLoader`] layers a YAML file and environment variables on
//! top of those defaults.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    database::DatabaseConfig,
    instance::InstanceConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    scheduler::SchedulerConfig,
    supervisor::{HangProbeConfig, StorageDestination, SupervisorConfig},
    StreamclipsConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_millis, serde_duration_option};
