//! Domain-specific configuration modules

pub mod database;
pub mod instance;
pub mod logging;
pub mod scheduler;
pub mod supervisor;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main streamclips configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StreamclipsConfig {
    /// Shared relational store
    #[serde(default)]
    pub database: database::DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Identity and capacity of this fleet member
    #[serde(default)]
    pub instance: instance::InstanceConfig,

    /// Tick driver, reaping and claim timings
    #[serde(default)]
    pub scheduler: scheduler::SchedulerConfig,

    /// Child process invocation and termination
    #[serde(default)]
    pub supervisor: supervisor::SupervisorConfig,
}

impl StreamclipsConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.database.validate()?;
        self.logging.validate()?;
        self.instance.validate()?;
        self.scheduler.validate()?;
        self.supervisor.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = StreamclipsConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
