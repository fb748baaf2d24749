//! Configuration loading and environment variable handling

use crate::domains::supervisor::StorageDestination;
use crate::domains::utils::{parse_duration, DurationUnit};
use crate::domains::StreamclipsConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "STREAMCLIPS".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<StreamclipsConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: StreamclipsConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<StreamclipsConfig> {
        let mut config = StreamclipsConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<StreamclipsConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut StreamclipsConfig) -> ConfigResult<()> {
        self.apply_database_overrides(config)?;
        self.apply_logging_overrides(config)?;
        self.apply_scheduler_overrides(config)?;
        self.apply_supervisor_overrides(config)?;
        Self::apply_instance_overrides(config)?;
        Self::apply_storage_overrides(config)?;
        Ok(())
    }

    fn apply_database_overrides(&self, config: &mut StreamclipsConfig) -> ConfigResult<()> {
        if let Ok(url) = self.get_env_var("DATABASE_URL") {
            config.database.url = url;
        }

        if let Ok(max) = self.get_env_var("DATABASE_MAX_CONNECTIONS") {
            config.database.max_connections = parse_env("DATABASE_MAX_CONNECTIONS", &max)?;
        }

        Ok(())
    }

    fn apply_logging_overrides(&self, config: &mut StreamclipsConfig) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = log_level.parse()?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.logging.format = format.parse()?;
        }

        Ok(())
    }

    fn apply_scheduler_overrides(&self, config: &mut StreamclipsConfig) -> ConfigResult<()> {
        if let Ok(interval) = self.get_env_var("TICK_INTERVAL") {
            config.scheduler.tick_interval = parse_duration(&interval, DurationUnit::Seconds)
                .map_err(|e| ConfigError::EnvError(format!("Invalid TICK_INTERVAL: {}", e)))?;
        }

        if let Ok(enabled) = self.get_env_var("SCHEDULER_ENABLED") {
            config.scheduler.enabled = parse_env("SCHEDULER_ENABLED", &enabled)?;
        }

        Ok(())
    }

    fn apply_supervisor_overrides(&self, config: &mut StreamclipsConfig) -> ConfigResult<()> {
        if let Ok(program) = self.get_env_var("CLIPS_PROGRAM") {
            config.supervisor.program = program;
        }

        if let Ok(root) = self.get_env_var("OUTPUT_ROOT") {
            config.supervisor.output_root = PathBuf::from(root);
        }

        if let Ok(enabled) = self.get_env_var("HANG_PROBE_ENABLED") {
            config.supervisor.hang_probe.enabled = parse_env("HANG_PROBE_ENABLED", &enabled)?;
        }

        Ok(())
    }

    /// `INSTANCE_ID` / `INSTANCE_MAX_PROCESSES` are read without prefix
    fn apply_instance_overrides(config: &mut StreamclipsConfig) -> ConfigResult<()> {
        if let Ok(id) = std::env::var("INSTANCE_ID") {
            config.instance.hostname = id;
        }

        if let Ok(max) = std::env::var("INSTANCE_MAX_PROCESSES") {
            config.instance.max_processes = parse_env("INSTANCE_MAX_PROCESSES", &max)?;
        }

        Ok(())
    }

    /// `STORAGE_SERVER_*` are read without prefix; user and host are both required
    fn apply_storage_overrides(config: &mut StreamclipsConfig) -> ConfigResult<()> {
        let user = std::env::var("STORAGE_SERVER_USER").ok();
        let host = std::env::var("STORAGE_SERVER_HOST").ok();
        let password = std::env::var("STORAGE_SERVER_PASSWORD").ok();
        let path = std::env::var("STORAGE_SERVER_PATH").ok();

        match (user, host) {
            (Some(user), Some(host)) => {
                config.supervisor.storage = Some(StorageDestination {
                    user,
                    host,
                    password,
                    path,
                });
            }
            (None, None) if password.is_some() || path.is_some() => {
                return Err(ConfigError::EnvError(
                    "STORAGE_SERVER_PASSWORD/STORAGE_SERVER_PATH require STORAGE_SERVER_USER and STORAGE_SERVER_HOST"
                        .to_string(),
                ));
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::EnvError(
                    "STORAGE_SERVER_USER and STORAGE_SERVER_HOST must be set together".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T>(name: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))
}
