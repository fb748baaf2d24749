//! Child process supervision configuration

use crate::error::ConfigResult;
use crate::validation::{validate_duration, validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How supervised clip-capture children are invoked and terminated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Executable of the clip-capture program
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the work item URL (e.g. interpreter flags)
    #[serde(default)]
    pub program_args: Vec<String>,

    /// Root directory; each work item writes to `<output_root>/<name>`
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Grace period after SIGTERM before SIGKILL; `None` sends SIGTERM only
    #[serde(
        with = "crate::domains::utils::serde_duration_option",
        default = "default_termination_grace_period"
    )]
    pub termination_grace_period: Option<Duration>,

    /// Buffered output lines per child before readers apply backpressure
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,

    /// CPU-based hang detection
    #[serde(default)]
    pub hang_probe: HangProbeConfig,

    /// Optional remote storage destination forwarded to children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageDestination>,
}

/// CPU-delta sampling used to detect live but wedged children
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HangProbeConfig {
    /// Whether the scheduler probes children that are not already stale
    #[serde(default = "crate::domains::utils::default_true")]
    pub enabled: bool,

    /// Sampling window
    #[serde(with = "crate::domains::utils::serde_duration_millis", default = "default_probe_window")]
    pub window: Duration,

    /// CPU seconds over the window at or below which the child is hanging
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold_seconds: f64,
}

/// Remote storage target (`--storage-server user@host`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDestination {
    pub user: String,
    pub host: String,
    /// Masked when the configuration is printed
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "serialize_masked")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl StorageDestination {
    /// `user@host` form passed to `--storage-server`
    pub fn server(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

fn serialize_masked<S: serde::Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_some("***"),
        None => serializer.serialize_none(),
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            program_args: Vec::new(),
            output_root: default_output_root(),
            termination_grace_period: default_termination_grace_period(),
            output_buffer: default_output_buffer(),
            hang_probe: HangProbeConfig::default(),
            storage: None,
        }
    }
}

impl Default for HangProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_probe_window(),
            cpu_threshold_seconds: default_cpu_threshold(),
        }
    }
}

impl Validatable for SupervisorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.program, "program", self.domain_name())?;
        validate_positive(self.output_buffer, "output_buffer", self.domain_name())?;

        if let Some(grace) = self.termination_grace_period {
            validate_duration(grace, "termination_grace_period", self.domain_name())?;
        }

        validate_duration(self.hang_probe.window, "hang_probe.window", self.domain_name())?;
        if self.hang_probe.cpu_threshold_seconds < 0.0 {
            return Err(self.validation_error("hang_probe.cpu_threshold_seconds cannot be negative"));
        }

        if let Some(storage) = &self.storage {
            validate_required_string(&storage.user, "storage.user", self.domain_name())?;
            validate_required_string(&storage.host, "storage.host", self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "supervisor"
    }
}

fn default_program() -> String {
    "streamclips".to_string()
}

fn default_output_root() -> PathBuf {
    PathBuf::from("clips")
}

fn default_termination_grace_period() -> Option<Duration> {
    Some(Duration::from_secs(30))
}

fn default_output_buffer() -> usize {
    256
}

fn default_probe_window() -> Duration {
    Duration::from_secs(10)
}

fn default_cpu_threshold() -> f64 {
    0.01
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.program, "streamclips");
        assert_eq!(config.termination_grace_period, Some(Duration::from_secs(30)));
        assert!(config.hang_probe.enabled);
        assert_eq!(config.hang_probe.window, Duration::from_secs(10));
        assert!(config.storage.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_server_format() {
        let storage = StorageDestination {
            user: "clips".to_string(),
            host: "files.example.com".to_string(),
            password: None,
            path: Some("/srv/clips".to_string()),
        };
        assert_eq!(storage.server(), "clips@files.example.com");
    }

    #[test]
    fn test_storage_password_is_masked_when_serialized() {
        let storage = StorageDestination {
            user: "clips".to_string(),
            host: "nas.local".to_string(),
            password: Some("hunter2".to_string()),
            path: None,
        };
        let yaml = serde_yaml::to_string(&storage).unwrap();
        assert!(yaml.contains("***"));
        assert!(!yaml.contains("hunter2"));
    }

    #[test]
    fn test_storage_requires_host() {
        let config = SupervisorConfig {
            storage: Some(StorageDestination {
                user: "clips".to_string(),
                host: String::new(),
                password: None,
                path: None,
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_cpu_threshold_rejected() {
        let mut config = SupervisorConfig::default();
        config.hang_probe.cpu_threshold_seconds = -1.0;
        assert!(config.validate().is_err());
    }
}
