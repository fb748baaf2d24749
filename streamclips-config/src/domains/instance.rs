//! Instance identity and capacity

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};

/// Identity of this fleet member and how many children it may supervise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Unique identity of the instance; defaults to the OS hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Maximum number of concurrently supervised processes
    #[serde(default = "default_max_processes")]
    pub max_processes: u32,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            max_processes: default_max_processes(),
        }
    }
}

impl Validatable for InstanceConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.hostname, "hostname", self.domain_name())?;
        validate_positive(self.max_processes, "max_processes", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "instance"
    }
}

/// Resolve the OS hostname, falling back to "localhost"
pub fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_max_processes() -> u32 {
    5
}
