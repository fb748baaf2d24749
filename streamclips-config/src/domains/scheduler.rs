//! Scheduler loop configuration

use crate::error::ConfigResult;
use crate::validation::{validate_duration, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timings for the per-instance tick driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between ticks; the first tick fires immediately
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_tick_interval")]
    pub tick_interval: Duration,

    /// Heartbeat age after which an instance is considered dead and reaped
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_dead_instance_timeout")]
    pub dead_instance_timeout: Duration,

    /// Minimum time after a work item stops before it may be claimed again
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_claim_cooldown")]
    pub claim_cooldown: Duration,

    /// Time without output after which a supervised process is stale
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_inactivity_threshold")]
    pub inactivity_threshold: Duration,

    /// Disable to skip the tick loop entirely (admin-only nodes)
    #[serde(default = "crate::domains::utils::default_true")]
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            dead_instance_timeout: default_dead_instance_timeout(),
            claim_cooldown: default_claim_cooldown(),
            inactivity_threshold: default_inactivity_threshold(),
            enabled: true,
        }
    }
}

impl Validatable for SchedulerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_duration(self.tick_interval, "tick_interval", self.domain_name())?;
        validate_duration(self.dead_instance_timeout, "dead_instance_timeout", self.domain_name())?;
        validate_duration(self.claim_cooldown, "claim_cooldown", self.domain_name())?;
        validate_duration(self.inactivity_threshold, "inactivity_threshold", self.domain_name())?;

        // A live instance must never look dead between two of its own heartbeats
        if self.dead_instance_timeout <= self.tick_interval {
            return Err(self.validation_error(format!(
                "dead_instance_timeout ({}s) must exceed tick_interval ({}s)",
                self.dead_instance_timeout.as_secs(),
                self.tick_interval.as_secs()
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "scheduler"
    }
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_dead_instance_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_claim_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_inactivity_threshold() -> Duration {
    Duration::from_secs(45)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(60));
        assert_eq!(config.dead_instance_timeout, Duration::from_secs(300));
        assert_eq!(config.claim_cooldown, Duration::from_secs(60));
        assert_eq!(config.inactivity_threshold, Duration::from_secs(45));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dead_timeout_must_exceed_tick() {
        let config = SchedulerConfig {
            tick_interval: Duration::from_secs(120),
            dead_instance_timeout: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_cooldown_rejected() {
        let config = SchedulerConfig {
            claim_cooldown: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
