//! Duration parsing and serde helpers shared by the config domains
//!
//! Durations are written as plain numbers (seconds, or milliseconds for
//! sub-second settings) and read back either as numbers or as strings with
//! a unit suffix: `"45s"`, `"500ms"`, `"5m"`, `"1h"`.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Unit applied to a bare number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Seconds,
    Millis,
}

/// Parse `"90"`, `"90s"`, `"250ms"`, `"5m"` or `"1h"`
pub fn parse_duration(value: &str, bare: DurationUnit) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, suffix) = value.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("'{}' is not a duration", value))?;

    let duration = match (suffix.trim(), bare) {
        ("", DurationUnit::Seconds) | ("s", _) => Duration::from_secs(amount),
        ("", DurationUnit::Millis) | ("ms", _) => Duration::from_millis(amount),
        ("m", _) => Duration::from_secs(amount.saturating_mul(60)),
        ("h", _) => Duration::from_secs(amount.saturating_mul(3600)),
        (other, _) => return Err(format!("unknown duration unit '{}' in '{}'", other, value)),
    };
    Ok(duration)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Number(u64),
    Text(String),
}

impl RawDuration {
    fn resolve<E: serde::de::Error>(self, bare: DurationUnit) -> Result<Duration, E> {
        match (self, bare) {
            (RawDuration::Number(n), DurationUnit::Seconds) => Ok(Duration::from_secs(n)),
            (RawDuration::Number(n), DurationUnit::Millis) => Ok(Duration::from_millis(n)),
            (RawDuration::Text(s), unit) => parse_duration(&s, unit).map_err(E::custom),
        }
    }
}

/// Whole seconds
pub mod serde_duration {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        RawDuration::deserialize(deserializer)?.resolve(DurationUnit::Seconds)
    }
}

/// Milliseconds, for probe windows
pub mod serde_duration_millis {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        RawDuration::deserialize(deserializer)?.resolve(DurationUnit::Millis)
    }
}

/// Whole seconds or `null`
pub mod serde_duration_option {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<RawDuration>::deserialize(deserializer)?
            .map(|raw| raw.resolve(DurationUnit::Seconds))
            .transpose()
    }
}

pub fn default_true() -> bool {
    true
}

pub fn default_false() -> bool {
    false
}
