use anyhow::{Context, Result};
use streamclips_config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins, then configured level plus extra directives
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directive = config.level.to_string();
    if let Some(directives) = config.directives.as_deref().filter(|d| !d.trim().is_empty()) {
        directive.push(',');
        directive.push_str(directives.trim());
    }

    EnvFilter::try_new(&directive).with_context(|| format!("Invalid log filter '{}'", directive))
}

/// Initialize the global tracing subscriber from configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    // try_init: tests and embedders may already have a subscriber
    let result = match config.format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}
