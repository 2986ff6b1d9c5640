//! Log output, powered by tracing-subscriber
//!
//! The library only emits `tracing` events. Applications call [`init`] once
//! to print them; `RUST_LOG` directives are appended after the configured
//! ones and therefore win.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Dependencies that are chatty at `debug`.
const QUIET_TARGETS: [(&str, &str); 3] = [("sqlparser", "warn"), ("arrow", "warn"), ("parquet", "warn")];

/// Build the filter: quiet dependencies first, then
/// [`LoggingConfig::directives`], then `RUST_LOG`.
///
/// # Errors
///
/// Returns error if a directive is not a valid filter
pub fn build_env_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let mut directives: Vec<String> = QUIET_TARGETS
        .iter()
        .map(|(target, level)| format!("{target}={level}"))
        .collect();
    directives.push(config.directives());
    if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
        directives.extend(env.split(',').filter(|d| !d.trim().is_empty()).map(str::to_string));
    }

    let filter = directives.join(",");
    EnvFilter::try_new(&filter).map_err(|e| anyhow::anyhow!("Invalid log filter '{filter}': {e}"))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns error if the filter is invalid or a subscriber is already set
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = build_env_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true);

    match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Full => builder.with_span_events(FmtSpan::CLOSE).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Could not install log subscriber: {e}"))?;

    tracing::debug!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_targets() {
        let mut config = LoggingConfig::default();
        config
            .targets
            .insert("screening_db::ingest".to_string(), "debug".to_string());
        assert!(build_env_filter(&config).is_ok());
    }

    #[test]
    fn test_filter_uses_config_directives() {
        let mut config = LoggingConfig::default();
        config
            .targets
            .insert("screening_db::ingest".to_string(), "debug".to_string());
        let filter = build_env_filter(&config).unwrap().to_string().to_lowercase();
        assert!(filter.contains("screening_db::ingest=debug"));
        assert!(filter.contains("arrow=warn"));
    }

    #[test]
    fn test_filter_rejects_garbage() {
        let config = LoggingConfig {
            level: "info,screening_db=loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(build_env_filter(&config).is_err());
    }
}
