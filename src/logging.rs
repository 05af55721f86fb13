//! Tracing initialization
//!
//! Structured logging driven by `LoggingConfig`: JSON lines for log shippers
//! or human-readable output. `RUST_LOG` still overrides the configured level
//! for ad-hoc debugging.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber from the logging configuration.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = env_filter(&config.level);

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_current_span(true))
                .init();
        }
        LogFormat::Plain => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .init();
        }
    }
}

/// `RUST_LOG` wins when set; otherwise the configured level applies.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_builds_a_filter() {
        // Levels accepted by LoggingConfig::validate must parse as directives.
        for level in ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"] {
            let filter = env_filter(level);
            assert!(!filter.to_string().is_empty());
        }
    }
}
