//! Log subscriber setup for binaries and demos
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{Directive, ParseError};

use crate::config::TelemetryConfig;

// sled logs every flush at debug, which drowns out request lifecycle events
const STORE_DIRECTIVE: &str = "sled=warn";

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log filter '{value}' in APPROVAL_LOG_LEVEL")]
    InvalidFilter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("failed to install log subscriber: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

/// Installs the global fmt subscriber. A valid `RUST_LOG` wins over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = env_filter(config, from_env.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// Builds the filter from an optional `RUST_LOG` value, falling back to `config.log_level`.
///
/// Unless the chosen filter names `sled` itself, store internals are capped at `warn`.
pub fn env_filter(
    config: &TelemetryConfig,
    from_env: Option<&str>,
) -> Result<EnvFilter, TelemetryError> {
    let (value, filter) = match from_env.map(|value| (value, EnvFilter::try_new(value))) {
        Some((value, Ok(filter))) => (value, filter),
        _ => {
            let value = config.log_level.as_str();
            let filter =
                EnvFilter::try_new(value).map_err(|source| TelemetryError::InvalidFilter {
                    value: value.to_string(),
                    source,
                })?;
            (value, filter)
        }
    };

    if value.contains("sled") {
        return Ok(filter);
    }
    let directive: Directive = STORE_DIRECTIVE
        .parse()
        .map_err(|source| TelemetryError::InvalidFilter {
            value: STORE_DIRECTIVE.to_string(),
            source,
        })?;
    Ok(filter.add_directive(directive))
}
