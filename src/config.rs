//! Runtime configuration read from the environment (and `.env`, when present).
use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;

pub const DB_PATH_VAR: &str = "APPROVAL_DB_PATH";
pub const DB_TEMPORARY_VAR: &str = "APPROVAL_DB_TEMPORARY";
pub const DB_CACHE_BYTES_VAR: &str = "APPROVAL_DB_CACHE_BYTES";
pub const LOG_LEVEL_VAR: &str = "APPROVAL_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,
}

/// Where and how the sled store is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Delete the database when the last handle drops.
    pub temporary: bool,
    pub cache_capacity: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be true or false, got '{value}'")]
    InvalidBool { var: &'static str, value: String },
    #[error("{var} must be a byte count")]
    InvalidNumber {
        var: &'static str,
        #[source]
        source: ParseIntError,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("approval.db"),
            temporary: false,
            cache_capacity: None,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds the config from an arbitrary variable source; unset variables take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut store = StoreConfig::default();
        if let Some(path) = lookup(DB_PATH_VAR) {
            store.path = PathBuf::from(path);
        }
        if let Some(value) = lookup(DB_TEMPORARY_VAR) {
            store.temporary = parse_bool(DB_TEMPORARY_VAR, &value)?;
        }
        if let Some(value) = lookup(DB_CACHE_BYTES_VAR) {
            let bytes = value
                .trim()
                .parse::<u64>()
                .map_err(|source| ConfigError::InvalidNumber {
                    var: DB_CACHE_BYTES_VAR,
                    source,
                })?;
            store.cache_capacity = Some(bytes);
        }

        let telemetry = TelemetryConfig {
            log_level: lookup(LOG_LEVEL_VAR).unwrap_or_else(|| "info".to_string()),
        };

        Ok(Self { store, telemetry })
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}
