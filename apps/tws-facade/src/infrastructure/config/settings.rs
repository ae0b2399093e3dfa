//! Connection Settings
//!
//! Settings for a facade connection, resolved from explicit arguments, then
//! environment variables, then defaults.
//!
//! | Variable | Default |
//! |---|---|
//! | `IB_HOSTNAME` | `localhost` |
//! | `IB_PORT` | `7496` |
//! | `IB_CLIENT_ID` | random in `1000..=99999` |
//! | `IB_REQUEST_TIMEOUT_SECS` | unset (wait forever) |
//! | `IB_HISTORICAL_WINDOW` | unset (size by requested range) |

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::domain::historical::{DurationPolicy, DurationSpec, FixedWindow, SpanDuration};

/// Host used when neither an argument nor `IB_HOSTNAME` is given.
pub const DEFAULT_HOST: &str = "localhost";

/// Port used when neither an argument nor `IB_PORT` is given.
pub const DEFAULT_PORT: u16 = 7496;

/// Range a random client id is drawn from.
pub const CLIENT_ID_RANGE: RangeInclusive<i32> = 1000..=99_999;

const HOST_VAR: &str = "IB_HOSTNAME";
const PORT_VAR: &str = "IB_PORT";
const CLIENT_ID_VAR: &str = "IB_CLIENT_ID";
const REQUEST_TIMEOUT_VAR: &str = "IB_REQUEST_TIMEOUT_SECS";
const HISTORICAL_WINDOW_VAR: &str = "IB_HISTORICAL_WINDOW";

/// Resolved settings for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Platform host.
    pub host: String,
    /// Platform API port.
    pub port: u16,
    /// Client id presented to the platform.
    pub client_id: i32,
    /// Deadline for each call; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Constant historical window; `None` sizes requests by their range.
    pub historical_window: Option<DurationSpec>,
}

impl ConnectionSettings {
    /// Resolve settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(None, None)
    }

    /// Resolve settings, preferring explicit arguments over the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn resolve(host: Option<&str>, port: Option<u16>) -> Result<Self, ConfigError> {
        Self::resolve_with(host, port, |key| std::env::var(key).ok())
    }

    /// Resolve settings from a `.env` file without touching the process
    /// environment. Variables missing from the file fall back to the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a value is
    /// unparseable.
    pub fn from_env_file(
        path: impl AsRef<Path>,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<Self, ConfigError> {
        let vars = dotenvy::from_path_iter(path.as_ref())?.collect::<Result<HashMap<_, _>, _>>()?;

        Self::resolve_with(host, port, |key| {
            vars.get(key).cloned().or_else(|| std::env::var(key).ok())
        })
    }

    /// Resolve settings against an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn resolve_with(
        host: Option<&str>,
        port: Option<u16>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = host
            .map(str::to_string)
            .or_else(|| var(HOST_VAR))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match port {
            Some(port) => port,
            None => parse_var(PORT_VAR, var(PORT_VAR))?.unwrap_or(DEFAULT_PORT),
        };

        let client_id = match parse_var::<i32>(CLIENT_ID_VAR, var(CLIENT_ID_VAR))? {
            Some(id) => id,
            None => rand::rng().random_range(CLIENT_ID_RANGE),
        };

        let request_timeout =
            parse_var::<u64>(REQUEST_TIMEOUT_VAR, var(REQUEST_TIMEOUT_VAR))?.map(Duration::from_secs);

        let historical_window = parse_var::<DurationSpec>(HISTORICAL_WINDOW_VAR, var(HISTORICAL_WINDOW_VAR))?;

        Ok(Self {
            host,
            port,
            client_id,
            request_timeout,
            historical_window,
        })
    }

    /// Duration policy for historical requests.
    #[must_use]
    pub fn duration_policy(&self) -> Arc<dyn DurationPolicy> {
        match self.historical_window {
            Some(window) => Arc::new(FixedWindow(window)),
            None => Arc::new(SpanDuration),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set to a value that does not parse.
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Parse failure.
        reason: String,
    },

    /// A `.env` file could not be read or parsed.
    #[error("failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

fn parse_var<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

// =============================================================================
// .env Loading
// =============================================================================

/// Load `.env` from the current directory or the nearest ancestor that has
/// one. Missing files are not an error.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                if let Err(e) = dotenvy::from_path(&env_path) {
                    tracing::warn!(path = %env_path.display(), error = %e, "Failed to load .env");
                }
                return;
            }
            dir = parent;
        }
    }
}
