//! Tracing Integration
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Filter directives, added on top of `tws_facade=info`
//! - `TWS_FACADE_LOG_ANSI`: Set to "false" to disable colored output
//! - `TWS_FACADE_LOG_THREAD_IDS`: Set to "true" to include thread ids
//!
//! # Usage
//!
//! ```no_run
//! use tws_facade::infrastructure::telemetry;
//!
//! telemetry::init().expect("subscriber installed once");
//! tracing::info!("Connected");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Directive applied before `RUST_LOG`.
const DEFAULT_DIRECTIVE: &str = "tws_facade=info";

/// Telemetry setup failure.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A filter directive did not parse.
    #[error("invalid filter directive: {0}")]
    Directive(#[from] ParseError),

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Directive applied before `RUST_LOG`.
    pub default_directive: String,
    /// Colored output.
    pub ansi: bool,
    /// Include thread ids (useful to tell reader and caller threads apart).
    pub thread_ids: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            ansi: true,
            thread_ids: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let ansi = std::env::var("TWS_FACADE_LOG_ANSI")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let thread_ids = std::env::var("TWS_FACADE_LOG_THREAD_IDS")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Self {
            ansi,
            thread_ids,
            ..Self::default()
        }
    }

    /// Build the filter for this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the default directive does not parse.
    pub fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        Ok(EnvFilter::from_default_env().add_directive(self.default_directive.parse()?))
    }
}

/// Install the global subscriber with configuration from the environment.
///
/// # Errors
///
/// Returns an error if a subscriber is already installed.
pub fn init() -> Result<(), TelemetryError> {
    init_with_config(&TelemetryConfig::from_env())
}

/// Install the global subscriber with custom configuration.
///
/// # Errors
///
/// Returns an error if the directive is invalid or a subscriber is already
/// installed.
pub fn init_with_config(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(config.ansi)
        .with_thread_ids(config.thread_ids)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
