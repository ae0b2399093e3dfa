//! Configuration Module
//!
//! Connection settings resolution and `.env` loading.

mod settings;

pub use settings::{
    CLIENT_ID_RANGE, ConfigError, ConnectionSettings, DEFAULT_HOST, DEFAULT_PORT, load_dotenv,
};
