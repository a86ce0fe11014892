//! peershare configuration system.
//!
//! Provides TOML-based configuration with validation. All config sections
//! use defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use peershare_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    CaptureConfig, IceConfig, IceServerConfig, IdentityConfig, LogLevel, LoggingConfig,
    RestartConfig, ShareConfig, SignalingConfig, CONFIG_SCHEMA_VERSION,
};
pub use toml_loader::{load_default, load_from_path};

use peershare_common::ConfigError;

/// Load config from the platform default path and validate it.
///
/// Creates a default `config.toml` if none exists.
pub fn load_config() -> Result<ShareConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &ShareConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
