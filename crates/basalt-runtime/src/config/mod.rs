//! Runtime configuration.
//!
//! Settings are read from `basalt.toml`, its profile variants and `BASALT_*`
//! environment variables, then checked with [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    BasaltConfig, CommandsConfig, CooldownConfig, ExtensionsConfig, LocalizationConfig, LogFormat,
    LogLevel, LogOutput, LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
