//! Configuration validation.

use std::collections::HashSet;

use tracing::warn;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BasaltConfig, LogFormat, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BasaltConfig) -> ConfigResult<()> {
    validate_localization(config)?;
    validate_dirs(config)?;
    validate_logging(&config.logging)?;
    check_owners(config);
    Ok(())
}

fn validate_localization(config: &BasaltConfig) -> ConfigResult<()> {
    let lang = config.localization.default_language.trim();
    if lang.is_empty() {
        return Err(ConfigError::missing_field("localization.default_language"));
    }
    if lang.contains(['/', '\\']) {
        return Err(ConfigError::validation(format!(
            "Invalid default language: {lang}"
        )));
    }
    Ok(())
}

fn validate_dirs(config: &BasaltConfig) -> ConfigResult<()> {
    if config.commands.dir.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("commands.dir"));
    }
    if config.extensions.dir.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("extensions.dir"));
    }
    if config.commands.dir == config.extensions.dir {
        return Err(ConfigError::validation(
            "Commands and extensions must live in different directories",
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "JSON log format requires the `json-log` feature",
        ));
    }
    Ok(())
}

/// Duplicate owners are harmless; they are only reported.
fn check_owners(config: &BasaltConfig) {
    let mut seen = HashSet::new();
    for owner in &config.owners {
        if !seen.insert(owner) {
            warn!(owner = %owner, "Owner listed more than once");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&BasaltConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_default_language() {
        let mut config = BasaltConfig::default();
        config.localization.default_language = "  ".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_shared_module_dir() {
        let mut config = BasaltConfig::default();
        config.extensions.dir = PathBuf::from("commands");
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = BasaltConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some(PathBuf::from("logs/basalt.log"));
        assert!(validate_config(&config).is_ok());
    }
}
