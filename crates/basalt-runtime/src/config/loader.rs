//! Configuration loader using figment.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. Profile-specific file (`basalt.{profile}.toml`)
//! 3. Main file (`basalt.toml`)
//! 4. Environment variables (`BASALT_*`)
//! 5. Programmatic overrides
//!
//! Environment variables use `__` as the section separator:
//!
//! - `BASALT_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `BASALT_COMMANDS__DIR=./cmds` → `commands.dir = "./cmds"`
//! - `BASALT_OWNERS=[42, 43]` → `owners = [42, 43]`
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::BasaltConfig;

const BASE_NAME: &str = "basalt";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `BASALT_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("BASALT_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layered configuration loader.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search for `basalt.toml`.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<user config dir>/basalt` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join(BASE_NAME)),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a configuration on top of every other source.
    pub fn merge(mut self, config: BasaltConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Merges a single value at a dotted key, e.g. `("commands.dir", "cmds")`.
    pub fn set<V: serde::Serialize>(mut self, key: &str, value: V) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    pub fn load(self) -> ConfigResult<BasaltConfig> {
        let profile = self.profile.clone();
        let config: BasaltConfig = self.build_figment()?.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(BasaltConfig::default()));

        match &self.config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path.clone()));
                }
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if ext != "toml" {
                    return Err(ConfigError::UnsupportedFormat(ext.to_string()));
                }
                info!(path = %path.display(), "Loading configuration file");
                figment = figment.merge(Toml::file(path));
            }
            None => figment = self.load_config_files(figment),
        }

        if self.load_env {
            trace!("Loading environment variables with BASALT_ prefix");
            figment = figment.merge(Env::prefixed("BASALT_").ignore(&["PROFILE"]).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(BASE_NAME));
        }
        paths
    }

    /// Takes the first search path holding `basalt.toml`, together with its
    /// profile variant if present.
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        for dir in self.resolve_search_paths() {
            let base = dir.join(format!("{BASE_NAME}.toml"));
            if !base.exists() {
                continue;
            }

            let profiled = dir.join(format!("{BASE_NAME}.{}.toml", self.profile));
            if profiled.exists() {
                debug!(path = %profiled.display(), "Loading profile-specific config");
                figment = figment.merge(Toml::file(&profiled));
            }
            info!(path = %base.display(), "Loading configuration file");
            return figment.merge(Toml::file(&base));
        }

        warn!("No configuration file found, using defaults");
        figment
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use basalt_core::UserId;
    use basalt_framework::ReloadPolicy;
    use figment::Jail;

    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level, LogLevel::Info);
            assert_eq!(config.localization.default_language, "en-US");
            assert_eq!(config.commands.dir, PathBuf::from("commands"));
            assert!(config.commands.sync_on_ready);
            Ok(())
        });
    }

    #[test]
    fn test_file_profile_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "basalt.toml",
                r#"
                    owners = ["42"]

                    [commands]
                    dir = "cmds"
                    reload_policy = "restore_previous"

                    [logging]
                    level = "warn"
                "#,
            )?;
            jail.create_file("basalt.production.toml", "[cooldowns]\nsweep_interval_secs = 5\n")?;
            jail.set_env("BASALT_LOGGING__LEVEL", "debug");

            let config = ConfigLoader::new()
                .profile("prod")
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.owners, [UserId::new(42)]);
            assert_eq!(config.commands.dir, PathBuf::from("cmds"));
            assert_eq!(config.commands.reload_policy, ReloadPolicy::RestorePrevious);
            assert_eq!(config.cooldowns.sweep_interval_secs, 5);
            assert_eq!(config.logging.level, LogLevel::Debug);
            Ok(())
        });
    }

    #[test]
    fn test_programmatic_override_wins() {
        Jail::expect_with(|jail| {
            jail.create_file("basalt.toml", "[commands]\ndir = \"from-file\"\n")?;
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .set("commands.dir", "from-code")
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.commands.dir, PathBuf::from("from-code"));
            Ok(())
        });
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        assert!(matches!(
            ConfigLoader::new().file("/nonexistent/basalt.toml").load(),
            Err(ConfigError::FileNotFound(_))
        ));

        Jail::expect_with(|jail| {
            jail.create_file("basalt.yaml", "owners: []\n")?;
            let result = ConfigLoader::new()
                .file(jail.directory().join("basalt.yaml"))
                .load();
            assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "yaml"));
            Ok(())
        });
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }
}
