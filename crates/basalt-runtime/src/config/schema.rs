//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use basalt_core::UserId;
use basalt_framework::{DEFAULT_LANGUAGE, ReloadPolicy};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasaltConfig {
    /// Users allowed to run owner-only commands.
    ///
    /// When empty, owners are fetched from the platform once the gateway is
    /// ready.
    #[serde(default)]
    pub owners: Vec<UserId>,

    #[serde(default)]
    pub localization: LocalizationConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub extensions: ExtensionsConfig,

    #[serde(default)]
    pub cooldowns: CooldownConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Framework sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationConfig {
    /// Language used when a user's own language has no translation.
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Directory of `<lang>.toml` files. Nothing is loaded when unset.
    #[serde(default = "default_languages_dir")]
    pub languages_dir: Option<PathBuf>,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            languages_dir: default_languages_dir(),
        }
    }
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_languages_dir() -> Option<PathBuf> {
    Some(PathBuf::from("languages"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Directory scanned for command modules on start.
    #[serde(default = "default_commands_dir")]
    pub dir: PathBuf,

    /// What a failed reload leaves behind.
    #[serde(default)]
    pub reload_policy: ReloadPolicy,

    /// Push the command list to the platform once the gateway is ready.
    #[serde(default = "default_true")]
    pub sync_on_ready: bool,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            dir: default_commands_dir(),
            reload_policy: ReloadPolicy::default(),
            sync_on_ready: true,
        }
    }
}

fn default_commands_dir() -> PathBuf {
    PathBuf::from("commands")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    /// Directory scanned for extension modules on start.
    #[serde(default = "default_extensions_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub reload_policy: ReloadPolicy,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            dir: default_extensions_dir(),
            reload_policy: ReloadPolicy::default(),
        }
    }
}

fn default_extensions_dir() -> PathBuf {
    PathBuf::from("extensions")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// How often expired cooldown entries are dropped. `0` disables the sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

// =============================================================================
// Logging
// =============================================================================

/// Log level names as written in configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle transitions are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the log call site.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module overrides, e.g. `basalt_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            filters: HashMap::new(),
        }
    }
}
