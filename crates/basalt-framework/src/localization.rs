//! String tables and per-user language resolution.
//!
//! Language files are flat TOML tables named after the language they hold:
//!
//! ```toml
//! # languages/en-US.toml
//! cooldown = "Wait %d more seconds."
//! greeting = "Hello, %s!"
//!
//! [errors]
//! missing_permissions = "You are missing: %s"   # key: errors.missing_permissions
//! ```
//!
//! Templates use `%s` and `%d` placeholders filled in order; `%%` is a
//! literal percent sign.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tower::BoxError;
use tracing::{debug, info, warn};

use crate::context::InvocationContext;
use crate::error::LocalizationError;
use crate::pipeline::{Middleware, Next};

/// Language used when nothing else is configured.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Resolves translation keys.
pub trait StringTable: Send + Sync {
    /// Renders `key` in `lang`, substituting `args` into its template.
    fn lookup(&self, lang: &str, key: &str, args: &[&dyn fmt::Display]) -> String;

    fn default_language(&self) -> &str;
}

/// A shared string table trait object.
pub type BoxedStringTable = Arc<dyn StringTable>;

/// Fills `%s` / `%d` placeholders in order.
///
/// Placeholders without a matching argument are kept verbatim; surplus
/// arguments are appended, separated by spaces.
pub fn format_template(template: &str, args: &[&dyn fmt::Display]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some(&conv) if conv == 's' || conv == 'd' => {
                chars.next();
                match args.next() {
                    Some(arg) => {
                        let _ = write!(out, "{arg}");
                    }
                    None => {
                        out.push('%');
                        out.push(conv);
                    }
                }
            }
            _ => out.push('%'),
        }
    }

    for arg in args {
        let _ = write!(out, " {arg}");
    }
    out
}

fn missing_key(key: &str, args: &[&dyn fmt::Display]) -> String {
    let mut out = key.to_string();
    for arg in args {
        let _ = write!(out, " {arg}");
    }
    out
}

fn flatten(prefix: &str, table: toml::Table, out: &mut HashMap<String, String>) {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::String(s) => {
                out.insert(key, s);
            }
            toml::Value::Table(nested) => flatten(&key, nested, out),
            other => {
                out.insert(key, other.to_string());
            }
        }
    }
}

/// String table backed by a directory of language files.
pub struct Localizer {
    default_language: String,
    dir: Option<PathBuf>,
    languages: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl Default for Localizer {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

impl Localizer {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
            dir: None,
            languages: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the directory [`load_languages`](Self::load_languages) reads.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Adds or replaces a language from an in-memory table.
    pub fn insert_language<I, K, V>(&self, lang: impl Into<String>, strings: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let strings = strings
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.languages.write().insert(lang.into(), strings);
    }

    /// Reads every `<lang>.toml` file in the language directory.
    ///
    /// Languages already loaded are replaced. Returns how many were read.
    pub fn load_languages(&self) -> Result<usize, LocalizationError> {
        let dir = self.dir.as_deref().ok_or(LocalizationError::NoDirectory)?;
        let loaded = read_languages(dir)?;
        let count = loaded.len();
        self.languages.write().extend(loaded);
        info!(dir = %dir.display(), count, "Loaded language files");
        Ok(count)
    }

    /// Drops every loaded language and reads the directory again.
    ///
    /// If reading fails the previously loaded strings are kept.
    pub fn reload_languages(&self) -> Result<usize, LocalizationError> {
        let dir = self.dir.as_deref().ok_or(LocalizationError::NoDirectory)?;
        let loaded = read_languages(dir)?;
        let count = loaded.len();
        *self.languages.write() = loaded;
        info!(dir = %dir.display(), count, "Reloaded language files");
        Ok(count)
    }

    /// Loaded language names, sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<_> = self.languages.read().keys().cloned().collect();
        langs.sort();
        langs
    }

    pub fn has_language(&self, lang: &str) -> bool {
        self.languages.read().contains_key(lang)
    }
}

fn read_languages(dir: &Path) -> Result<HashMap<String, HashMap<String, String>>, LocalizationError> {
    let entries = std::fs::read_dir(dir).map_err(|source| LocalizationError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut languages = HashMap::new();
    for entry in entries {
        let path = entry
            .map_err(|source| LocalizationError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let raw = std::fs::read_to_string(&path).map_err(|source| LocalizationError::Io {
            path: path.clone(),
            source,
        })?;
        let table: toml::Table = toml::from_str(&raw).map_err(|e| LocalizationError::Malformed {
            path: path.clone(),
            reason: e.message().to_string(),
        })?;

        let mut strings = HashMap::new();
        flatten("", table, &mut strings);
        debug!(lang, keys = strings.len(), "Loaded language");
        languages.insert(lang.to_string(), strings);
    }
    Ok(languages)
}

impl StringTable for Localizer {
    fn lookup(&self, lang: &str, key: &str, args: &[&dyn fmt::Display]) -> String {
        let languages = self.languages.read();
        let template = languages
            .get(lang)
            .and_then(|strings| strings.get(key))
            .or_else(|| {
                languages
                    .get(&self.default_language)
                    .and_then(|strings| strings.get(key))
            });

        match template {
            Some(template) => format_template(template, args),
            None => missing_key(key, args),
        }
    }

    fn default_language(&self) -> &str {
        &self.default_language
    }
}

// =============================================================================
// Per-user language
// =============================================================================

/// Decides which language an invocation should be answered in.
#[async_trait]
pub trait LanguageProvider: Send + Sync + 'static {
    /// `None` means the string table's default language.
    async fn user_language(&self, ctx: &InvocationContext) -> Option<String>;
}

/// Uses the locale reported by the invoking client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientLocale;

#[async_trait]
impl LanguageProvider for ClientLocale {
    async fn user_language(&self, ctx: &InvocationContext) -> Option<String> {
        Some(ctx.interaction().locale.clone())
    }
}

/// Middleware that resolves the invocation language before anything else
/// runs. It always continues the chain.
pub struct LanguageMiddleware<P> {
    provider: P,
}

impl<P: LanguageProvider> LanguageMiddleware<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: LanguageProvider> Middleware for LanguageMiddleware<P> {
    async fn handle(&self, ctx: Arc<InvocationContext>, next: Next) -> Result<(), BoxError> {
        match self.provider.user_language(&ctx).await {
            Some(lang) => ctx.set_language(lang),
            None => warn!(user = %ctx.user().id, "No language resolved, using default"),
        }
        next.run().await
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_format_template() {
        assert_eq!(format_template("Wait %d s", &[&3]), "Wait 3 s");
        assert_eq!(format_template("%s and %s", &[&"a", &"b"]), "a and b");
        assert_eq!(format_template("100%% done", &[]), "100% done");
        assert_eq!(format_template("%s %s", &[&"only"]), "only %s");
        assert_eq!(format_template("hi", &[&"extra", &2]), "hi extra 2");
        assert_eq!(format_template("50% off", &[]), "50% off");
    }

    #[test]
    fn test_lookup_fallbacks() {
        let localizer = Localizer::new("en-US");
        localizer.insert_language("en-US", [("greet", "Hello, %s!"), ("bye", "Bye")]);
        localizer.insert_language("de", [("greet", "Hallo, %s!")]);

        assert_eq!(localizer.lookup("de", "greet", &[&"Ana"]), "Hallo, Ana!");
        assert_eq!(localizer.lookup("de", "bye", &[]), "Bye");
        assert_eq!(localizer.lookup("fr", "greet", &[&"Ana"]), "Hello, Ana!");
        assert_eq!(localizer.lookup("de", "unknown", &[&1, &"x"]), "unknown 1 x");
        assert_eq!(localizer.lookup("de", "unknown", &[]), "unknown");
    }

    #[test]
    fn test_load_and_reload_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("en-US.toml"),
            "greet = \"Hello\"\n[errors]\ncooldown = \"Wait %d\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let localizer = Localizer::new("en-US").with_dir(dir.path());
        assert_eq!(localizer.load_languages().unwrap(), 1);
        assert_eq!(localizer.lookup("en-US", "errors.cooldown", &[&4]), "Wait 4");

        fs::write(dir.path().join("en-US.toml"), "greet = \"Hi\"\n").unwrap();
        fs::write(dir.path().join("ru.toml"), "greet = \"Привет\"\n").unwrap();
        assert_eq!(localizer.reload_languages().unwrap(), 2);
        assert_eq!(localizer.lookup("en-US", "greet", &[]), "Hi");
        assert_eq!(localizer.lookup("en-US", "errors.cooldown", &[]), "errors.cooldown");
        assert_eq!(localizer.languages(), ["en-US", "ru"]);
    }

    #[test]
    fn test_malformed_file_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("en-US.toml"), "greet = \"Hello\"\n").unwrap();
        let localizer = Localizer::new("en-US").with_dir(dir.path());
        localizer.load_languages().unwrap();

        fs::write(dir.path().join("en-US.toml"), "greet = ").unwrap();
        assert!(matches!(
            localizer.reload_languages(),
            Err(LocalizationError::Malformed { .. })
        ));
        assert_eq!(localizer.lookup("en-US", "greet", &[]), "Hello");
    }

    #[test]
    fn test_no_directory() {
        assert!(matches!(
            Localizer::default().load_languages(),
            Err(LocalizationError::NoDirectory)
        ));
    }
}
