//! Error types for the Basalt framework.
//!
//! Loading and lookup errors propagate to whoever called the registry.
//! Handler failures never propagate: the dispatcher wraps them in a
//! [`HandlerError`] and reports them through the `commandError` lifecycle event.

use std::path::PathBuf;

use thiserror::Error;
use tower::BoxError;

/// Failure to load a command or extension module.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The module file could not be read.
    #[error("failed to read module '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The module file is not a valid manifest.
    #[error("malformed module '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// The module does not export a usable handler.
    #[error("module '{path}' has no valid export{}", export_hint(.export))]
    NoExport {
        path: PathBuf,
        export: Option<String>,
    },

    /// The exported constructor failed.
    #[error("failed to instantiate '{path}': {source}")]
    Instantiate {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The handler's definition violates naming rules.
    #[error("invalid definition in '{path}': {reason}")]
    InvalidDefinition { path: PathBuf, reason: String },

    /// A handler with the same name is already registered.
    #[error("'{name}' is already loaded")]
    Duplicate { name: String },

    /// The reloaded module's `pre_load` check declined registration.
    #[error("'{name}' declined to load")]
    Declined { name: String },

    /// An extension's `on_load` hook failed.
    #[error("on_load hook of extension '{name}' failed: {source}")]
    Hook {
        name: String,
        #[source]
        source: BoxError,
    },
}

fn export_hint(export: &Option<String>) -> String {
    export
        .as_deref()
        .map(|e| format!(" (looked for '{e}')"))
        .unwrap_or_default()
}

/// Lookup of a name that is not registered.
#[derive(Debug, Clone, Error)]
#[error("{kind} '{name}' does not exist")]
pub struct NotFoundError {
    /// What was looked up, e.g. `"command"`.
    pub kind: &'static str,
    pub name: String,
}

impl NotFoundError {
    pub fn command(name: impl Into<String>) -> Self {
        Self {
            kind: "command",
            name: name.into(),
        }
    }

    pub fn extension(name: impl Into<String>) -> Self {
        Self {
            kind: "extension",
            name: name.into(),
        }
    }
}

/// Misuse of the middleware chain.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// A middleware awaited `next` more than once.
    #[error("middleware #{index} called next() more than once")]
    NextCalledTwice { index: usize },
}

/// Misuse of an invocation context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The interaction already received its initial response.
    #[error("interaction was already acknowledged")]
    AlreadyAcknowledged,

    /// The interaction has not been acknowledged yet.
    #[error("interaction has not been acknowledged")]
    NotAcknowledged,

    /// The gateway call failed.
    #[error(transparent)]
    Api(#[from] basalt_core::ApiError),
}

/// A command or middleware failed while handling an invocation.
///
/// Carried by the `commandError` event; never returned to the transport.
#[derive(Debug, Error)]
#[error("command '{command}' failed: {source}")]
pub struct HandlerError {
    pub command: String,
    #[source]
    pub source: BoxError,
}

impl HandlerError {
    pub fn new(command: impl Into<String>, source: BoxError) -> Self {
        Self {
            command: command.into(),
            source,
        }
    }

    /// Returns the underlying error if it is of type `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

/// Failure to read language files.
#[derive(Debug, Error)]
pub enum LocalizationError {
    /// No language directory was configured.
    #[error("no language directory configured")]
    NoDirectory,

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed language file '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Any error a registry or sync operation can return.
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("failed to read directory '{path}': {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Api(#[from] basalt_core::ApiError),
}

/// Result type for registry operations.
pub type FrameworkResult<T> = Result<T, FrameworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_export_message() {
        let err = LoadError::NoExport {
            path: PathBuf::from("commands/ping.toml"),
            export: Some("ping".into()),
        };
        assert_eq!(
            err.to_string(),
            "module 'commands/ping.toml' has no valid export (looked for 'ping')"
        );
    }

    #[test]
    fn test_handler_error_downcast() {
        let err = HandlerError::new("x", Box::new(ProtocolError::NextCalledTwice { index: 2 }));
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::NextCalledTwice { index: 2 })
        ));
    }
}
