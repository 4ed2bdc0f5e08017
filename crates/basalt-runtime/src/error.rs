//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use basalt_framework::{FrameworkError, LocalizationError};

/// Errors that can occur while building or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Loading modules or syncing commands failed.
    #[error(transparent)]
    Framework(#[from] FrameworkError),

    #[error(transparent)]
    Localization(#[from] LocalizationError),

    /// The builder was never given a gateway.
    #[error("No gateway configured")]
    MissingGateway,

    /// A signal handler could not be installed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
