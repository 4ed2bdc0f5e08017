//! Extensions: reloadable units with lifecycle hooks.
//!
//! An extension is anything that needs to set itself up when loaded and tear
//! itself down when unloaded or when the process exits: background tasks,
//! event listeners, caches.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tower::BoxError;

/// Immutable descriptor of an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDefinition {
    /// Unique extension name.
    pub name: String,
}

impl ExtensionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("extension name must not be empty".to_string());
        }
        Ok(())
    }
}

/// An extension handler.
///
/// Hooks are awaited by the registry: `on_load` before the extension is
/// registered, `on_unload` before it is removed. `on_exit` runs once for every
/// loaded extension when the runtime shuts down.
#[async_trait]
pub trait Extension: Send + Sync + 'static {
    fn definition(&self) -> &ExtensionDefinition;

    async fn on_load(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn on_unload(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn on_exit(&self) -> Result<(), BoxError> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.definition().name
    }
}

/// A shared extension trait object.
pub type BoxedExtension = Arc<dyn Extension>;
