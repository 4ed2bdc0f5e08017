//! Command and extension registries.
//!
//! Both registries map a unique name to a live handler and the module path it
//! was loaded from. Mutations (load, unload, reload) are serialized through an
//! async writer lock; lookups used by dispatch only take a short read lock and
//! hand out `Arc` clones, so an invocation keeps the handler it resolved even
//! if that handler is reloaded underneath it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::command::BoxedCommand;
use crate::error::{FrameworkError, FrameworkResult, LoadError, NotFoundError};
use crate::extension::BoxedExtension;
use crate::loader::BoxedLoader;
use basalt_core::ApplicationCommand;

/// What happens when a reload fails to load the new module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// The handler stays unregistered until loaded again.
    #[default]
    Unregister,
    /// The previous handler is put back.
    RestorePrevious,
}

// =============================================================================
// Table (internal)
// =============================================================================

struct Entry<H> {
    handler: H,
    path: PathBuf,
}

/// Name-keyed table that remembers insertion order.
struct Table<H> {
    entries: HashMap<String, Entry<H>>,
    order: Vec<String>,
}

impl<H: Clone> Table<H> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<H> {
        self.entries.get(name).map(|e| e.handler.clone())
    }

    fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.entries.get(name).map(|e| e.path.clone())
    }

    fn insert(&mut self, name: String, handler: H, path: PathBuf) {
        self.order.push(name.clone());
        self.entries.insert(name, Entry { handler, path });
    }

    fn remove(&mut self, name: &str) -> Option<Entry<H>> {
        let entry = self.entries.remove(name)?;
        self.order.retain(|n| n != name);
        Some(entry)
    }

    fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    fn handlers(&self) -> Vec<H> {
        self.order
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

fn list_dir(loader: &BoxedLoader, dir: &Path) -> FrameworkResult<Vec<PathBuf>> {
    loader
        .list(dir)
        .map_err(|source| FrameworkError::Directory {
            path: dir.to_path_buf(),
            source,
        })
}

// =============================================================================
// CommandRegistry
// =============================================================================

/// Registry of loaded commands.
pub struct CommandRegistry {
    loader: BoxedLoader,
    policy: ReloadPolicy,
    table: RwLock<Table<BoxedCommand>>,
    writer: Mutex<()>,
}

impl CommandRegistry {
    pub fn new(loader: BoxedLoader) -> Self {
        Self {
            loader,
            policy: ReloadPolicy::default(),
            table: RwLock::new(Table::new()),
            writer: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: ReloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ReloadPolicy {
        self.policy
    }

    /// Loads the command exported by the module at `path`.
    ///
    /// If the command's `pre_load` returns `false` the instance is returned
    /// but not registered.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<BoxedCommand, LoadError> {
        let _guard = self.writer.lock().await;
        self.load_locked(path.as_ref()).map(|(command, _)| command)
    }

    /// Loads every module in `dir` in file-name order.
    ///
    /// Stops at the first failure. Returns the number of commands registered.
    pub async fn load_all(&self, dir: impl AsRef<Path>) -> FrameworkResult<usize> {
        let dir = dir.as_ref();
        let _guard = self.writer.lock().await;
        let mut count = 0;
        for path in list_dir(&self.loader, dir)? {
            let (_, registered) = self.load_locked(&path)?;
            count += usize::from(registered);
        }
        info!(dir = %dir.display(), count, "Loaded commands");
        Ok(count)
    }

    /// Unregisters a command and invalidates its module.
    pub async fn unload(&self, name: &str) -> Result<(), NotFoundError> {
        let _guard = self.writer.lock().await;
        self.unload_locked(name).map(|_| ())
    }

    /// Unloads a command and loads it again from the same path.
    ///
    /// On failure, including a declined `pre_load`, the command is left
    /// unregistered unless the registry uses [`ReloadPolicy::RestorePrevious`].
    pub async fn reload(&self, name: &str) -> FrameworkResult<BoxedCommand> {
        let _guard = self.writer.lock().await;
        let previous = self.unload_locked(name)?;

        let reloaded = self
            .load_locked(&previous.path)
            .and_then(|(command, registered)| {
                if registered {
                    Ok(command)
                } else {
                    Err(LoadError::Declined {
                        name: command.name().to_string(),
                    })
                }
            });
        match reloaded {
            Ok(command) => {
                info!(command = %name, "Reloaded command");
                Ok(command)
            }
            Err(err) => {
                match self.policy {
                    ReloadPolicy::Unregister => {
                        warn!(command = %name, error = %err, "Reload failed, command is now unregistered");
                    }
                    ReloadPolicy::RestorePrevious => {
                        warn!(command = %name, error = %err, "Reload failed, previous command restored");
                        self.table
                            .write()
                            .insert(name.to_string(), previous.handler, previous.path);
                    }
                }
                Err(err.into())
            }
        }
    }

    fn load_locked(&self, path: &Path) -> Result<(BoxedCommand, bool), LoadError> {
        let factory = self.loader.import_command(path)?;
        let command = factory().map_err(|source| LoadError::Instantiate {
            path: path.to_path_buf(),
            source,
        })?;
        command
            .definition()
            .validate()
            .map_err(|reason| LoadError::InvalidDefinition {
                path: path.to_path_buf(),
                reason,
            })?;

        if !command.pre_load() {
            warn!(command = %command.name(), path = %path.display(), "Pre-load check declined, command not registered");
            return Ok((command, false));
        }

        let mut table = self.table.write();
        if table.contains(command.name()) {
            error!(command = %command.name(), path = %path.display(), "Command is already loaded");
            return Err(LoadError::Duplicate {
                name: command.name().to_string(),
            });
        }
        table.insert(
            command.name().to_string(),
            Arc::clone(&command),
            path.to_path_buf(),
        );
        debug!(command = %command.name(), path = %path.display(), "Loaded command");
        Ok((command, true))
    }

    fn unload_locked(&self, name: &str) -> Result<Entry<BoxedCommand>, NotFoundError> {
        let path = self
            .table
            .read()
            .path_of(name)
            .ok_or_else(|| NotFoundError::command(name))?;
        self.loader.invalidate(&path);
        let entry = self
            .table
            .write()
            .remove(name)
            .ok_or_else(|| NotFoundError::command(name))?;
        debug!(command = %name, "Unloaded command");
        Ok(entry)
    }

    pub fn get(&self, name: &str) -> Option<BoxedCommand> {
        self.table.read().get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.read().contains(name)
    }

    /// Path the command was loaded from.
    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.table.read().path_of(name)
    }

    /// Registered names, in load order.
    pub fn names(&self) -> Vec<String> {
        self.table.read().names()
    }

    /// Snapshot of every registered command, in load order.
    pub fn commands(&self) -> Vec<BoxedCommand> {
        self.table.read().handlers()
    }

    /// Platform projections of every registered command.
    pub fn json(&self) -> Vec<ApplicationCommand> {
        self.commands().iter().map(|c| c.json()).collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// ExtensionRegistry
// =============================================================================

/// Registry of loaded extensions.
///
/// Unlike commands, extensions run hooks: `on_load` must succeed before the
/// extension is registered, and `on_unload` runs before it is removed.
pub struct ExtensionRegistry {
    loader: BoxedLoader,
    policy: ReloadPolicy,
    table: RwLock<Table<BoxedExtension>>,
    writer: Mutex<()>,
}

impl ExtensionRegistry {
    pub fn new(loader: BoxedLoader) -> Self {
        Self {
            loader,
            policy: ReloadPolicy::default(),
            table: RwLock::new(Table::new()),
            writer: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: ReloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ReloadPolicy {
        self.policy
    }

    /// Loads the extension exported by the module at `path` and runs its
    /// `on_load` hook.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<BoxedExtension, LoadError> {
        let _guard = self.writer.lock().await;
        self.load_locked(path.as_ref()).await
    }

    /// Loads every module in `dir` in file-name order, stopping at the first
    /// failure. Returns the number of extensions registered.
    pub async fn load_all(&self, dir: impl AsRef<Path>) -> FrameworkResult<usize> {
        let dir = dir.as_ref();
        let _guard = self.writer.lock().await;
        let mut count = 0;
        for path in list_dir(&self.loader, dir)? {
            self.load_locked(&path).await?;
            count += 1;
        }
        info!(dir = %dir.display(), count, "Loaded extensions");
        Ok(count)
    }

    /// Runs the extension's `on_unload` hook, then unregisters it.
    ///
    /// A failing hook is logged; the extension is removed regardless.
    pub async fn unload(&self, name: &str) -> Result<(), NotFoundError> {
        let _guard = self.writer.lock().await;
        self.unload_locked(name).await.map(|_| ())
    }

    /// Unloads an extension and loads it again from the same path.
    pub async fn reload(&self, name: &str) -> FrameworkResult<BoxedExtension> {
        let _guard = self.writer.lock().await;
        let previous = self.unload_locked(name).await?;

        match self.load_locked(&previous.path).await {
            Ok(extension) => {
                info!(extension = %name, "Reloaded extension");
                Ok(extension)
            }
            Err(err) => {
                match self.policy {
                    ReloadPolicy::Unregister => {
                        warn!(extension = %name, error = %err, "Reload failed, extension is now unregistered");
                    }
                    ReloadPolicy::RestorePrevious => match previous.handler.on_load().await {
                        Ok(()) => {
                            warn!(extension = %name, error = %err, "Reload failed, previous extension restored");
                            self.table.write().insert(
                                name.to_string(),
                                previous.handler,
                                previous.path,
                            );
                        }
                        Err(hook_err) => {
                            error!(extension = %name, error = %hook_err, "Could not restore previous extension");
                        }
                    },
                }
                Err(err.into())
            }
        }
    }

    /// Runs `on_exit` for every loaded extension, in load order.
    ///
    /// Failures are logged and never stop the remaining hooks.
    pub async fn exit_all(&self) {
        let extensions = self.extensions();
        for extension in extensions {
            if let Err(err) = extension.on_exit().await {
                error!(extension = %extension.name(), error = %err, "Exit hook failed");
            }
        }
    }

    async fn load_locked(&self, path: &Path) -> Result<BoxedExtension, LoadError> {
        let factory = self.loader.import_extension(path)?;
        let extension = factory().map_err(|source| LoadError::Instantiate {
            path: path.to_path_buf(),
            source,
        })?;
        extension
            .definition()
            .validate()
            .map_err(|reason| LoadError::InvalidDefinition {
                path: path.to_path_buf(),
                reason,
            })?;

        let name = extension.name().to_string();
        if self.table.read().contains(&name) {
            error!(extension = %name, path = %path.display(), "Extension is already loaded");
            return Err(LoadError::Duplicate { name });
        }

        extension
            .on_load()
            .await
            .map_err(|source| LoadError::Hook {
                name: name.clone(),
                source,
            })?;

        self.table
            .write()
            .insert(name.clone(), Arc::clone(&extension), path.to_path_buf());
        debug!(extension = %name, path = %path.display(), "Loaded extension");
        Ok(extension)
    }

    async fn unload_locked(&self, name: &str) -> Result<Entry<BoxedExtension>, NotFoundError> {
        let extension = self
            .table
            .read()
            .get(name)
            .ok_or_else(|| NotFoundError::extension(name))?;

        if let Err(err) = extension.on_unload().await {
            error!(extension = %name, error = %err, "Unload hook failed, removing anyway");
        }

        let entry = self
            .table
            .write()
            .remove(name)
            .ok_or_else(|| NotFoundError::extension(name))?;
        self.loader.invalidate(&entry.path);
        debug!(extension = %name, "Unloaded extension");
        Ok(entry)
    }

    pub fn get(&self, name: &str) -> Option<BoxedExtension> {
        self.table.read().get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.read().contains(name)
    }

    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.table.read().path_of(name)
    }

    /// Registered names, in load order.
    pub fn names(&self) -> Vec<String> {
        self.table.read().names()
    }

    /// Snapshot of every registered extension, in load order.
    pub fn extensions(&self) -> Vec<BoxedExtension> {
        self.table.read().handlers()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
