//! Module loading: turning a path into a handler constructor.
//!
//! The registries never construct handlers themselves. They ask a
//! [`ModuleLoader`] for the constructor exported by the module at a path, and
//! tell it to [`invalidate`](ModuleLoader::invalidate) that path on unload so
//! the next import re-reads it.
//!
//! # Manifest modules
//!
//! [`ManifestLoader`] reads TOML manifests. The manifest carries the
//! definition; the behaviour comes from code, linked in under an export id:
//!
//! ```toml
//! # commands/ping.toml
//! export = "ping"
//!
//! [command]
//! name = "ping"
//! description = "Check that the bot is alive"
//! cooldown = 5
//! ```
//!
//! ```rust,ignore
//! use basalt_framework::loader::{COMMAND_EXPORTS, CommandExport};
//! use basalt_framework::linkme::distributed_slice;
//!
//! #[distributed_slice(COMMAND_EXPORTS)]
//! #[linkme(crate = basalt_framework::linkme)]
//! static PING: CommandExport = CommandExport { id: "ping", create: Ping::create };
//! ```
//!
//! Editing the manifest and reloading the command picks up the new
//! definition without restarting the process.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use linkme::distributed_slice;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tower::BoxError;
use tracing::{debug, trace};

use crate::command::{BoxedCommand, CommandDefinition};
use crate::error::LoadError;
use crate::extension::{BoxedExtension, ExtensionDefinition};

/// Constructor for a command, as exported by a module.
pub type CommandFactory = Arc<dyn Fn() -> Result<BoxedCommand, BoxError> + Send + Sync>;

/// Constructor for an extension, as exported by a module.
pub type ExtensionFactory = Arc<dyn Fn() -> Result<BoxedExtension, BoxError> + Send + Sync>;

/// Builds a command from the definition read out of its manifest.
pub type CreateCommandFn = fn(CommandDefinition) -> Result<BoxedCommand, BoxError>;

/// Builds an extension from the definition read out of its manifest.
pub type CreateExtensionFn = fn(ExtensionDefinition) -> Result<BoxedExtension, BoxError>;

/// A command implementation linked into the binary under an export id.
pub struct CommandExport {
    pub id: &'static str,
    pub create: CreateCommandFn,
}

/// An extension implementation linked into the binary under an export id.
pub struct ExtensionExport {
    pub id: &'static str,
    pub create: CreateExtensionFn,
}

/// Command exports collected from every crate in the binary.
#[distributed_slice]
pub static COMMAND_EXPORTS: [CommandExport];

/// Extension exports collected from every crate in the binary.
#[distributed_slice]
pub static EXTENSION_EXPORTS: [ExtensionExport];

/// Resolves module paths to handler constructors.
pub trait ModuleLoader: Send + Sync {
    /// Returns the command constructor exported by the module at `path`.
    fn import_command(&self, path: &Path) -> Result<CommandFactory, LoadError>;

    /// Returns the extension constructor exported by the module at `path`.
    fn import_extension(&self, path: &Path) -> Result<ExtensionFactory, LoadError>;

    /// Drops anything cached for `path`.
    fn invalidate(&self, path: &Path);

    /// Lists the module paths in `dir`, sorted.
    ///
    /// Skips sub-directories, dot-files and source-map artifacts (`*.map`).
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if is_module_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// A shared loader trait object.
pub type BoxedLoader = Arc<dyn ModuleLoader>;

fn is_module_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('.') && !name.ends_with(".map")
}

// =============================================================================
// ManifestLoader
// =============================================================================

#[derive(Deserialize)]
struct CommandManifest {
    export: String,
    command: CommandDefinition,
}

#[derive(Deserialize)]
struct ExtensionManifest {
    export: String,
    extension: ExtensionDefinition,
}

/// Loads TOML manifests and binds them to linked-in exports.
///
/// Parsed modules are cached by path until invalidated.
pub struct ManifestLoader {
    commands: RwLock<HashMap<String, CreateCommandFn>>,
    extensions: RwLock<HashMap<String, CreateExtensionFn>>,
    command_cache: Mutex<HashMap<PathBuf, CommandFactory>>,
    extension_cache: Mutex<HashMap<PathBuf, ExtensionFactory>>,
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestLoader {
    /// Creates a loader that knows every export in [`COMMAND_EXPORTS`] and
    /// [`EXTENSION_EXPORTS`].
    pub fn new() -> Self {
        let loader = Self::empty();
        for export in COMMAND_EXPORTS {
            loader.register_command(export.id, export.create);
        }
        for export in EXTENSION_EXPORTS {
            loader.register_extension(export.id, export.create);
        }
        loader
    }

    /// Creates a loader with no exports.
    pub fn empty() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
            extensions: RwLock::new(HashMap::new()),
            command_cache: Mutex::new(HashMap::new()),
            extension_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a command export; a later registration of the same id wins.
    pub fn register_command(&self, id: impl Into<String>, create: CreateCommandFn) {
        self.commands.write().insert(id.into(), create);
    }

    /// Registers an extension export; a later registration of the same id wins.
    pub fn register_extension(&self, id: impl Into<String>, create: CreateExtensionFn) {
        self.extensions.write().insert(id.into(), create);
    }

    /// Builder-style [`register_command`](Self::register_command).
    pub fn with_command(self, id: impl Into<String>, create: CreateCommandFn) -> Self {
        self.register_command(id, create);
        self
    }

    /// Builder-style [`register_extension`](Self::register_extension).
    pub fn with_extension(self, id: impl Into<String>, create: CreateExtensionFn) -> Self {
        self.register_extension(id, create);
        self
    }

    fn read(path: &Path) -> Result<String, LoadError> {
        std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse<T: serde::de::DeserializeOwned>(path: &Path, raw: &str) -> Result<T, LoadError> {
        toml::from_str(raw).map_err(|e| LoadError::Malformed {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })
    }
}

impl ModuleLoader for ManifestLoader {
    fn import_command(&self, path: &Path) -> Result<CommandFactory, LoadError> {
        if let Some(factory) = self.command_cache.lock().get(path) {
            trace!(path = %path.display(), "Command module served from cache");
            return Ok(Arc::clone(factory));
        }

        let manifest: CommandManifest = Self::parse(path, &Self::read(path)?)?;
        let create = self
            .commands
            .read()
            .get(&manifest.export)
            .copied()
            .ok_or_else(|| LoadError::NoExport {
                path: path.to_path_buf(),
                export: Some(manifest.export.clone()),
            })?;

        let definition = manifest.command;
        let factory: CommandFactory = Arc::new(move || create(definition.clone()));
        self.command_cache
            .lock()
            .insert(path.to_path_buf(), Arc::clone(&factory));
        debug!(path = %path.display(), export = %manifest.export, "Imported command module");
        Ok(factory)
    }

    fn import_extension(&self, path: &Path) -> Result<ExtensionFactory, LoadError> {
        if let Some(factory) = self.extension_cache.lock().get(path) {
            trace!(path = %path.display(), "Extension module served from cache");
            return Ok(Arc::clone(factory));
        }

        let manifest: ExtensionManifest = Self::parse(path, &Self::read(path)?)?;
        let create = self
            .extensions
            .read()
            .get(&manifest.export)
            .copied()
            .ok_or_else(|| LoadError::NoExport {
                path: path.to_path_buf(),
                export: Some(manifest.export.clone()),
            })?;

        let definition = manifest.extension;
        let factory: ExtensionFactory = Arc::new(move || create(definition.clone()));
        self.extension_cache
            .lock()
            .insert(path.to_path_buf(), Arc::clone(&factory));
        debug!(path = %path.display(), export = %manifest.export, "Imported extension module");
        Ok(factory)
    }

    fn invalidate(&self, path: &Path) {
        let dropped = self.command_cache.lock().remove(path).is_some()
            | self.extension_cache.lock().remove(path).is_some();
        if dropped {
            trace!(path = %path.display(), "Invalidated cached module");
        }
    }
}

// =============================================================================
// MemoryLoader
// =============================================================================

#[derive(Clone)]
enum MemoryModule {
    Command(CommandFactory),
    Extension(ExtensionFactory),
}

/// A loader over modules registered in memory under virtual paths.
///
/// Useful for commands defined entirely in code, and for swapping a module's
/// contents at runtime to exercise reloads.
#[derive(Default)]
pub struct MemoryLoader {
    modules: RwLock<HashMap<PathBuf, MemoryModule>>,
    invalidations: AtomicUsize,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a command module at `path`, replacing whatever was there.
    pub fn insert_command<F>(&self, path: impl Into<PathBuf>, factory: F)
    where
        F: Fn() -> Result<BoxedCommand, BoxError> + Send + Sync + 'static,
    {
        self.modules
            .write()
            .insert(path.into(), MemoryModule::Command(Arc::new(factory)));
    }

    /// Places an extension module at `path`, replacing whatever was there.
    pub fn insert_extension<F>(&self, path: impl Into<PathBuf>, factory: F)
    where
        F: Fn() -> Result<BoxedExtension, BoxError> + Send + Sync + 'static,
    {
        self.modules
            .write()
            .insert(path.into(), MemoryModule::Extension(Arc::new(factory)));
    }

    /// Removes the module at `path`.
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.modules.write().remove(path.as_ref());
    }

    /// Number of [`invalidate`](ModuleLoader::invalidate) calls so far.
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    fn get(&self, path: &Path) -> Result<MemoryModule, LoadError> {
        self.modules
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no module at this path"),
            })
    }
}

impl ModuleLoader for MemoryLoader {
    fn import_command(&self, path: &Path) -> Result<CommandFactory, LoadError> {
        match self.get(path)? {
            MemoryModule::Command(factory) => Ok(factory),
            MemoryModule::Extension(_) => Err(LoadError::NoExport {
                path: path.to_path_buf(),
                export: None,
            }),
        }
    }

    fn import_extension(&self, path: &Path) -> Result<ExtensionFactory, LoadError> {
        match self.get(path)? {
            MemoryModule::Extension(factory) => Ok(factory),
            MemoryModule::Command(_) => Err(LoadError::NoExport {
                path: path.to_path_buf(),
                export: None,
            }),
        }
    }

    fn invalidate(&self, _path: &Path) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = self
            .modules
            .read()
            .keys()
            .filter(|p| p.parent() == Some(dir) && is_module_file(p))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::command::FnCommand;
    use crate::extension::Extension;

    fn create_echo(definition: CommandDefinition) -> Result<BoxedCommand, BoxError> {
        Ok(Arc::new(FnCommand::new(definition, |_ctx| async { Ok(()) })))
    }

    fn create_failing(_definition: CommandDefinition) -> Result<BoxedCommand, BoxError> {
        Err("constructor exploded".into())
    }

    struct Noop(ExtensionDefinition);

    #[async_trait::async_trait]
    impl Extension for Noop {
        fn definition(&self) -> &ExtensionDefinition {
            &self.0
        }
    }

    fn create_noop(definition: ExtensionDefinition) -> Result<BoxedExtension, BoxError> {
        Ok(Arc::new(Noop(definition)))
    }

    const ECHO: &str = r#"
        export = "echo"

        [command]
        name = "echo"
        description = "Echo back"
        cooldown = 3
    "#;

    #[test]
    fn test_import_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echo.toml");
        fs::write(&path, ECHO).unwrap();

        let loader = ManifestLoader::empty().with_command("echo", create_echo);
        let factory = loader.import_command(&path).unwrap();
        let cmd = factory().unwrap();
        assert_eq!(cmd.name(), "echo");
        assert_eq!(cmd.definition().cooldown, 3);
    }

    #[test]
    fn test_cache_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echo.toml");
        fs::write(&path, ECHO).unwrap();

        let loader = ManifestLoader::empty().with_command("echo", create_echo);
        loader.import_command(&path).unwrap();

        fs::write(&path, ECHO.replace("cooldown = 3", "cooldown = 9")).unwrap();
        let cached = loader.import_command(&path).unwrap()().unwrap();
        assert_eq!(cached.definition().cooldown, 3);

        loader.invalidate(&path);
        let fresh = loader.import_command(&path).unwrap()().unwrap();
        assert_eq!(fresh.definition().cooldown, 9);
    }

    #[test]
    fn test_unknown_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echo.toml");
        fs::write(&path, ECHO).unwrap();

        let loader = ManifestLoader::empty();
        assert!(matches!(
            loader.import_command(&path),
            Err(LoadError::NoExport { export: Some(ref e), .. }) if e == "echo"
        ));
    }

    #[test]
    fn test_malformed_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "export = ").unwrap();

        let loader = ManifestLoader::empty();
        assert!(matches!(
            loader.import_command(&path),
            Err(LoadError::Malformed { .. })
        ));
        assert!(matches!(
            loader.import_command(&dir.path().join("missing.toml")),
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn test_factory_error_surfaces_on_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("echo.toml");
        fs::write(&path, ECHO).unwrap();

        let loader = ManifestLoader::empty().with_command("echo", create_failing);
        let factory = loader.import_command(&path).unwrap();
        assert!(factory().is_err());
    }

    #[test]
    fn test_import_extension_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noop.toml");
        fs::write(&path, "export = \"noop\"\n[extension]\nname = \"noop\"\n").unwrap();

        let loader = ManifestLoader::empty().with_extension("noop", create_noop);
        let ext = loader.import_extension(&path).unwrap()().unwrap();
        assert_eq!(ext.name(), "noop");
        assert!(loader.import_command(&path).is_err());
    }

    #[test]
    fn test_list_skips_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.toml", "a.toml", "a.toml.map", ".hidden"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();

        let listed = ManifestLoader::empty().list(dir.path()).unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.toml", "b.toml"]);
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new();
        loader.insert_command("cmds/echo", || {
            create_echo(CommandDefinition::new("echo", "Echo back"))
        });
        loader.insert_extension("exts/noop", || {
            create_noop(ExtensionDefinition::new("noop"))
        });

        assert!(loader.import_command(Path::new("cmds/echo")).is_ok());
        assert!(loader.import_extension(Path::new("cmds/echo")).is_err());
        assert_eq!(
            loader.list(Path::new("cmds")).unwrap(),
            [PathBuf::from("cmds/echo")]
        );

        loader.invalidate(Path::new("cmds/echo"));
        assert_eq!(loader.invalidations(), 1);
    }
}
