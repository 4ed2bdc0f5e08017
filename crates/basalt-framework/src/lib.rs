//! # Basalt Framework
//!
//! Command dispatch for interaction-based chat bots.
//!
//! This layer provides:
//! - Command and extension registries with hot load / unload / reload
//! - Module loaders (manifest files backed by link-time exports, or in-memory)
//! - Gates: owner-only, guild-only, per-user cooldowns and permissions
//! - A `(ctx, next)` middleware pipeline in front of every command
//! - Lifecycle events (`commandSuccess`, `commandError`, ...)
//! - Localized string tables and component collectors
//!
//! The [`Dispatcher`] ties these together; the runtime crate feeds it
//! interactions from a gateway.

pub mod collector;
pub mod command;
pub mod context;
pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod extension;
pub mod gate;
pub mod loader;
pub mod localization;
pub mod owners;
pub mod pipeline;
pub mod registry;

pub use collector::{ComponentFilter, InteractionCollector, InteractionHub, await_component};
pub use command::{BoxedCommand, CHAT_INPUT, Command, CommandDefinition, FnCommand};
pub use context::{ContextServices, InvocationContext};
pub use cooldown::{CooldownTracker, MAX_COOLDOWN};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherBuilder};
pub use error::{
    ContextError, FrameworkError, FrameworkResult, HandlerError, LoadError, LocalizationError,
    NotFoundError, ProtocolError,
};
pub use event::{EventBus, EventKind, LifecycleEvent, ListenerId};
pub use extension::{BoxedExtension, Extension, ExtensionDefinition};
pub use gate::{Gates, Rejection};
pub use loader::{
    BoxedLoader, COMMAND_EXPORTS, CommandExport, EXTENSION_EXPORTS, ExtensionExport,
    ManifestLoader, MemoryLoader, ModuleLoader,
};
pub use localization::{
    BoxedStringTable, ClientLocale, DEFAULT_LANGUAGE, LanguageMiddleware, LanguageProvider,
    Localizer, StringTable,
};
pub use owners::OwnerSet;
pub use pipeline::{Middleware, MiddlewareId, Next, Pipeline};
pub use registry::{CommandRegistry, ExtensionRegistry, ReloadPolicy};

pub use linkme;
pub use tower::BoxError;
