//! # Basalt
//!
//! A command-dispatch framework for interaction-based chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐  Interaction  ┌────────────┐   ┌─────────────┐   ┌───────┐   ┌─────────┐
//! │ Gateway │──────────────▶│ Dispatcher │──▶│ Middlewares │──▶│ Gates │──▶│ Command │
//! └─────────┘               └────────────┘   └─────────────┘   └───────┘   └─────────┘
//!      ▲                          │                                             │
//!      │                          └──────── lifecycle events ◀──────────────────┘
//!      └───────────────── replies, command sync ────────────────────────────────┘
//! ```
//!
//! - **Registries**: commands and extensions, loaded from module directories
//!   and hot-reloadable at runtime
//! - **Gates**: owner-only, guild-only, per-user cooldowns, member permissions
//! - **Middlewares**: `(ctx, next)` interceptors run before every command
//! - **Events**: `commandSuccess`, `commandError`, `commandCooldown`, ...
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use basalt::prelude::*;
//!
//! #[distributed_slice(COMMAND_EXPORTS)]
//! static PING: CommandExport = CommandExport {
//!     id: "ping",
//!     create: |definition| {
//!         Ok(Arc::new(FnCommand::new(definition, |ctx: Arc<InvocationContext>| async move {
//!             ctx.reply(ctx.t("pong", &[])).await?;
//!             Ok::<(), BoxError>(())
//!         })))
//!     },
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, rx) = interaction_channel(256);
//!     let runtime = BasaltRuntime::builder().gateway(MyGateway::new(tx)).build()?;
//!     runtime.run(rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `json-log`: JSON log output

pub use basalt_core as core;
pub use basalt_framework as framework;
pub use basalt_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use basalt::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use basalt_runtime::{BasaltConfig, BasaltRuntime, ConfigLoader};

    // Platform model
    pub use basalt_core::{
        ApiError, ApiResult, ApplicationCommand, ApplicationId, CommandInteraction,
        ComponentInteraction, Gateway, Guild, GuildId, Interaction, InteractionContent,
        InteractionResponse, Member, MessageId, Permission, Permissions, User, UserId,
        interaction_channel, invite_url,
    };

    // Commands, extensions and loading
    pub use basalt_framework::linkme::distributed_slice;
    pub use basalt_framework::{
        BoxError, BoxedCommand, BoxedExtension, COMMAND_EXPORTS, Command, CommandDefinition,
        CommandExport, EXTENSION_EXPORTS, Extension, ExtensionDefinition, ExtensionExport,
        FnCommand, ReloadPolicy,
    };

    // Dispatch
    pub use basalt_framework::{
        DispatchOutcome, Dispatcher, EventKind, InvocationContext, LifecycleEvent, Middleware,
        Next, Rejection,
    };

    // Localization and collectors
    pub use basalt_framework::{
        ClientLocale, InteractionCollector, LanguageProvider, Localizer, StringTable,
    };

    // Logging macros
    pub use basalt_runtime::prelude::*;
}
