//! # Basalt Core
//!
//! The platform model and integration seams of the Basalt command framework.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! Plain data that flows through the framework:
//! - **Identifiers**: Strongly-typed snowflakes ([`UserId`], [`GuildId`], ...)
//! - **Interactions**: Inbound platform events ([`Interaction`], [`CommandInteraction`])
//! - **Permissions**: Permission tokens and bitfields ([`Permission`], [`Permissions`])
//!
//! ### Integration Layer
//!
//! Capabilities the framework calls through but never implements itself:
//! - **Gateway**: Interaction responses, command sync, owner discovery ([`Gateway`])
//! - **Permission checks**: Member permission resolution ([`PermissionChecker`])
//! - **Inbound channel**: Interaction delivery from transport to runtime
//!
//! ```text
//! ┌─────────────┐  Interaction  ┌────────────┐  run(ctx)  ┌──────────┐
//! │  Transport  │──────────────▶│ Dispatcher │───────────▶│ Command  │
//! │  (Gateway)  │◀──────────────│            │            │          │
//! └─────────────┘   responses   └────────────┘            └──────────┘
//! ```

pub mod foundation;
pub mod integration;

pub use foundation::{
    ApplicationId, ChannelId, CommandInteraction, ComponentInteraction, Guild, GuildId, Interaction,
    InteractionId, Member, MessageId, Permission, Permissions, UnknownPermission, User, UserId,
};

pub use integration::{
    ApiError, ApiResult, ApplicationCommand, BitfieldPermissionChecker, BoxedGateway, EPHEMERAL,
    Gateway, InteractionContent, InteractionReceiver, InteractionResponse, InteractionSender,
    PermissionChecker, interaction_channel, invite_url,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::integration::{
        ApiError, ApiResult, Gateway, InteractionContent, InteractionResponse, PermissionChecker,
        invite_url,
    };
}
