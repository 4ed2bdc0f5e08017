//! Foundation layer - Platform model shared by every other crate.
//!
//! This module contains the plain data the framework routes:
//! - Snowflake identifiers
//! - Inbound interactions and the users, members and guilds they reference
//! - Permission tokens and bitfields

pub mod id;
pub mod interaction;
pub mod permission;

pub use id::{ApplicationId, ChannelId, GuildId, InteractionId, MessageId, UserId};
pub use interaction::{
    CommandInteraction, ComponentInteraction, Guild, Interaction, Member, User,
};
pub use permission::{Permission, Permissions, UnknownPermission};
