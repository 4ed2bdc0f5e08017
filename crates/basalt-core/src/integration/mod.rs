//! Integration layer - External system interfaces.
//!
//! This module contains the seams the framework calls through:
//! - Gateway for responses, command sync and owner lookup
//! - Inbound interaction channel
//! - Permission resolution
//! - Invite links

pub mod gateway;
pub mod invite;
pub mod permission;

pub use gateway::{
    ApiError, ApiResult, ApplicationCommand, BoxedGateway, EPHEMERAL, Gateway,
    InteractionContent, InteractionReceiver, InteractionResponse, InteractionSender,
    interaction_channel,
};
pub use invite::invite_url;
pub use permission::{BitfieldPermissionChecker, PermissionChecker};
