//! Gateway trait and related types.
//!
//! The [`Gateway`] is the framework's only route back to the platform: it
//! sends interaction responses, synchronises the command list, and looks up
//! the application's owners. Inbound interactions flow the other way through
//! an [`InteractionSender`] / [`InteractionReceiver`] pair.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::foundation::{CommandInteraction, Interaction, UserId};

/// Sending half of the inbound interaction channel, held by the transport.
pub type InteractionSender = mpsc::Sender<Interaction>;

/// Receiving half of the inbound interaction channel, drained by the runtime.
pub type InteractionReceiver = mpsc::Receiver<Interaction>;

/// Creates the channel a transport uses to deliver interactions to the runtime.
pub fn interaction_channel(buffer_size: usize) -> (InteractionSender, InteractionReceiver) {
    mpsc::channel(buffer_size)
}

/// Result type for gateway calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error type for gateway calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The gateway is not connected.
    #[error("gateway is not connected")]
    NotConnected,

    /// The call timed out.
    #[error("API call timed out")]
    Timeout,

    /// The platform rejected the request.
    #[error("API error ({status}): {message}")]
    Http { status: u16, message: String },

    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Message flag marking a response as visible only to the invoker.
pub const EPHEMERAL: u64 = 1 << 6;

/// The body of an interaction response or follow-up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Value>,
    #[serde(default)]
    pub flags: u64,
}

impl InteractionContent {
    /// Plain text content.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Marks the content as ephemeral.
    pub fn ephemeral(mut self) -> Self {
        self.flags |= EPHEMERAL;
        self
    }

    pub fn embed(mut self, embed: Value) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn component(mut self, row: Value) -> Self {
        self.components.push(row);
        self
    }
}

impl From<&str> for InteractionContent {
    fn from(content: &str) -> Self {
        Self::text(content)
    }
}

impl From<String> for InteractionContent {
    fn from(content: String) -> Self {
        Self::text(content)
    }
}

/// The initial response to an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InteractionResponse {
    /// Respond with a message.
    ChannelMessage(InteractionContent),
    /// Acknowledge now, edit the response later.
    DeferredChannelMessage { flags: u64 },
}

/// Projection of a command suitable for registering it with the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationCommand {
    /// Command type; `1` is a chat-input (slash) command.
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_localizations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_localizations: Option<BTreeMap<String, String>>,
}

/// The transport-side capability the framework calls through.
///
/// Implementations wrap a concrete platform client (REST + gateway
/// connection). Every method is fallible with [`ApiError`]; the framework
/// never retries on its own.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Sends the initial response to a command interaction.
    async fn create_interaction_response(
        &self,
        interaction: &CommandInteraction,
        response: InteractionResponse,
    ) -> ApiResult<()>;

    /// Edits the initial response.
    async fn edit_original_response(
        &self,
        interaction: &CommandInteraction,
        content: InteractionContent,
    ) -> ApiResult<()>;

    /// Sends an additional message after the initial response.
    async fn create_followup(
        &self,
        interaction: &CommandInteraction,
        content: InteractionContent,
    ) -> ApiResult<()>;

    /// Deletes the initial response.
    async fn delete_original_response(&self, interaction: &CommandInteraction) -> ApiResult<()>;

    /// Replaces the full set of registered application commands.
    async fn bulk_update_commands(&self, commands: Vec<ApplicationCommand>) -> ApiResult<()>;

    /// Creates or overwrites a single application command.
    async fn upsert_command(&self, command: ApplicationCommand) -> ApiResult<()>;

    /// Returns the ids of the application's owners (or team members).
    async fn fetch_application_owners(&self) -> ApiResult<Vec<UserId>>;
}

/// A shared gateway trait object.
pub type BoxedGateway = Arc<dyn Gateway>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_builders() {
        let content = InteractionContent::text("hi").ephemeral();
        assert_eq!(content.content.as_deref(), Some("hi"));
        assert_eq!(content.flags & EPHEMERAL, EPHEMERAL);

        let json = serde_json::to_value(InteractionContent::from("x")).unwrap();
        assert_eq!(json, serde_json::json!({ "content": "x", "flags": 0 }));
    }

    #[test]
    fn test_application_command_serialization() {
        let cmd = ApplicationCommand {
            kind: 1,
            name: "ping".into(),
            description: "Pong!".into(),
            options: None,
            name_localizations: None,
            description_localizations: None,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": 1, "name": "ping", "description": "Pong!" })
        );
    }

    #[tokio::test]
    async fn test_interaction_channel() {
        let (tx, mut rx) = interaction_channel(4);
        tx.send(Interaction::Ping).await.unwrap();
        assert_eq!(rx.recv().await, Some(Interaction::Ping));
    }
}
