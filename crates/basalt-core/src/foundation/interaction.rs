//! Inbound interaction model.
//!
//! An [`Interaction`] is what the gateway delivers when a user triggers a
//! slash command, presses a button, and so on. Only [`Interaction::Command`]
//! is routed to command handlers; the other kinds are published to
//! collectors and otherwise ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::{ChannelId, GuildId, InteractionId, MessageId, UserId};
use super::permission::Permissions;

/// A platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn new(id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            bot: false,
        }
    }
}

/// A user in the context of a guild, with resolved permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
}

impl Member {
    pub fn new(user: User, permissions: Permissions) -> Self {
        Self {
            user,
            nick: None,
            permissions,
        }
    }

    /// Nickname if set, otherwise the username.
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.user.username)
    }
}

/// A guild (server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
}

fn default_locale() -> String {
    "en-US".to_string()
}

/// A slash-command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInteraction {
    pub id: InteractionId,
    pub token: String,
    /// Name of the invoked command.
    pub command_name: String,
    /// Raw option payload; its schema is owned by the command.
    #[serde(default)]
    pub options: Value,
    pub user: User,
    /// Present when the command was invoked inside a guild.
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub guild: Option<Guild>,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    /// The invoking client's locale.
    #[serde(default = "default_locale")]
    pub locale: String,
}

/// A message-component (button, select menu) interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInteraction {
    pub id: InteractionId,
    pub token: String,
    pub custom_id: String,
    /// The message the component is attached to.
    pub message_id: MessageId,
    pub user: User,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

/// Any inbound interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interaction {
    Ping,
    Command(CommandInteraction),
    Component(ComponentInteraction),
    Autocomplete(CommandInteraction),
}

impl Interaction {
    /// Short name of the interaction kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Command(_) => "command",
            Self::Component(_) => "component",
            Self::Autocomplete(_) => "autocomplete",
        }
    }

    pub fn as_command(&self) -> Option<&CommandInteraction> {
        match self {
            Self::Command(cmd) => Some(cmd),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&ComponentInteraction> {
        match self {
            Self::Component(component) => Some(component),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_interaction_from_json() {
        let raw = r#"{
            "type": "command",
            "id": "1",
            "token": "tok",
            "command_name": "ping",
            "user": { "id": "10", "username": "alice" }
        }"#;
        let interaction: Interaction = serde_json::from_str(raw).unwrap();
        let cmd = interaction.as_command().unwrap();
        assert_eq!(cmd.command_name, "ping");
        assert_eq!(cmd.locale, "en-US");
        assert!(cmd.guild.is_none());
        assert_eq!(interaction.kind(), "command");
    }

    #[test]
    fn test_component_is_not_command() {
        let interaction = Interaction::Component(ComponentInteraction {
            id: InteractionId::new(2),
            token: "tok".into(),
            custom_id: "confirm".into(),
            message_id: MessageId::new(3),
            user: User::new(10, "alice"),
            guild_id: None,
        });
        assert!(interaction.as_command().is_none());
        assert!(interaction.as_component().is_some());
    }

    #[test]
    fn test_member_display_name() {
        let mut member = Member::new(User::new(1, "bob"), Permissions::empty());
        assert_eq!(member.display_name(), "bob");
        member.nick = Some("bobby".into());
        assert_eq!(member.display_name(), "bobby");
    }
}
