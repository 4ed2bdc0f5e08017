//! Command definitions and the [`Command`] capability trait.
//!
//! A command is two things: an immutable [`CommandDefinition`] describing how
//! it is registered and gated, and a `run` body executed once every gate has
//! passed.
//!
//! ```rust,ignore
//! use basalt_framework::{Command, CommandDefinition, InvocationContext};
//!
//! struct Ping {
//!     definition: CommandDefinition,
//! }
//!
//! #[async_trait::async_trait]
//! impl Command for Ping {
//!     fn definition(&self) -> &CommandDefinition {
//!         &self.definition
//!     }
//!
//!     async fn run(&self, ctx: Arc<InvocationContext>) -> Result<(), BoxError> {
//!         ctx.reply("pong").await?;
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::BoxError;

use crate::context::InvocationContext;
use basalt_core::{ApplicationCommand, Permission};

const MAX_NAME_LEN: usize = 32;
const MAX_DESCRIPTION_LEN: usize = 100;

/// Chat-input command type used in [`ApplicationCommand::kind`].
pub const CHAT_INPUT: u8 = 1;

/// Immutable descriptor of a command.
///
/// Deserializable so it can be read straight from a module manifest; every
/// field except `name` and `description` is optional there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    /// Unique command name.
    pub name: String,
    pub description: String,
    /// Free-form grouping, e.g. for a help listing.
    #[serde(default)]
    pub group: Option<String>,
    /// Option schema; passed through to the platform untouched.
    #[serde(default)]
    pub options: Option<Value>,
    /// Only users in the owner set may run the command.
    #[serde(default)]
    pub owner_only: bool,
    /// The command may only run inside a guild.
    #[serde(default)]
    pub guild_only: bool,
    /// Per-user cooldown in seconds; `0` disables it.
    #[serde(default)]
    pub cooldown: u64,
    /// Permissions the invoking member must hold. Only enforced for
    /// `guild_only` commands.
    #[serde(default)]
    pub required_permissions: BTreeSet<Permission>,
    #[serde(default)]
    pub name_localizations: BTreeMap<String, String>,
    #[serde(default)]
    pub description_localizations: BTreeMap<String, String>,
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            group: None,
            options: None,
            owner_only: false,
            guild_only: false,
            cooldown: 0,
            required_permissions: BTreeSet::new(),
            name_localizations: BTreeMap::new(),
            description_localizations: BTreeMap::new(),
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn owner_only(mut self, enabled: bool) -> Self {
        self.owner_only = enabled;
        self
    }

    pub fn guild_only(mut self, enabled: bool) -> Self {
        self.guild_only = enabled;
        self
    }

    pub fn cooldown(mut self, seconds: u64) -> Self {
        self.cooldown = seconds;
        self
    }

    pub fn require(mut self, permission: Permission) -> Self {
        self.required_permissions.insert(permission);
        self
    }

    pub fn localize_name(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.name_localizations.insert(locale.into(), name.into());
        self
    }

    pub fn localize_description(
        mut self,
        locale: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.description_localizations
            .insert(locale.into(), description.into());
        self
    }

    /// Checks the naming rules for commands.
    ///
    /// Names are 1 to 32 characters of lowercase ASCII letters, digits, `-`
    /// and `_`; descriptions are 1 to 100 characters.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.name.chars().count() > MAX_NAME_LEN {
            return Err(format!(
                "command name must be 1-{MAX_NAME_LEN} characters, got '{}'",
                self.name
            ));
        }
        if let Some(c) = self
            .name
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_'))
        {
            return Err(format!(
                "command name '{}' contains invalid character '{c}'",
                self.name
            ));
        }
        let len = self.description.chars().count();
        if len == 0 || len > MAX_DESCRIPTION_LEN {
            return Err(format!(
                "description of '{}' must be 1-{MAX_DESCRIPTION_LEN} characters",
                self.name
            ));
        }
        Ok(())
    }

    /// Projection used to register the command with the platform.
    pub fn json(&self) -> ApplicationCommand {
        ApplicationCommand {
            kind: CHAT_INPUT,
            name: self.name.clone(),
            description: self.description.clone(),
            options: self.options.clone(),
            name_localizations: (!self.name_localizations.is_empty())
                .then(|| self.name_localizations.clone()),
            description_localizations: (!self.description_localizations.is_empty())
                .then(|| self.description_localizations.clone()),
        }
    }
}

/// A command handler.
///
/// Implementors own their [`CommandDefinition`]; the registry never mutates
/// it. Errors returned from [`run`](Command::run) are reported through the
/// `commandError` event and do not consume the invoker's cooldown.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    fn definition(&self) -> &CommandDefinition;

    /// Decides whether the command should be registered at all.
    ///
    /// Returning `false` makes the load a no-op: the instance is handed back
    /// to the caller but never enters the registry.
    fn pre_load(&self) -> bool {
        true
    }

    async fn run(&self, ctx: Arc<InvocationContext>) -> Result<(), BoxError>;

    fn name(&self) -> &str {
        &self.definition().name
    }

    fn json(&self) -> ApplicationCommand {
        self.definition().json()
    }
}

/// A shared command trait object.
pub type BoxedCommand = Arc<dyn Command>;

/// A [`Command`] backed by an async closure.
///
/// ```rust,ignore
/// let ping = FnCommand::new(CommandDefinition::new("ping", "Pong!"), |ctx| async move {
///     ctx.reply("pong").await?;
///     Ok(())
/// });
/// ```
pub struct FnCommand<F> {
    definition: CommandDefinition,
    run: F,
    pre_load: bool,
}

impl<F, Fut> FnCommand<F>
where
    F: Fn(Arc<InvocationContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    pub fn new(definition: CommandDefinition, run: F) -> Self {
        Self {
            definition,
            run,
            pre_load: true,
        }
    }

    /// Overrides the pre-load decision.
    pub fn with_pre_load(mut self, pre_load: bool) -> Self {
        self.pre_load = pre_load;
        self
    }
}

#[async_trait]
impl<F, Fut> Command for FnCommand<F>
where
    F: Fn(Arc<InvocationContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn definition(&self) -> &CommandDefinition {
        &self.definition
    }

    fn pre_load(&self) -> bool {
        self.pre_load
    }

    async fn run(&self, ctx: Arc<InvocationContext>) -> Result<(), BoxError> {
        (self.run)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["ping", "user-info", "a_b", "x1"] {
            assert!(CommandDefinition::new(name, "desc").validate().is_ok(), "{name}");
        }
    }

    #[test]
    fn test_invalid_names() {
        let too_long = "a".repeat(33);
        for name in ["", "Ping", "has space", "emoji🙂", too_long.as_str()] {
            assert!(CommandDefinition::new(name, "desc").validate().is_err(), "{name}");
        }
    }

    #[test]
    fn test_empty_description_rejected() {
        assert!(CommandDefinition::new("ping", "").validate().is_err());
    }

    #[test]
    fn test_json_projection() {
        let def = CommandDefinition::new("ping", "Pong!")
            .cooldown(5)
            .owner_only(true)
            .localize_name("ru", "пинг");
        let json = def.json();
        assert_eq!(json.kind, CHAT_INPUT);
        assert_eq!(json.name, "ping");
        assert!(json.description_localizations.is_none());
        assert_eq!(
            json.name_localizations.unwrap().get("ru").map(String::as_str),
            Some("пинг")
        );
    }

    #[test]
    fn test_definition_from_toml() {
        let def: CommandDefinition = toml::from_str(
            r#"
            name = "ban"
            description = "Ban a member"
            guild_only = true
            cooldown = 10
            required_permissions = ["BAN_MEMBERS"]
            "#,
        )
        .unwrap();
        assert!(def.guild_only);
        assert_eq!(def.cooldown, 10);
        assert!(def.required_permissions.contains(&Permission::BanMembers));
        assert!(!def.owner_only);
    }
}
