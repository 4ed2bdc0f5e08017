//! The per-invocation context handed to middlewares and commands.
//!
//! One [`InvocationContext`] is created for every command interaction that
//! resolves to a registered command, wrapped in an `Arc`, and shared by every
//! middleware in the chain and by the command's `run`. It is dropped once the
//! pipeline completes and is never reused for another invocation.
//!
//! Besides read-only access to the interaction it carries:
//!
//! - the response helpers (`reply`, `defer`, `edit_reply`, ...), which track
//!   whether the interaction has been acknowledged;
//! - a string-keyed side channel through which a middleware can hand data to
//!   the command;
//! - the language resolved for the invoking user, used by [`t`](InvocationContext::t).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::collector::{InteractionCollector, InteractionHub, await_component};
use crate::command::{BoxedCommand, CommandDefinition};
use crate::error::ContextError;
use crate::gate::Rejection;
use crate::localization::BoxedStringTable;
use basalt_core::{
    BoxedGateway, ChannelId, CommandInteraction, ComponentInteraction, EPHEMERAL, Guild,
    InteractionContent, InteractionResponse, Member, MessageId, User,
};

/// Shared services every context can reach.
#[derive(Clone)]
pub struct ContextServices {
    pub gateway: BoxedGateway,
    pub strings: BoxedStringTable,
    pub hub: InteractionHub,
}

/// How the terminal stage of the pipeline ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settled {
    Rejected(Rejection),
    Ran,
}

/// Context for a single command invocation.
pub struct InvocationContext {
    command: BoxedCommand,
    interaction: CommandInteraction,
    services: ContextServices,
    language: Mutex<Option<String>>,
    acknowledged: AtomicBool,
    data: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
    settled: Mutex<Option<Settled>>,
}

impl InvocationContext {
    pub fn new(
        command: BoxedCommand,
        interaction: CommandInteraction,
        services: ContextServices,
    ) -> Self {
        Self {
            command,
            interaction,
            services,
            language: Mutex::new(None),
            acknowledged: AtomicBool::new(false),
            data: Mutex::new(HashMap::new()),
            settled: Mutex::new(None),
        }
    }

    // ─── Invocation ───────────────────────────────────────────────────────────

    /// The command this invocation resolved to.
    pub fn command(&self) -> &BoxedCommand {
        &self.command
    }

    pub fn definition(&self) -> &CommandDefinition {
        self.command.definition()
    }

    pub fn interaction(&self) -> &CommandInteraction {
        &self.interaction
    }

    pub fn command_name(&self) -> &str {
        &self.interaction.command_name
    }

    /// The invoking user; taken from the member when invoked in a guild.
    pub fn user(&self) -> &User {
        self.interaction
            .member
            .as_ref()
            .map(|m| &m.user)
            .unwrap_or(&self.interaction.user)
    }

    pub fn member(&self) -> Option<&Member> {
        self.interaction.member.as_ref()
    }

    pub fn guild(&self) -> Option<&Guild> {
        self.interaction.guild.as_ref()
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.interaction.channel_id
    }

    pub fn locale(&self) -> &str {
        &self.interaction.locale
    }

    /// Raw option payload.
    pub fn options(&self) -> &Value {
        &self.interaction.options
    }

    /// Looks up an option value by name.
    ///
    /// Accepts both an object keyed by option name and a list of
    /// `{ "name": ..., "value": ... }` entries.
    pub fn option(&self, name: &str) -> Option<&Value> {
        match &self.interaction.options {
            Value::Object(map) => map.get(name),
            Value::Array(list) => list
                .iter()
                .find(|o| o.get("name").and_then(Value::as_str) == Some(name))
                .and_then(|o| o.get("value")),
            _ => None,
        }
    }

    // ─── Responses ────────────────────────────────────────────────────────────

    /// `true` once `reply` or `defer` has succeeded.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::SeqCst)
    }

    fn acknowledge(&self) -> Result<(), ContextError> {
        if self.acknowledged.swap(true, Ordering::SeqCst) {
            return Err(ContextError::AlreadyAcknowledged);
        }
        Ok(())
    }

    fn require_acknowledged(&self) -> Result<(), ContextError> {
        if !self.is_acknowledged() {
            return Err(ContextError::NotAcknowledged);
        }
        Ok(())
    }

    async fn respond(&self, response: InteractionResponse) -> Result<(), ContextError> {
        self.acknowledge()?;
        let result = self
            .services
            .gateway
            .create_interaction_response(&self.interaction, response)
            .await;
        if result.is_err() {
            self.acknowledged.store(false, Ordering::SeqCst);
        }
        Ok(result?)
    }

    /// Sends the initial response.
    pub async fn reply(&self, content: impl Into<InteractionContent>) -> Result<(), ContextError> {
        self.respond(InteractionResponse::ChannelMessage(content.into()))
            .await
    }

    /// Acknowledges now; the response is filled in later with
    /// [`edit_reply`](Self::edit_reply).
    pub async fn defer(&self, ephemeral: bool) -> Result<(), ContextError> {
        let flags = if ephemeral { EPHEMERAL } else { 0 };
        self.respond(InteractionResponse::DeferredChannelMessage { flags })
            .await
    }

    pub async fn edit_reply(
        &self,
        content: impl Into<InteractionContent>,
    ) -> Result<(), ContextError> {
        self.require_acknowledged()?;
        self.services
            .gateway
            .edit_original_response(&self.interaction, content.into())
            .await?;
        Ok(())
    }

    pub async fn follow_up(
        &self,
        content: impl Into<InteractionContent>,
    ) -> Result<(), ContextError> {
        self.require_acknowledged()?;
        self.services
            .gateway
            .create_followup(&self.interaction, content.into())
            .await?;
        Ok(())
    }

    pub async fn delete_reply(&self) -> Result<(), ContextError> {
        self.require_acknowledged()?;
        self.services
            .gateway
            .delete_original_response(&self.interaction)
            .await?;
        Ok(())
    }

    // ─── Localization ─────────────────────────────────────────────────────────

    /// The language responses should use.
    pub fn language(&self) -> String {
        self.language
            .lock()
            .clone()
            .unwrap_or_else(|| self.services.strings.default_language().to_string())
    }

    pub fn set_language(&self, lang: impl Into<String>) {
        *self.language.lock() = Some(lang.into());
    }

    /// Translates `key` into the invocation language.
    pub fn t(&self, key: &str, args: &[&dyn fmt::Display]) -> String {
        self.services.strings.lookup(&self.language(), key, args)
    }

    // ─── Side channel ─────────────────────────────────────────────────────────

    /// Stores a value for later stages of this invocation, replacing any
    /// previous value under `key`.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.data.lock().insert(key.into(), Box::new(value));
    }

    /// Returns a clone of the value under `key` if it has type `T`.
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.data
            .lock()
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Removes and returns the value under `key` if it has type `T`.
    pub fn take<T: Any>(&self, key: &str) -> Option<T> {
        let mut data = self.data.lock();
        if !data.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        data.remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    // ─── Collectors ───────────────────────────────────────────────────────────

    pub fn hub(&self) -> &InteractionHub {
        &self.services.hub
    }

    /// Waits for a button press on `message_id` that passes `filter`.
    ///
    /// Returns `None` when `timeout` elapses first.
    pub async fn collect_button<F>(
        &self,
        message_id: MessageId,
        timeout: Duration,
        filter: F,
    ) -> Option<ComponentInteraction>
    where
        F: Fn(&ComponentInteraction) -> bool + Send + Sync,
    {
        await_component(&self.services.hub, message_id, filter, timeout).await
    }

    /// Starts a collector for component interactions on `message_id`.
    pub fn collector<F>(&self, message_id: MessageId, time: Duration, filter: F) -> InteractionCollector
    where
        F: Fn(&ComponentInteraction) -> bool + Send + Sync + 'static,
    {
        InteractionCollector::new(&self.services.hub, message_id, time, filter)
    }

    // ─── Dispatch bookkeeping ─────────────────────────────────────────────────

    pub(crate) fn settle(&self, settled: Settled) {
        *self.settled.lock() = Some(settled);
    }

    pub(crate) fn settled(&self) -> Option<Settled> {
        self.settled.lock().clone()
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("command", &self.command.name())
            .field("interaction", &self.interaction.id)
            .field("user", &self.user().id)
            .field("acknowledged", &self.is_acknowledged())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use serde_json::json;

    use super::*;
    use crate::command::FnCommand;
    use crate::localization::Localizer;
    use basalt_core::{
        ApiError, ApiResult, ApplicationCommand, Gateway, GuildId, InteractionId, Permissions,
        UserId,
    };

    /// Gateway double that records every call.
    #[derive(Default)]
    pub(crate) struct RecordingGateway {
        pub calls: SyncMutex<Vec<String>>,
        pub synced: SyncMutex<Vec<ApplicationCommand>>,
        pub owners: Vec<UserId>,
        pub fail_responses: bool,
    }

    impl RecordingGateway {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Gateway for RecordingGateway {
        async fn create_interaction_response(
            &self,
            _interaction: &CommandInteraction,
            response: InteractionResponse,
        ) -> ApiResult<()> {
            if self.fail_responses {
                return Err(ApiError::Timeout);
            }
            let call = match response {
                InteractionResponse::ChannelMessage(c) => {
                    format!("reply:{}", c.content.unwrap_or_default())
                }
                InteractionResponse::DeferredChannelMessage { flags } => format!("defer:{flags}"),
            };
            self.calls.lock().push(call);
            Ok(())
        }

        async fn edit_original_response(
            &self,
            _interaction: &CommandInteraction,
            content: InteractionContent,
        ) -> ApiResult<()> {
            self.calls
                .lock()
                .push(format!("edit:{}", content.content.unwrap_or_default()));
            Ok(())
        }

        async fn create_followup(
            &self,
            _interaction: &CommandInteraction,
            content: InteractionContent,
        ) -> ApiResult<()> {
            self.calls
                .lock()
                .push(format!("followup:{}", content.content.unwrap_or_default()));
            Ok(())
        }

        async fn delete_original_response(&self, _interaction: &CommandInteraction) -> ApiResult<()> {
            self.calls.lock().push("delete".to_string());
            Ok(())
        }

        async fn bulk_update_commands(&self, commands: Vec<ApplicationCommand>) -> ApiResult<()> {
            self.calls.lock().push(format!("bulk:{}", commands.len()));
            *self.synced.lock() = commands;
            Ok(())
        }

        async fn upsert_command(&self, command: ApplicationCommand) -> ApiResult<()> {
            self.calls.lock().push(format!("upsert:{}", command.name));
            Ok(())
        }

        async fn fetch_application_owners(&self) -> ApiResult<Vec<UserId>> {
            Ok(self.owners.clone())
        }
    }

    pub(crate) fn interaction(command: &str, user: u64, guild: Option<u64>) -> CommandInteraction {
        let user = User::new(user, format!("user{user}"));
        CommandInteraction {
            id: InteractionId::new(1000 + user.id.get()),
            token: "token".into(),
            command_name: command.into(),
            options: Value::Null,
            member: guild.map(|_| Member::new(user.clone(), Permissions::empty())),
            guild: guild.map(|id| Guild {
                id: GuildId::new(id),
                name: "guild".into(),
            }),
            user,
            channel_id: None,
            locale: "en-US".into(),
        }
    }

    fn context(gateway: Arc<RecordingGateway>) -> InvocationContext {
        let strings = Localizer::new("en-US");
        strings.insert_language("en-US", [("hello", "Hello, %s!")]);
        strings.insert_language("de", [("hello", "Hallo, %s!")]);
        let command: BoxedCommand = Arc::new(FnCommand::new(
            CommandDefinition::new("ping", "Pong"),
            |_ctx| async { Ok(()) },
        ));
        InvocationContext::new(
            command,
            interaction("ping", 1, None),
            ContextServices {
                gateway,
                strings: Arc::new(strings),
                hub: InteractionHub::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_acknowledged_once() {
        let gateway = Arc::new(RecordingGateway::default());
        let ctx = context(gateway.clone());

        assert!(matches!(ctx.edit_reply("x").await, Err(ContextError::NotAcknowledged)));
        ctx.reply("pong").await.unwrap();
        assert!(ctx.is_acknowledged());
        assert!(matches!(ctx.defer(false).await, Err(ContextError::AlreadyAcknowledged)));

        ctx.edit_reply("edited").await.unwrap();
        ctx.follow_up("more").await.unwrap();
        ctx.delete_reply().await.unwrap();
        assert_eq!(
            gateway.calls(),
            ["reply:pong", "edit:edited", "followup:more", "delete"]
        );
    }

    #[tokio::test]
    async fn test_failed_reply_stays_unacknowledged() {
        let gateway = Arc::new(RecordingGateway {
            fail_responses: true,
            ..Default::default()
        });
        let ctx = context(gateway);
        assert!(matches!(ctx.reply("pong").await, Err(ContextError::Api(_))));
        assert!(!ctx.is_acknowledged());
    }

    #[test]
    fn test_side_channel() {
        let ctx = context(Arc::new(RecordingGateway::default()));
        ctx.set("count", 3u32);
        assert_eq!(ctx.get::<u32>("count"), Some(3));
        assert_eq!(ctx.get::<String>("count"), None);
        assert_eq!(ctx.take::<String>("count"), None);
        assert!(ctx.contains_key("count"));
        assert_eq!(ctx.take::<u32>("count"), Some(3));
        assert!(!ctx.contains_key("count"));
    }

    #[test]
    fn test_translation_uses_language() {
        let ctx = context(Arc::new(RecordingGateway::default()));
        assert_eq!(ctx.t("hello", &[&"Ana"]), "Hello, Ana!");
        ctx.set_language("de");
        assert_eq!(ctx.t("hello", &[&"Ana"]), "Hallo, Ana!");
    }

    #[test]
    fn test_option_lookup() {
        let mut ix = interaction("ban", 1, Some(9));
        ix.options = json!([{ "name": "reason", "value": "spam" }]);
        let ctx = InvocationContext::new(
            context(Arc::new(RecordingGateway::default())).command,
            ix,
            ContextServices {
                gateway: Arc::new(RecordingGateway::default()),
                strings: Arc::new(Localizer::default()),
                hub: InteractionHub::default(),
            },
        );
        assert_eq!(ctx.option("reason"), Some(&json!("spam")));
        assert_eq!(ctx.option("missing"), None);
        assert_eq!(ctx.guild().map(|g| g.id), Some(GuildId::new(9)));
    }
}
