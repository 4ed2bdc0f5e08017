//! Command and extension implementations, bound to manifests by export id.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use basalt::prelude::*;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Handles that commands need from the running bot.
pub struct Control {
    pub dispatcher: Dispatcher,
    pub localizer: Arc<Localizer>,
    pub shutdown: CancellationToken,
}

pub static CONTROL: OnceLock<Control> = OnceLock::new();

fn control() -> Result<&'static Control, BoxError> {
    CONTROL.get().ok_or_else(|| "bot is not running".into())
}

const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Commands
// =============================================================================

#[distributed_slice(COMMAND_EXPORTS)]
static PING: CommandExport = CommandExport {
    id: "ping",
    create: |definition| {
        Ok(Arc::new(FnCommand::new(definition, |ctx: Arc<InvocationContext>| async move {
            ctx.reply(ctx.t("pong", &[])).await?;
            Ok::<(), BoxError>(())
        })))
    },
};

#[distributed_slice(COMMAND_EXPORTS)]
static SHUTDOWN: CommandExport = CommandExport {
    id: "shutdown",
    create: |definition| {
        Ok(Arc::new(FnCommand::new(definition, |ctx: Arc<InvocationContext>| async move {
            let control = control()?;
            ctx.reply(InteractionContent::text(ctx.t("shutdown.bye", &[])).ephemeral())
                .await?;
            control.shutdown.cancel();
            Ok::<(), BoxError>(())
        })))
    },
};

#[distributed_slice(COMMAND_EXPORTS)]
static BOOM: CommandExport = CommandExport {
    id: "boom",
    create: |definition| {
        Ok(Arc::new(FnCommand::new(definition, |_ctx: Arc<InvocationContext>| async move {
            Err::<(), BoxError>("boom".into())
        })))
    },
};

#[distributed_slice(COMMAND_EXPORTS)]
static CONFIRM: CommandExport = CommandExport {
    id: "confirm",
    create: |definition| Ok(Arc::new(FnCommand::new(definition, confirm))),
};

/// Posts a button and waits for the invoker to press it.
async fn confirm(ctx: Arc<InvocationContext>) -> Result<(), BoxError> {
    let button = json!({
        "type": 1,
        "components": [{ "type": 2, "style": 3, "label": "Yes", "custom_id": "confirm:yes" }],
    });
    ctx.reply(InteractionContent::text(ctx.t("confirm.prompt", &[])).component(button))
        .await?;

    // The console transport addresses a response message by its interaction id.
    let message_id = MessageId::new(ctx.interaction().id.get());
    let invoker = ctx.user().id;
    let press = ctx
        .collect_button(message_id, CONFIRM_TIMEOUT, move |c| c.user.id == invoker)
        .await;

    let text = match press {
        Some(press) => ctx.t("confirm.confirmed", &[&press.user.username]),
        None => ctx.t("confirm.timeout", &[]),
    };
    ctx.edit_reply(text).await?;
    Ok(())
}

#[distributed_slice(COMMAND_EXPORTS)]
static RELOAD: CommandExport = CommandExport {
    id: "reload",
    create: |definition| Ok(Arc::new(FnCommand::new(definition, reload))),
};

/// Reloads one command and re-syncs it, or reloads the language files.
async fn reload(ctx: Arc<InvocationContext>) -> Result<(), BoxError> {
    let control = control()?;
    ctx.defer(true).await?;

    let text = match ctx.option("command").and_then(Value::as_str) {
        Some(name) => {
            control.dispatcher.commands().reload(name).await?;
            control.dispatcher.update_command(name).await?;
            ctx.t("reload.command", &[&name])
        }
        None => {
            let count = control.localizer.reload_languages()?;
            ctx.t("reload.languages", &[&count])
        }
    };
    ctx.edit_reply(text).await?;
    Ok(())
}

// =============================================================================
// Extensions
// =============================================================================

#[distributed_slice(EXTENSION_EXPORTS)]
static UPTIME: ExtensionExport = ExtensionExport {
    id: "uptime",
    create: |definition| Ok(Arc::new(Uptime::new(definition))),
};

/// Logs how long the bot has been up, once a minute.
struct Uptime {
    definition: ExtensionDefinition,
    started: Mutex<Option<Instant>>,
    ticker: Mutex<Option<CancellationToken>>,
}

impl Uptime {
    fn new(definition: ExtensionDefinition) -> Self {
        Self {
            definition,
            started: Mutex::new(None),
            ticker: Mutex::new(None),
        }
    }

    async fn elapsed(&self) -> Duration {
        let started = *self.started.lock().await;
        started.map(|s| s.elapsed()).unwrap_or_default()
    }
}

#[async_trait]
impl Extension for Uptime {
    fn definition(&self) -> &ExtensionDefinition {
        &self.definition
    }

    async fn on_load(&self) -> Result<(), BoxError> {
        let started = Instant::now();
        *self.started.lock().await = Some(started);

        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => {
                        info!(uptime_secs = started.elapsed().as_secs(), "Still up");
                    }
                }
            }
        });
        *self.ticker.lock().await = Some(token);
        Ok(())
    }

    async fn on_unload(&self) -> Result<(), BoxError> {
        if let Some(token) = self.ticker.lock().await.take() {
            token.cancel();
        }
        Ok(())
    }

    async fn on_exit(&self) -> Result<(), BoxError> {
        self.on_unload().await?;
        let uptime_secs = self.elapsed().await.as_secs();
        info!(uptime_secs, "Shutting down");
        Ok(())
    }
}
