//! Console Bot
//!
//! A bot driven over stdio: interactions are read from stdin as JSON lines
//! and every gateway call is printed to stdout the same way. Logs go to
//! stderr.
//!
//! # Usage
//!
//! ```bash
//! cd demos/console_bot
//! cargo run
//! cargo run -- --profile production
//! cargo run -- --config /etc/console-bot.toml
//! cargo run -- --invite 1234
//! cargo run < session.jsonl
//! ```
//!
//! Stdin reads cannot be cancelled, so after `/shutdown` in an interactive
//! session the process exits on the next line of input. Piping a file avoids
//! this. Interactions look like:
//!
//! ```json
//! {"type":"command","id":"10","token":"t","command_name":"ping","user":{"id":"2","username":"ada"}}
//! {"type":"command","id":"11","token":"t","command_name":"confirm","user":{"id":"2","username":"ada"},"locale":"de"}
//! {"type":"component","id":"12","token":"t","custom_id":"confirm:yes","message_id":"11","user":{"id":"2","username":"ada"}}
//! {"type":"command","id":"13","token":"t","command_name":"shutdown","user":{"id":"1","username":"owner"}}
//! ```

mod commands;
mod gateway;

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use basalt::prelude::*;
use clap::Parser;

use crate::commands::{CONTROL, Control};
use crate::gateway::{ConsoleGateway, read_stdin};

#[derive(Parser)]
#[command(about = "Run a Basalt bot over stdin/stdout")]
struct Args {
    /// Configuration file; replaces the `basalt.toml` search
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`
    #[arg(short, long, conflicts_with = "config")]
    profile: Option<String>,

    /// Print the invite link for this application id and exit
    #[arg(long, value_name = "APPLICATION_ID")]
    invite: Option<ApplicationId>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Some(application) = args.invite {
        let permissions: Permissions = [Permission::SendMessages, Permission::ManageGuild]
            .into_iter()
            .collect();
        println!(
            "{}",
            invite_url(application, permissions, &["bot", "applications.commands"])
        );
        return Ok(());
    }

    let (tx, rx) = interaction_channel(64);

    let mut builder = BasaltRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder
        .gateway(ConsoleGateway::new(vec![UserId::new(1)]))
        .build()?;

    let dispatcher = runtime.dispatcher().clone();
    let shutdown = runtime.shutdown_token();
    let _ = CONTROL.set(Control {
        dispatcher: dispatcher.clone(),
        localizer: Arc::clone(runtime.localizer()),
        shutdown: shutdown.clone(),
    });

    // =========================================================================
    // Middleware
    // =========================================================================

    dispatcher.add_middleware(|ctx: Arc<InvocationContext>, next: Next| async move {
        let started = Instant::now();
        let result = next.run().await;
        debug!(
            command = %ctx.command_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Invocation finished"
        );
        result
    });

    // =========================================================================
    // Gate replies
    // =========================================================================

    let events = dispatcher.events();
    events.on_kind(EventKind::CommandCooldown, |event| {
        if let LifecycleEvent::CommandCooldown { ctx, seconds_left } = event {
            notify(ctx, "cooldown", seconds_left);
        }
    });
    events.on_kind(EventKind::OwnerOnlyCommand, |event| {
        notify(event.context(), "owner_only", &"");
    });
    events.on_kind(EventKind::GuildOnlyCommand, |event| {
        notify(event.context(), "guild_only", &"");
    });
    events.on_kind(EventKind::NoPermissions, |event| {
        if let LifecycleEvent::NoPermissions { ctx, missing } = event {
            let names: Vec<&str> = missing.iter().map(|p| p.as_str()).collect();
            notify(ctx, "missing_permissions", &names.join(", "));
        }
    });
    events.on_kind(EventKind::CommandError, |event| {
        if let LifecycleEvent::CommandError { ctx, .. } = event {
            notify(ctx, "boom", &ctx.command_name());
        }
    });

    tokio::spawn(read_stdin(tx, shutdown));

    info!("Console bot ready, reading interactions from stdin");
    runtime.run(rx).await?;
    Ok(())
}

/// Replies to the invocation with a localized ephemeral notice.
///
/// Skipped when a response was already sent.
fn notify(ctx: &Arc<InvocationContext>, key: &str, arg: &dyn fmt::Display) {
    if ctx.is_acknowledged() {
        return;
    }
    let content = InteractionContent::text(ctx.t(key, &[arg])).ephemeral();
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        if let Err(e) = ctx.reply(content).await {
            warn!(error = %e, "Failed to send notice");
        }
    });
}
