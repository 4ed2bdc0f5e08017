//! A gateway that talks JSON lines over stdio.

use async_trait::async_trait;
use basalt::prelude::*;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use basalt::core::InteractionSender;

/// Prints every outbound call as one JSON object per line.
pub struct ConsoleGateway {
    stdout: Mutex<tokio::io::Stdout>,
    owners: Vec<UserId>,
}

impl ConsoleGateway {
    pub fn new(owners: Vec<UserId>) -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
            owners,
        }
    }

    async fn emit(&self, line: Value) -> ApiResult<()> {
        let mut text = serde_json::to_string(&line)?;
        text.push('\n');
        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(text.as_bytes())
            .await
            .map_err(|e| ApiError::Other(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| ApiError::Other(e.to_string()))
    }
}

#[async_trait]
impl Gateway for ConsoleGateway {
    async fn create_interaction_response(
        &self,
        interaction: &CommandInteraction,
        response: InteractionResponse,
    ) -> ApiResult<()> {
        self.emit(json!({
            "op": "respond",
            "interaction": interaction.id,
            "response": response,
        }))
        .await
    }

    async fn edit_original_response(
        &self,
        interaction: &CommandInteraction,
        content: InteractionContent,
    ) -> ApiResult<()> {
        self.emit(json!({ "op": "edit", "interaction": interaction.id, "content": content }))
            .await
    }

    async fn create_followup(
        &self,
        interaction: &CommandInteraction,
        content: InteractionContent,
    ) -> ApiResult<()> {
        self.emit(json!({ "op": "followup", "interaction": interaction.id, "content": content }))
            .await
    }

    async fn delete_original_response(&self, interaction: &CommandInteraction) -> ApiResult<()> {
        self.emit(json!({ "op": "delete", "interaction": interaction.id }))
            .await
    }

    async fn bulk_update_commands(&self, commands: Vec<ApplicationCommand>) -> ApiResult<()> {
        self.emit(json!({ "op": "sync", "commands": commands })).await
    }

    async fn upsert_command(&self, command: ApplicationCommand) -> ApiResult<()> {
        self.emit(json!({ "op": "upsert", "command": command })).await
    }

    async fn fetch_application_owners(&self) -> ApiResult<Vec<UserId>> {
        Ok(self.owners.clone())
    }
}

/// Feeds interactions read from stdin, one JSON object per line, into `tx`.
///
/// Stops at end of input, when the runtime drops its receiver, or when
/// `shutdown` fires.
pub async fn read_stdin(tx: InteractionSender, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Interaction>(&line) {
            Ok(interaction) => {
                debug!(kind = interaction.kind(), "Read interaction");
                if tx.send(interaction).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Ignoring malformed interaction"),
        }
    }
}
