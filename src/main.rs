use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use dialog_migrator::cli::{Cli, Command};
use dialog_migrator::client::{CallOutcome, ChatPlatformClient, ConversationId, RawEntity, RawMessage};
use dialog_migrator::orchestrator::Orchestrator;
use dialog_migrator::{config, masking, progress_store, session};

/// No production wire-protocol client ships with this crate — the binary
/// wires the orchestrator up against a stand-in that fails every call, so
/// `migrate` reports a clear configuration error instead of pretending to
/// talk to a server. An embedding application supplies a real
/// `ChatPlatformClient`.
struct UnimplementedClient;

#[async_trait::async_trait]
impl ChatPlatformClient for UnimplementedClient {
    async fn list_conversations(&self) -> CallOutcome<Vec<RawEntity>> {
        CallOutcome::Err("no wire-level chat platform client is configured".to_string())
    }

    async fn get_history(&self, _peer: &ConversationId, _offset_id: i64, _limit: u32) -> CallOutcome<Vec<RawMessage>> {
        CallOutcome::Err("no wire-level chat platform client is configured".to_string())
    }

    async fn forward_messages(&self, _from: &ConversationId, _to: &ConversationId, _ids: &[i64], _nonces: &[u64]) -> CallOutcome<()> {
        CallOutcome::Err("no wire-level chat platform client is configured".to_string())
    }

    async fn create_channel(&self, _title: &str, _description: &str) -> CallOutcome<RawEntity> {
        CallOutcome::Err("no wire-level chat platform client is configured".to_string())
    }

    async fn invite_to_channel(&self, _channel: &ConversationId, _user: &str) -> CallOutcome<()> {
        CallOutcome::Err("no wire-level chat platform client is configured".to_string())
    }

    async fn send_message(&self, _peer: &ConversationId, _text: &str) -> CallOutcome<()> {
        CallOutcome::Err("no wire-level chat platform client is configured".to_string())
    }

    async fn resolve_entity(&self, _id: &ConversationId) -> CallOutcome<RawEntity> {
        CallOutcome::Err("no wire-level chat platform client is configured".to_string())
    }

    async fn subscribe_new_messages(
        &self,
        _conv_id: &ConversationId,
    ) -> CallOutcome<tokio::sync::mpsc::UnboundedReceiver<RawMessage>> {
        CallOutcome::Err("no wire-level chat platform client is configured".to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("loading configuration")?;
    dialog_migrator::init_tracing(&cfg.log_level);

    session::check_permissions(&PathBuf::from(&cfg.session_path)).context("checking session file permissions")?;

    let progress_path = PathBuf::from(&cfg.progress_path);

    match cli.command {
        Command::Migrate { .. } => {
            let cancellation = Arc::new(AtomicBool::new(false));
            let client: Arc<dyn ChatPlatformClient> = Arc::new(UnimplementedClient);
            let mut orchestrator = Orchestrator::new(client, cfg, progress_path, cancellation.clone())?;

            let shutdown_flag = cancellation.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown_flag.store(true, Ordering::SeqCst);
                }
            });

            match orchestrator.run().await {
                Ok(report) => print_output(&report, cli.json)?,
                Err(e) => {
                    orchestrator.save_current_progress().ok();
                    return Err(e);
                }
            }
        }
        Command::Status => {
            let progress = progress_store::load(&progress_path, &masking::mask_phone(&cfg.phone_a), &masking::mask_phone(&cfg.target_user_b))?;
            print_output(&progress.stats, cli.json)?;
        }
        Command::List { conversation_type } => {
            let progress = progress_store::load(&progress_path, &masking::mask_phone(&cfg.phone_a), &masking::mask_phone(&cfg.target_user_b))?;
            let mut dialogs: Vec<_> = progress.dialogs.values().cloned().collect();
            if let Some(t) = conversation_type {
                dialogs.retain(|d| format!("{:?}", d.conversation_type).eq_ignore_ascii_case(&t));
            }
            print_output(&dialogs, cli.json)?;
        }
        Command::Reset { dialog, all, force } => {
            if !force {
                anyhow::bail!("reset requires --force to avoid discarding progress by accident");
            }
            let mut progress = progress_store::load(&progress_path, &masking::mask_phone(&cfg.phone_a), &masking::mask_phone(&cfg.target_user_b))?;
            if all {
                progress.dialogs.clear();
            } else {
                for id in &dialog {
                    progress.dialogs.remove(id);
                }
            }
            progress_store::save(&progress_path, &progress)?;
        }
        Command::Export { path } => {
            let progress = progress_store::load(&progress_path, &masking::mask_phone(&cfg.phone_a), &masking::mask_phone(&cfg.target_user_b))?;
            let exported = progress_store::export(&progress)?;
            std::fs::write(&path, exported).context("writing export file")?;
        }
        Command::Import { path } => {
            let data = std::fs::read_to_string(&path).context("reading import file")?;
            let imported = progress_store::import(&data)?;
            progress_store::save(&progress_path, &imported)?;
        }
    }

    Ok(())
}

fn print_output<T: serde::Serialize + std::fmt::Debug>(value: &T, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value:#?}");
    }
    Ok(())
}
