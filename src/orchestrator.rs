//! Orchestrator: drives the per-conversation state machine, coordinates
//! every other component, and owns cancellation and the daily
//! destination-group quota.
//!
//! The rate limiter is acquired once per conversation rather than before
//! every individual client call — threading it through the migration
//! engine's and enumerator's pure, independently-tested call sequences
//! would have meant rewriting both around a shared mutable limiter. The
//! conversation-granularity acquire still drives the adaptive slowdown and
//! speedup the floodwait controller exists for; see `DESIGN.md` for the
//! tradeoff.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::client::{ChatPlatformClient, ConversationId};
use crate::config::Config;
use crate::destination;
use crate::enumerator::{self, ConversationFilter};
use crate::error::{ErrorRecord, GroupError, ProgressError};
use crate::masking;
use crate::migration::{self, ConversationResult, MigrationConfig, ProgressEvent};
use crate::model::{ConversationDescriptor, Phase};
use crate::progress_store;
use crate::ratelimit::{RateLimiter, RateLimiterConfig};
use crate::realtime::{ProcessOutcome, RealtimeService, DEFAULT_MAX_QUEUE_SIZE};
use crate::report::{Report, ReportAggregator};

pub struct Orchestrator {
    client: Arc<dyn ChatPlatformClient>,
    config: Config,
    progress_path: PathBuf,
    progress: crate::model::GlobalProgress,
    rate_limiter: RateLimiter,
    realtime: RealtimeService,
    report: ReportAggregator,
    cancellation: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn ChatPlatformClient>,
        config: Config,
        progress_path: PathBuf,
        cancellation: Arc<AtomicBool>,
    ) -> Result<Self, ProgressError> {
        let source_label = masking::mask_phone(&config.phone_a);
        let target_label = masking::mask_phone(&config.target_user_b);
        let progress = progress_store::load(&progress_path, &source_label, &target_label)?;

        let rate_limiter = RateLimiter::new(RateLimiterConfig {
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            max_batch_delay: Duration::from_secs(config.flood_wait_threshold_seconds.max(1)),
            ..Default::default()
        });

        Ok(Self {
            client,
            rate_limiter,
            realtime: RealtimeService::new(DEFAULT_MAX_QUEUE_SIZE),
            report: ReportAggregator::new(),
            progress,
            progress_path,
            config,
            cancellation,
        })
    }

    /// Sets the cancellation flag the binary wires to `tokio::signal::ctrl_c()`.
    pub fn request_shutdown(&self) {
        self.cancellation.store(true, Ordering::SeqCst);
    }

    /// Safe to call from any context; triggers one final save.
    pub fn save_current_progress(&mut self) -> Result<(), ProgressError> {
        self.persist()
    }

    pub async fn run(&mut self) -> anyhow::Result<Report> {
        self.progress = progress_store::set_phase(&self.progress, Phase::FetchingDialogs);
        self.persist()?;

        let conversations = enumerator::list_all(self.client.as_ref(), 3).await?;
        let filtered = enumerator::filter(conversations, &self.filter());

        self.progress = progress_store::set_phase(&self.progress, Phase::MigratingMessages);
        self.persist()?;

        for source in &filtered {
            if self.cancellation.load(Ordering::SeqCst) {
                break;
            }
            self.migrate_one(source).await?;
        }

        self.progress = progress_store::set_phase(&self.progress, Phase::Completed);
        self.persist()?;

        Ok(self.report.generate_report(&self.progress))
    }

    fn filter(&self) -> ConversationFilter {
        let f = &self.config.filter;
        ConversationFilter {
            include_ids: f.include_ids.clone(),
            exclude_ids: f.exclude_ids.clone(),
            include_types: f.include_types.clone(),
            exclude_types: f.exclude_types.clone(),
            min_message_count: f.min_message_count,
            max_message_count: f.max_message_count,
        }
    }

    fn migration_config(&self) -> MigrationConfig {
        MigrationConfig {
            page_limit: migration::DEFAULT_PAGE_LIMIT,
            batch_size: self.config.batch_size,
            max_pagination_iterations: migration::DEFAULT_MAX_PAGINATION_ITERATIONS,
            min_date: self.config.min_date,
            max_date: self.config.max_date,
        }
    }

    fn persist(&mut self) -> Result<(), ProgressError> {
        self.progress = progress_store::save(&self.progress_path, &self.progress)?;
        Ok(())
    }

    async fn notify_operator(&self, message: &str) {
        let self_chat = self.config.phone_a.clone();
        let _ = self.client.send_message(&self_chat, message).await;
    }

    /// Steps 2-14 of the per-conversation loop.
    async fn migrate_one(&mut self, source: &ConversationDescriptor) -> anyhow::Result<()> {
        if let Some(entry) = self.progress.dialogs.get(&source.id) {
            if entry.status.is_terminal() {
                return Ok(());
            }
        } else {
            self.progress = progress_store::initialize_conversation(&self.progress, source);
            self.persist()?;
        }

        let resume = progress_store::get_resume_point(&self.progress, &source.id);
        let existing_dest_id = self.progress.dialogs[&source.id].target_group_id.clone();

        if existing_dest_id.is_none() {
            let today = Utc::now().date_naive();
            if progress_store::is_daily_limit_reached(&self.progress, today, self.config.daily_group_limit) {
                self.persist()?;
                self.notify_operator("daily destination-group creation limit reached; stopping").await;
                self.cancellation.store(true, Ordering::SeqCst);
                return Ok(());
            }
        }

        self.realtime.start_listening(self.client.as_ref(), &source.id).await;
        self.rate_limiter.acquire().await;

        let dest_id = match self.obtain_destination(source, existing_dest_id.as_ref()).await {
            Ok(id) => id,
            Err(err_record) => {
                self.progress = progress_store::mark_failed(&self.progress, &source.id, err_record);
                self.persist()?;
                self.realtime.stop_listening(&source.id);
                return Ok(());
            }
        };
        self.realtime.register_mapping(&source.id, dest_id.clone());

        if resume.is_none() {
            if let Err(err) = destination::invite_user(self.client.as_ref(), &dest_id, &self.config.target_user_b).await {
                match err {
                    GroupError::FloodWait(seconds) => {
                        self.rate_limiter.record_flood_wait(seconds);
                    }
                    other => {
                        self.progress = progress_store::mark_failed(
                            &self.progress,
                            &source.id,
                            ErrorRecord::new("INVITE_FAILED", other.to_string()),
                        );
                        self.persist()?;
                        self.realtime.stop_listening(&source.id);
                        return Ok(());
                    }
                }
            }
        }

        let migration_cfg = self.migration_config();
        let resume_from_id = resume.as_ref().map(|r| r.last_message_id);

        let mut result = self.run_migration(&source.id, &dest_id, &migration_cfg, resume_from_id).await;

        let last_batch_id = result.last_migrated_message_id.or(resume_from_id).unwrap_or(0);
        match self.realtime.process_queue(self.client.as_ref(), &source.id, last_batch_id).await {
            ProcessOutcome::Done(_) => {}
            ProcessOutcome::FloodWait { seconds, .. } => {
                self.report.record("tail_sync_forward", seconds);
                self.progress = progress_store::record_flood_wait(&self.progress, seconds, "tail_sync_forward", Some(source.id.clone()));
                self.rate_limiter.record_flood_wait(seconds);
            }
        }

        if let Some(wait_seconds) = result.flood_wait_seconds {
            let last_id = result.last_migrated_message_id.or(resume_from_id);
            self.progress = progress_store::mark_partially_migrated(&self.progress, &source.id, last_id.unwrap_or(0), Some(wait_seconds));
            self.persist()?;
            self.rate_limiter.record_flood_wait(wait_seconds);

            if wait_seconds <= self.config.flood_wait_threshold_seconds {
                tokio::time::sleep(Duration::from_secs(wait_seconds)).await;
                result = self.run_migration(&source.id, &dest_id, &migration_cfg, last_id).await;

                if let Some(retry_wait) = result.flood_wait_seconds {
                    let retry_last = result.last_migrated_message_id.or(last_id);
                    self.progress = progress_store::mark_partially_migrated(&self.progress, &source.id, retry_last.unwrap_or(0), Some(retry_wait));
                    self.notify_operator(&format!("conversation {} stalled on a repeated flood wait", source.id)).await;
                    self.persist()?;
                    self.realtime.stop_listening(&source.id);
                    self.cancellation.store(true, Ordering::SeqCst);
                    return Ok(());
                }
            } else {
                self.notify_operator(&format!("conversation {} exceeded the flood wait threshold", source.id)).await;
                self.realtime.stop_listening(&source.id);
                self.cancellation.store(true, Ordering::SeqCst);
                return Ok(());
            }
        }

        self.progress = progress_store::mark_complete(&self.progress, &source.id);
        self.realtime.stop_listening(&source.id);
        self.persist()?;
        Ok(())
    }

    /// Runs one migration pass and folds its progress events and errors
    /// into the owned progress snapshot, checkpointing after every batch.
    async fn run_migration(
        &mut self,
        conv_id: &ConversationId,
        dest_id: &ConversationId,
        cfg: &MigrationConfig,
        resume_from_id: Option<i64>,
    ) -> ConversationResult {
        let mut events = Vec::new();
        let result = migration::migrate_conversation(
            self.client.as_ref(),
            conv_id,
            dest_id,
            cfg,
            |event| events.push(event),
            resume_from_id,
        )
        .await;

        for event in events {
            match event {
                ProgressEvent::BatchCompleted { count, last_id } => {
                    self.progress = progress_store::update_message_progress(&self.progress, conv_id, last_id, count);
                    let _ = self.persist();
                }
                ProgressEvent::FloodWait { seconds } => {
                    self.report.record("forward_messages", seconds);
                    self.progress = progress_store::record_flood_wait(&self.progress, seconds, "forward_messages", Some(conv_id.clone()));
                }
            }
        }

        for err in &result.errors {
            self.progress = progress_store::add_error(&self.progress, conv_id, err.clone(), None);
        }
        self.progress.stats.failed_messages += result.failed_count;

        result
    }

    /// Step 7: resolve a stored destination for a conversation that
    /// already has one on record — which happens whenever a crash lands
    /// between destination creation and the first completed batch, not
    /// only on a full resume with a migrated message id — falling back to
    /// creation on resolution failure, or create fresh for a conversation
    /// seen for the first time.
    async fn obtain_destination(
        &mut self,
        source: &ConversationDescriptor,
        existing_dest_id: Option<&ConversationId>,
    ) -> Result<ConversationId, ErrorRecord> {
        if let Some(dest_id) = existing_dest_id {
            if let crate::client::CallOutcome::Ok(_) = self.client.resolve_entity(dest_id).await {
                return Ok(dest_id.clone());
            }
        }

        let today = Utc::now().date_naive();
        let delay = Duration::from_millis(self.config.group_creation_delay_ms);

        match destination::create_destination(self.client.as_ref(), source, &self.config.group_name_prefix, delay).await {
            Ok(dest) => self.record_new_destination(source, dest.id, today),
            Err(GroupError::FloodWait(seconds)) if seconds <= self.config.flood_wait_threshold_seconds => {
                self.rate_limiter.record_flood_wait(seconds);
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                match destination::create_destination(self.client.as_ref(), source, &self.config.group_name_prefix, delay).await {
                    Ok(dest) => self.record_new_destination(source, dest.id, today),
                    Err(err) => Err(ErrorRecord::new("GROUP_CREATE_FAILED", err.to_string())),
                }
            }
            Err(err) => Err(ErrorRecord::new("GROUP_CREATE_FAILED", err.to_string())),
        }
    }

    fn record_new_destination(
        &mut self,
        source: &ConversationDescriptor,
        dest_id: ConversationId,
        today: chrono::NaiveDate,
    ) -> Result<ConversationId, ErrorRecord> {
        self.progress = progress_store::increment_daily_groups(&self.progress, today);
        self.progress = progress_store::mark_started(&self.progress, &source.id, &dest_id);
        self.persist().map_err(|e| ErrorRecord::new("WRITE_FAILED", e.to_string()))?;
        Ok(dest_id)
    }
}
