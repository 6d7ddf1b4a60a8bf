//! The durable, single-writer authority for global progress.
//!
//! Mutators are pure: each takes a `&GlobalProgress` and returns a new one,
//! so the orchestrator can keep holding a reference across the mutation and
//! the final save always sees a consistent value. Copy-then-swap — no
//! in-place mutation ever crosses an `.await` point.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ConversationId;
use crate::error::{ErrorRecord, ProgressError};
use crate::model::{
    ConversationDescriptor, ConversationProgress, ConversationStatus, FloodWaitEvent,
    GlobalProgress, Phase, Stats, SCHEMA_VERSION,
};

/// The resume point returned by `GetResumePoint` for an interrupted
/// conversation: the last forwarded id, how much was migrated so far, and
/// the destination it was migrating into.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub last_message_id: i64,
    pub migrated_count: u64,
    pub target_group_id: ConversationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    OverwriteAll,
    SkipCompleted,
    MergeProgress,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportEnvelope {
    export_version: String,
    exported_at: chrono::DateTime<Utc>,
    progress: GlobalProgress,
}

/// Loads progress from `path`. A missing file is not an error: it returns
/// a fresh, empty progress value so a first run has somewhere to start.
pub fn load(path: &Path, source_account: &str, target_account: &str) -> Result<GlobalProgress, ProgressError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(GlobalProgress::empty(source_account, target_account));
        }
        Err(e) => return Err(ProgressError::FileCorrupted(e.to_string())),
    };

    if raw.trim().is_empty() {
        return Err(ProgressError::FileCorrupted("progress file is empty".into()));
    }

    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| ProgressError::FileCorrupted(e.to_string()))?;

    validate_shape(&value)?;

    serde_json::from_value(value).map_err(|e| ProgressError::InvalidFormat(e.to_string()))
}

fn validate_shape(value: &serde_json::Value) -> Result<(), ProgressError> {
    let version = value
        .get("version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProgressError::InvalidFormat("missing version".into()))?;
    if version != SCHEMA_VERSION {
        return Err(ProgressError::InvalidFormat(format!(
            "unsupported schema version {version}"
        )));
    }
    if value.get("startedAt").is_none() && value.get("started_at").is_none() {
        return Err(ProgressError::InvalidFormat("missing startedAt".into()));
    }
    Ok(())
}

/// Atomically writes `progress` to `path`: serialize to `path.tmp`, then
/// rename over `path`. Readers never observe a partial file. `updated_at`
/// is bumped as part of the save, not by the caller.
pub fn save(path: &Path, progress: &GlobalProgress) -> Result<GlobalProgress, ProgressError> {
    let mut progress = progress.clone();
    progress.updated_at = Utc::now();

    let tmp_path = tmp_path_for(path);
    let body = serde_json::to_string_pretty(&progress)
        .map_err(|e| ProgressError::WriteFailed(e.to_string()))?;

    std::fs::write(&tmp_path, body).map_err(|e| ProgressError::WriteFailed(e.to_string()))?;

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(ProgressError::WriteFailed(e.to_string()));
    }

    Ok(progress)
}

/// Shared by the session-file writer: same "write sibling, then rename"
/// temp-path convention for every atomically-written file in the crate.
pub(crate) fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    std::path::PathBuf::from(name)
}

/// Wraps progress in an export envelope.
pub fn export(progress: &GlobalProgress) -> Result<String, ProgressError> {
    let envelope = ExportEnvelope {
        export_version: SCHEMA_VERSION.to_string(),
        exported_at: Utc::now(),
        progress: progress.clone(),
    };
    serde_json::to_string_pretty(&envelope).map_err(|e| ProgressError::WriteFailed(e.to_string()))
}

/// Accepts either the wrapped `{exportVersion, exportedAt, progress}` shape
/// or a bare `GlobalProgress`, for backward compatibility.
pub fn import(data: &str) -> Result<GlobalProgress, ProgressError> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| ProgressError::FileCorrupted(e.to_string()))?;

    if let Some(inner) = value.get("progress") {
        validate_shape(inner)?;
        return serde_json::from_value(inner.clone())
            .map_err(|e| ProgressError::InvalidFormat(e.to_string()));
    }

    validate_shape(&value)?;
    serde_json::from_value(value).map_err(|e| ProgressError::InvalidFormat(e.to_string()))
}

/// Creates a Pending entry with a full `total_count` snapshot and bumps the
/// dialog/message totals. No-op (returns a clone) if the id is already known.
pub fn initialize_conversation(
    progress: &GlobalProgress,
    info: &ConversationDescriptor,
) -> GlobalProgress {
    let mut progress = progress.clone();
    if progress.dialogs.contains_key(&info.id) {
        return progress;
    }
    let entry = ConversationProgress::pending(
        info.id.clone(),
        info.display_name.clone(),
        info.conversation_type,
        info.approx_message_count,
    );
    progress.dialogs.insert(info.id.clone(), entry);
    progress.stats.total_dialogs += 1;
    progress.stats.total_messages += info.approx_message_count;
    progress
}

pub fn mark_started(
    progress: &GlobalProgress,
    id: &str,
    dest_id: &ConversationId,
) -> GlobalProgress {
    let mut progress = progress.clone();
    if let Some(entry) = progress.dialogs.get_mut(id) {
        entry.status = ConversationStatus::InProgress;
        entry.target_group_id = Some(dest_id.clone());
        entry.started_at = Some(Utc::now());
    }
    progress
}

pub fn mark_complete(progress: &GlobalProgress, id: &str) -> GlobalProgress {
    let mut progress = progress.clone();
    if let Some(entry) = progress.dialogs.get_mut(id) {
        if entry.status != ConversationStatus::Completed {
            progress.stats.completed_dialogs += 1;
        }
        let entry = progress.dialogs.get_mut(id).unwrap();
        entry.status = ConversationStatus::Completed;
        entry.completed_at = Some(Utc::now());
    }
    progress
}

pub fn mark_failed(progress: &GlobalProgress, id: &str, err: ErrorRecord) -> GlobalProgress {
    let mut progress = progress.clone();
    if let Some(entry) = progress.dialogs.get_mut(id) {
        entry.status = ConversationStatus::Failed;
        entry.errors.push(err);
        progress.stats.failed_dialogs += 1;
    }
    progress
}

pub fn mark_skipped(progress: &GlobalProgress, id: &str, reason: ErrorRecord) -> GlobalProgress {
    let mut progress = progress.clone();
    if let Some(entry) = progress.dialogs.get_mut(id) {
        entry.status = ConversationStatus::Skipped;
        entry.errors.push(reason);
        progress.stats.skipped_dialogs += 1;
    }
    progress
}

pub fn mark_partially_migrated(
    progress: &GlobalProgress,
    id: &str,
    last_id: i64,
    wait_seconds: Option<u64>,
) -> GlobalProgress {
    let mut progress = progress.clone();
    if let Some(entry) = progress.dialogs.get_mut(id) {
        entry.status = ConversationStatus::PartiallyMigrated;
        entry.last_message_id = Some(last_id);
        let message = match wait_seconds {
            Some(s) => format!("flood wait timeout after {s}s, resume point saved"),
            None => "migration interrupted, resume point saved".to_string(),
        };
        entry.errors.push(ErrorRecord::new("FLOOD_WAIT_TIMEOUT", message));
    }
    progress
}

pub fn update_message_progress(
    progress: &GlobalProgress,
    id: &str,
    last_id: i64,
    batch_count: u64,
) -> GlobalProgress {
    let mut progress = progress.clone();
    if let Some(entry) = progress.dialogs.get_mut(id) {
        entry.last_message_id = Some(last_id);
        entry.migrated_count += batch_count;
    }
    progress.stats.migrated_messages += batch_count;
    progress
}

pub fn add_error(
    progress: &GlobalProgress,
    id: &str,
    err: ErrorRecord,
    message_id: Option<i64>,
) -> GlobalProgress {
    let mut progress = progress.clone();
    let has_message_id = message_id.is_some();
    if let Some(entry) = progress.dialogs.get_mut(id) {
        let mut err = err;
        if let Some(mid) = message_id {
            err = err.with_message_id(mid);
        }
        entry.errors.push(err);
    }
    if has_message_id {
        progress.stats.failed_messages += 1;
    }
    progress
}

pub fn get_resume_point(progress: &GlobalProgress, id: &str) -> Option<ResumePoint> {
    let entry = progress.dialogs.get(id)?;
    if !matches!(
        entry.status,
        ConversationStatus::InProgress | ConversationStatus::PartiallyMigrated
    ) {
        return None;
    }
    let last_message_id = entry.last_message_id?;
    let target_group_id = entry.target_group_id.clone()?;
    Some(ResumePoint {
        last_message_id,
        migrated_count: entry.migrated_count,
        target_group_id,
    })
}

pub fn set_phase(progress: &GlobalProgress, phase: Phase) -> GlobalProgress {
    let mut progress = progress.clone();
    progress.current_phase = phase;
    progress
}

pub fn record_flood_wait(
    progress: &GlobalProgress,
    seconds: u64,
    operation: &str,
    dialog_id: Option<ConversationId>,
) -> GlobalProgress {
    let mut progress = progress.clone();
    progress.flood_wait_events.push(FloodWaitEvent {
        timestamp: Utc::now(),
        seconds,
        operation: operation.to_string(),
        dialog_id,
    });
    progress.stats.flood_wait_count += 1;
    progress.stats.total_flood_wait_seconds += seconds;
    progress
}

/// Merges `imported` into `existing` per `strategy`, then recomputes
/// `stats` from the merged map (floodwait totals are not merged).
pub fn merge(existing: &GlobalProgress, imported: &GlobalProgress, strategy: MergeStrategy) -> GlobalProgress {
    let mut merged = existing.clone();

    match strategy {
        MergeStrategy::OverwriteAll => {
            merged.dialogs = imported.dialogs.clone();
        }
        MergeStrategy::SkipCompleted => {
            for (id, imported_entry) in &imported.dialogs {
                let keep_existing = merged
                    .dialogs
                    .get(id)
                    .map(|e| e.status == ConversationStatus::Completed)
                    .unwrap_or(false);
                if !keep_existing {
                    merged.dialogs.insert(id.clone(), imported_entry.clone());
                }
            }
        }
        MergeStrategy::MergeProgress => {
            for (id, imported_entry) in &imported.dialogs {
                match merged.dialogs.get(id) {
                    None => {
                        merged.dialogs.insert(id.clone(), imported_entry.clone());
                    }
                    Some(existing_entry) => {
                        let take_imported = match imported_entry
                            .status
                            .progress_rank()
                            .cmp(&existing_entry.status.progress_rank())
                        {
                            std::cmp::Ordering::Greater => true,
                            std::cmp::Ordering::Less => false,
                            std::cmp::Ordering::Equal => {
                                imported_entry.migrated_count > existing_entry.migrated_count
                            }
                        };
                        if take_imported {
                            merged.dialogs.insert(id.clone(), imported_entry.clone());
                        }
                    }
                }
            }
        }
    }

    merged.stats = recompute_stats(&merged);
    merged
}

fn recompute_stats(progress: &GlobalProgress) -> Stats {
    let mut stats = Stats {
        total_dialogs: progress.dialogs.len() as u64,
        total_flood_wait_seconds: progress.stats.total_flood_wait_seconds,
        flood_wait_count: progress.stats.flood_wait_count,
        ..Default::default()
    };
    for entry in progress.dialogs.values() {
        stats.total_messages += entry.total_count;
        stats.migrated_messages += entry.migrated_count;
        match entry.status {
            ConversationStatus::Completed => stats.completed_dialogs += 1,
            ConversationStatus::Failed => stats.failed_dialogs += 1,
            ConversationStatus::Skipped => stats.skipped_dialogs += 1,
            _ => {}
        }
    }
    stats
}

/// Returns the stored daily group-creation counter, or 0 if its stored
/// date differs from `today`.
pub fn daily_group_count(progress: &GlobalProgress, today: NaiveDate) -> u32 {
    if progress.daily_group_creation.date == today {
        progress.daily_group_creation.count
    } else {
        0
    }
}

pub fn increment_daily_groups(progress: &GlobalProgress, today: NaiveDate) -> GlobalProgress {
    let mut progress = progress.clone();
    if progress.daily_group_creation.date == today {
        progress.daily_group_creation.count += 1;
    } else {
        progress.daily_group_creation.date = today;
        progress.daily_group_creation.count = 1;
    }
    progress
}

pub fn is_daily_limit_reached(progress: &GlobalProgress, today: NaiveDate, limit: u32) -> bool {
    daily_group_count(progress, today) >= limit
}
