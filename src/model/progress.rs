use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::client::ConversationId;
use crate::error::ErrorRecord;
use crate::model::ConversationType;

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Pending,
    InProgress,
    PartiallyMigrated,
    Completed,
    Failed,
    Skipped,
}

impl ConversationStatus {
    /// Completed, Failed, and Skipped are terminal; PartiallyMigrated is
    /// not, since it persists a resume point for the next run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConversationStatus::Completed | ConversationStatus::Failed | ConversationStatus::Skipped
        )
    }

    /// Relative ordering used by `Merge`'s `MergeProgress` strategy:
    /// Completed > (PartiallyMigrated | InProgress) > (Pending | Failed | Skipped).
    pub fn progress_rank(self) -> u8 {
        match self {
            ConversationStatus::Completed => 2,
            ConversationStatus::PartiallyMigrated | ConversationStatus::InProgress => 1,
            ConversationStatus::Pending | ConversationStatus::Failed | ConversationStatus::Skipped => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    FetchingDialogs,
    CreatingGroups,
    MigratingMessages,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationProgress {
    pub source_id: ConversationId,
    pub display_name: String,
    pub conversation_type: ConversationType,
    pub status: ConversationStatus,
    pub target_group_id: Option<ConversationId>,
    pub last_message_id: Option<i64>,
    pub migrated_count: u64,
    pub total_count: u64,
    pub errors: Vec<ErrorRecord>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConversationProgress {
    pub fn pending(
        source_id: ConversationId,
        display_name: String,
        conversation_type: ConversationType,
        total_count: u64,
    ) -> Self {
        Self {
            source_id,
            display_name,
            conversation_type,
            status: ConversationStatus::Pending,
            target_group_id: None,
            last_message_id: None,
            migrated_count: 0,
            total_count,
            errors: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// PartiallyMigrated conversations always have both a resume point and
    /// a known destination.
    pub fn satisfies_partial_invariant(&self) -> bool {
        if self.status != ConversationStatus::PartiallyMigrated {
            return true;
        }
        self.last_message_id.is_some() && self.target_group_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloodWaitEvent {
    pub timestamp: DateTime<Utc>,
    pub seconds: u64,
    pub operation: String,
    pub dialog_id: Option<ConversationId>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_dialogs: u64,
    pub completed_dialogs: u64,
    pub failed_dialogs: u64,
    pub skipped_dialogs: u64,
    pub total_messages: u64,
    pub migrated_messages: u64,
    pub failed_messages: u64,
    pub flood_wait_count: u64,
    pub total_flood_wait_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyGroupCreation {
    pub date: NaiveDate,
    pub count: u32,
}

impl DailyGroupCreation {
    pub fn today(today: NaiveDate) -> Self {
        Self { date: today, count: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalProgress {
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source_account: String,
    pub target_account: String,
    pub current_phase: Phase,
    pub dialogs: HashMap<ConversationId, ConversationProgress>,
    pub flood_wait_events: Vec<FloodWaitEvent>,
    pub stats: Stats,
    pub daily_group_creation: DailyGroupCreation,
}

impl GlobalProgress {
    /// An empty progress value with fresh timestamps — what `Load` returns
    /// when the progress file does not yet exist.
    pub fn empty(source_account: impl Into<String>, target_account: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: SCHEMA_VERSION.to_string(),
            started_at: now,
            updated_at: now,
            source_account: source_account.into(),
            target_account: target_account.into(),
            current_phase: Phase::Idle,
            dialogs: HashMap::new(),
            flood_wait_events: Vec::new(),
            stats: Stats::default(),
            daily_group_creation: DailyGroupCreation::today(now.date_naive()),
        }
    }

    pub fn total_dialogs_matches_map(&self) -> bool {
        self.stats.total_dialogs as usize == self.dialogs.len()
    }

    pub fn migrated_messages_matches_sum(&self) -> bool {
        let sum: u64 = self.dialogs.values().map(|d| d.migrated_count).sum();
        self.stats.migrated_messages == sum
    }
}
