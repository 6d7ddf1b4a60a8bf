//! Report aggregator: floodwait event log plus the structured summary
//! handed to the CLI's formatting layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{GlobalProgress, Stats};

#[derive(Debug, Clone)]
struct FloodWaitLogEntry {
    operation: String,
    seconds: u64,
    #[allow(dead_code)]
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FloodWaitSummary {
    pub total_events: u64,
    pub total_wait_time: u64,
    pub longest_wait: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailedConversation {
    pub id: String,
    pub display_name: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub elapsed_seconds: i64,
    pub flood_wait: FloodWaitSummary,
    pub stats: Stats,
    pub failed: Vec<FailedConversation>,
}

/// In-memory append-only log of floodwait observations, kept separately
/// from `progress.floodWaitEvents` so a caller can inspect this run's
/// activity without re-deriving it from the persisted event list.
#[derive(Debug, Clone, Default)]
pub struct ReportAggregator {
    log: Vec<FloodWaitLogEntry>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, operation: impl Into<String>, seconds: u64) {
        self.log.push(FloodWaitLogEntry { operation: operation.into(), seconds, timestamp: Utc::now() });
    }

    pub fn summary(&self) -> FloodWaitSummary {
        FloodWaitSummary {
            total_events: self.log.len() as u64,
            total_wait_time: self.log.iter().map(|e| e.seconds).sum(),
            longest_wait: self.log.iter().map(|e| e.seconds).max().unwrap_or(0),
        }
    }

    /// Combines this run's in-memory log with `progress.floodWaitEvents`
    /// and the current dialog map into a structured, formatting-agnostic
    /// report.
    pub fn generate_report(&self, progress: &GlobalProgress) -> Report {
        let in_memory = self.summary();
        let persisted_seconds: u64 = progress.flood_wait_events.iter().map(|e| e.seconds).sum();
        let persisted_longest = progress.flood_wait_events.iter().map(|e| e.seconds).max().unwrap_or(0);

        let flood_wait = FloodWaitSummary {
            total_events: in_memory.total_events + progress.flood_wait_events.len() as u64,
            total_wait_time: in_memory.total_wait_time + persisted_seconds,
            longest_wait: in_memory.longest_wait.max(persisted_longest),
        };

        let elapsed_seconds = (progress.updated_at - progress.started_at).num_seconds();

        let mut failed: Vec<FailedConversation> = progress
            .dialogs
            .values()
            .filter(|d| d.status == crate::model::ConversationStatus::Failed)
            .map(|d| FailedConversation {
                id: d.source_id.clone(),
                display_name: d.display_name.clone(),
                last_error: d.errors.last().map(|e| e.message.clone()),
            })
            .collect();
        failed.sort_by(|a, b| a.id.cmp(&b.id));

        Report { elapsed_seconds, flood_wait, stats: progress.stats, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConversationType;

    #[test]
    fn summary_tracks_count_total_and_longest() {
        let mut agg = ReportAggregator::new();
        agg.record("forward", 10);
        agg.record("forward", 60);
        let summary = agg.summary();
        assert_eq!(summary.total_events, 2);
        assert_eq!(summary.total_wait_time, 70);
        assert_eq!(summary.longest_wait, 60);
    }

    #[test]
    fn generate_report_lists_failed_conversations() {
        let progress = crate::model::GlobalProgress::empty("a", "b");
        let progress = crate::progress_store::initialize_conversation(
            &progress,
            &crate::model::ConversationDescriptor {
                id: "1".into(),
                display_name: "conv-1".into(),
                conversation_type: ConversationType::Private,
                approx_message_count: 5,
                archived: false,
                raw: crate::client::RawEntity {
                    id: "1".into(),
                    display_name: "conv-1".into(),
                    is_user: true,
                    is_bot: false,
                    is_chat: false,
                    is_megagroup: false,
                    is_channel: false,
                    archived: false,
                    approx_message_count: 5,
                },
            },
        );
        let progress = crate::progress_store::mark_failed(
            &progress,
            "1",
            crate::error::ErrorRecord::new("FORWARD_FAILED", "boom"),
        );
        let agg = ReportAggregator::new();
        let report = agg.generate_report(&progress);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].last_error.as_deref(), Some("boom"));
    }
}
