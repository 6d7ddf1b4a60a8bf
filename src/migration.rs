//! Migration engine: history pagination, batch forwarding, and resume
//! arithmetic for a single conversation.

use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::client::{CallOutcome, ChatPlatformClient, ConversationId};
use crate::error::ErrorRecord;

pub const DEFAULT_PAGE_LIMIT: u32 = 100;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_PAGINATION_ITERATIONS: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub page_limit: u32,
    pub batch_size: usize,
    pub max_pagination_iterations: u32,
    pub min_date: Option<DateTime<Utc>>,
    pub max_date: Option<DateTime<Utc>>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            max_pagination_iterations: DEFAULT_MAX_PAGINATION_ITERATIONS,
            min_date: None,
            max_date: None,
        }
    }
}

/// Emitted to the orchestrator's progress callback as forwarding advances.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    BatchCompleted { count: u64, last_id: i64 },
    FloodWait { seconds: u64 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationResult {
    pub migrated_count: u64,
    pub failed_count: u64,
    pub errors: Vec<ErrorRecord>,
    pub flood_wait_seconds: Option<u64>,
    pub last_migrated_message_id: Option<i64>,
}

/// Drives both phases for one conversation. Errors never abort the whole
/// run; they accumulate in the returned result instead.
pub async fn migrate_conversation(
    client: &dyn ChatPlatformClient,
    source: &ConversationId,
    dest: &ConversationId,
    cfg: &MigrationConfig,
    mut on_progress: impl FnMut(ProgressEvent),
    resume_from_id: Option<i64>,
) -> ConversationResult {
    let (collected, cap_hit) = match collect_history(client, source, cfg).await {
        CollectOutcome::Ids(ids, cap_hit) => (ids, cap_hit),
        CollectOutcome::FloodWait(seconds) => {
            on_progress(ProgressEvent::FloodWait { seconds });
            return ConversationResult {
                flood_wait_seconds: Some(seconds),
                ..Default::default()
            };
        }
    };

    let mut result = forward_in_order(client, source, dest, cfg, collected, resume_from_id, &mut on_progress).await;
    if cap_hit {
        result.errors.push(ErrorRecord::new(
            "DIALOG_FETCH_FAILED",
            format!("pagination stopped after {} iterations before the server signaled exhaustion", cfg.max_pagination_iterations),
        ));
    }
    result
}

enum CollectOutcome {
    Ids(Vec<(i64, DateTime<Utc>)>, bool),
    FloodWait(u64),
}

/// Phase 1. Pages newest-first, advancing the offset by the minimum id of
/// the *raw* page so service messages never stall pagination. Date-range
/// filtering is applied only to the projected buffer, never to the
/// pagination boundary itself. Returns whether the iteration cap was hit
/// before the server signaled exhaustion (`raw_len < page_limit`).
async fn collect_history(
    client: &dyn ChatPlatformClient,
    source: &ConversationId,
    cfg: &MigrationConfig,
) -> CollectOutcome {
    let mut buffer: Vec<(i64, DateTime<Utc>)> = Vec::new();
    let mut offset_id: i64 = 0;
    let mut cap_hit = true;

    for _ in 0..cfg.max_pagination_iterations {
        let page = match client.get_history(source, offset_id, cfg.page_limit).await {
            CallOutcome::Ok(page) => page,
            CallOutcome::FloodWait(fw) => return CollectOutcome::FloodWait(fw.seconds),
            CallOutcome::Err(_) => {
                cap_hit = false;
                break;
            }
        };
        if page.is_empty() {
            cap_hit = false;
            break;
        }

        let min_id = page.iter().map(|m| m.id).min().unwrap_or(offset_id);
        for msg in &page {
            if msg.is_service {
                continue;
            }
            if cfg.min_date.is_some_and(|min| msg.date < min) {
                continue;
            }
            if cfg.max_date.is_some_and(|max| msg.date > max) {
                continue;
            }
            buffer.push((msg.id, msg.date));
        }

        let raw_len = page.len() as u32;
        offset_id = min_id;
        if raw_len < cfg.page_limit {
            cap_hit = false;
            break;
        }
    }

    CollectOutcome::Ids(buffer, cap_hit)
}

/// Phase 2. Reverses to chronological order, applies the resume cutoff,
/// then forwards in fixed-size batches with one fresh nonce per message.
async fn forward_in_order(
    client: &dyn ChatPlatformClient,
    source: &ConversationId,
    dest: &ConversationId,
    cfg: &MigrationConfig,
    mut collected: Vec<(i64, DateTime<Utc>)>,
    resume_from_id: Option<i64>,
    on_progress: &mut impl FnMut(ProgressEvent),
) -> ConversationResult {
    collected.reverse();

    let ids: Vec<i64> = match resume_from_id {
        Some(cutoff) => collected.into_iter().filter(|(id, _)| *id > cutoff).map(|(id, _)| id).collect(),
        None => collected.into_iter().map(|(id, _)| id).collect(),
    };

    let mut result = ConversationResult::default();
    let mut rng = rand::thread_rng();

    for batch in ids.chunks(cfg.batch_size.max(1)) {
        let nonces: Vec<u64> = batch.iter().map(|_| rng.next_u64()).collect();
        match client.forward_messages(source, dest, batch, &nonces).await {
            CallOutcome::Ok(()) => {
                let last_id = *batch.last().expect("chunks never yield empty slices");
                result.migrated_count += batch.len() as u64;
                result.last_migrated_message_id = Some(last_id);
                on_progress(ProgressEvent::BatchCompleted { count: batch.len() as u64, last_id });
            }
            CallOutcome::FloodWait(fw) => {
                result.flood_wait_seconds = Some(fw.seconds);
                result.errors.push(ErrorRecord::new("FLOOD_WAIT", format!("flood wait {}s", fw.seconds)));
                on_progress(ProgressEvent::FloodWait { seconds: fw.seconds });
                return result;
            }
            CallOutcome::Err(message) => {
                // A partial batch rejection still counts the whole batch
                // as failed, not just the rejected subset.
                result.failed_count += batch.len() as u64;
                result.errors.push(ErrorRecord::new("FORWARD_FAILED", message));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FloodWait, RawEntity, RawMessage};
    use std::sync::Mutex;

    struct FakeClient {
        pages: Mutex<Vec<Vec<RawMessage>>>,
        forward_flood_wait_on_batch: Option<usize>,
        forward_calls: Mutex<Vec<Vec<i64>>>,
    }

    fn msg(id: i64, is_service: bool) -> RawMessage {
        RawMessage { id, date: Utc::now(), is_service }
    }

    #[async_trait::async_trait]
    impl ChatPlatformClient for FakeClient {
        async fn list_conversations(&self) -> CallOutcome<Vec<RawEntity>> {
            CallOutcome::Ok(vec![])
        }

        async fn get_history(&self, _peer: &ConversationId, _offset_id: i64, _limit: u32) -> CallOutcome<Vec<RawMessage>> {
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                CallOutcome::Ok(vec![])
            } else {
                CallOutcome::Ok(pages.remove(0))
            }
        }

        async fn forward_messages(&self, _from: &ConversationId, _to: &ConversationId, ids: &[i64], nonces: &[u64]) -> CallOutcome<()> {
            assert_eq!(ids.len(), nonces.len());
            let mut calls = self.forward_calls.lock().unwrap();
            let batch_index = calls.len();
            calls.push(ids.to_vec());
            if self.forward_flood_wait_on_batch == Some(batch_index) {
                CallOutcome::FloodWait(FloodWait { seconds: 60 })
            } else {
                CallOutcome::Ok(())
            }
        }

        async fn create_channel(&self, _title: &str, _description: &str) -> CallOutcome<RawEntity> {
            unimplemented!()
        }

        async fn invite_to_channel(&self, _channel: &ConversationId, _user: &str) -> CallOutcome<()> {
            unimplemented!()
        }

        async fn send_message(&self, _peer: &ConversationId, _text: &str) -> CallOutcome<()> {
            unimplemented!()
        }

        async fn resolve_entity(&self, _id: &ConversationId) -> CallOutcome<RawEntity> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn forwards_in_ascending_order_s1_style() {
        let client = FakeClient {
            pages: Mutex::new(vec![vec![msg(12, false), msg(11, false), msg(10, false)], vec![]]),
            forward_flood_wait_on_batch: None,
            forward_calls: Mutex::new(Vec::new()),
        };
        let cfg = MigrationConfig::default();
        let mut events = Vec::new();
        let result = migrate_conversation(
            &client,
            &"A".to_string(),
            &"dest".to_string(),
            &cfg,
            |e| events.push(e),
            None,
        )
        .await;
        assert_eq!(result.migrated_count, 3);
        assert_eq!(result.last_migrated_message_id, Some(12));
        assert_eq!(client.forward_calls.lock().unwrap()[0], vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn resume_skips_already_migrated_ids() {
        let client = FakeClient {
            pages: Mutex::new(vec![vec![msg(5, false), msg(4, false), msg(3, false)], vec![]]),
            forward_flood_wait_on_batch: None,
            forward_calls: Mutex::new(Vec::new()),
        };
        let result = migrate_conversation(
            &client,
            &"A".to_string(),
            &"dest".to_string(),
            &MigrationConfig::default(),
            |_| {},
            Some(3),
        )
        .await;
        assert_eq!(result.migrated_count, 2);
        assert_eq!(client.forward_calls.lock().unwrap()[0], vec![4, 5]);
    }

    #[tokio::test]
    async fn service_messages_excluded_but_advance_pagination() {
        let client = FakeClient {
            pages: Mutex::new(vec![vec![msg(3, true), msg(2, false), msg(1, false)], vec![]]),
            forward_flood_wait_on_batch: None,
            forward_calls: Mutex::new(Vec::new()),
        };
        let result = migrate_conversation(
            &client,
            &"A".to_string(),
            &"dest".to_string(),
            &MigrationConfig::default(),
            |_| {},
            None,
        )
        .await;
        assert_eq!(result.migrated_count, 2);
        assert_eq!(client.forward_calls.lock().unwrap()[0], vec![1, 2]);
    }

    #[tokio::test]
    async fn batch_flood_wait_stops_forwarding_and_reports_partial() {
        let ids: Vec<RawMessage> = (1..=250).rev().map(|i| msg(i, false)).collect();
        let client = FakeClient {
            pages: Mutex::new(vec![ids[0..100].to_vec(), ids[100..200].to_vec(), ids[200..250].to_vec(), vec![]]),
            forward_flood_wait_on_batch: Some(1),
            forward_calls: Mutex::new(Vec::new()),
        };
        let cfg = MigrationConfig { batch_size: 100, ..Default::default() };
        let result = migrate_conversation(&client, &"A".to_string(), &"dest".to_string(), &cfg, |_| {}, None).await;
        assert_eq!(result.migrated_count, 100);
        assert_eq!(result.last_migrated_message_id, Some(100));
        assert_eq!(result.flood_wait_seconds, Some(60));
    }

    #[tokio::test]
    async fn pagination_cap_records_dialog_fetch_failed() {
        struct EndlessClient;
        #[async_trait::async_trait]
        impl ChatPlatformClient for EndlessClient {
            async fn list_conversations(&self) -> CallOutcome<Vec<RawEntity>> {
                CallOutcome::Ok(vec![])
            }
            async fn get_history(&self, _peer: &ConversationId, offset_id: i64, limit: u32) -> CallOutcome<Vec<RawMessage>> {
                let top = if offset_id == 0 { i64::MAX / 2 } else { offset_id };
                let page = (top - limit as i64..top).map(|id| msg(id, false)).collect();
                CallOutcome::Ok(page)
            }
            async fn forward_messages(&self, _f: &ConversationId, _t: &ConversationId, ids: &[i64], _n: &[u64]) -> CallOutcome<()> {
                let _ = ids;
                CallOutcome::Ok(())
            }
            async fn create_channel(&self, _t: &str, _d: &str) -> CallOutcome<RawEntity> {
                unimplemented!()
            }
            async fn invite_to_channel(&self, _c: &ConversationId, _u: &str) -> CallOutcome<()> {
                unimplemented!()
            }
            async fn send_message(&self, _p: &ConversationId, _t: &str) -> CallOutcome<()> {
                unimplemented!()
            }
            async fn resolve_entity(&self, _i: &ConversationId) -> CallOutcome<RawEntity> {
                unimplemented!()
            }
        }

        let cfg = MigrationConfig { page_limit: 10, batch_size: 1000, max_pagination_iterations: 3, ..Default::default() };
        let result = migrate_conversation(&EndlessClient, &"A".to_string(), &"dest".to_string(), &cfg, |_| {}, None).await;

        assert_eq!(result.migrated_count, 30);
        assert!(result.errors.iter().any(|e| e.kind == "DIALOG_FETCH_FAILED"));
    }

    #[tokio::test]
    async fn non_flood_wait_batch_failure_continues_to_next_batch() {
        struct FlakyClient {
            calls: Mutex<usize>,
        }
        #[async_trait::async_trait]
        impl ChatPlatformClient for FlakyClient {
            async fn list_conversations(&self) -> CallOutcome<Vec<RawEntity>> {
                CallOutcome::Ok(vec![])
            }
            async fn get_history(&self, _peer: &ConversationId, _offset_id: i64, _limit: u32) -> CallOutcome<Vec<RawMessage>> {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                if *calls == 1 {
                    CallOutcome::Ok(vec![msg(2, false), msg(1, false)])
                } else {
                    CallOutcome::Ok(vec![])
                }
            }
            async fn forward_messages(&self, _f: &ConversationId, _t: &ConversationId, _i: &[i64], _n: &[u64]) -> CallOutcome<()> {
                CallOutcome::Err("server rejected batch".to_string())
            }
            async fn create_channel(&self, _t: &str, _d: &str) -> CallOutcome<RawEntity> {
                unimplemented!()
            }
            async fn invite_to_channel(&self, _c: &ConversationId, _u: &str) -> CallOutcome<()> {
                unimplemented!()
            }
            async fn send_message(&self, _p: &ConversationId, _t: &str) -> CallOutcome<()> {
                unimplemented!()
            }
            async fn resolve_entity(&self, _i: &ConversationId) -> CallOutcome<RawEntity> {
                unimplemented!()
            }
        }
        let client = FlakyClient { calls: Mutex::new(0) };
        let result = migrate_conversation(&client, &"A".to_string(), &"dest".to_string(), &MigrationConfig::default(), |_| {}, None).await;
        assert_eq!(result.failed_count, 2);
        assert_eq!(result.migrated_count, 0);
        assert_eq!(result.errors.len(), 1);
    }
}
