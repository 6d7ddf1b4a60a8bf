//! Realtime tail-sync: per-conversation live-message queues that close
//! the gap between batch-forward completion and the moment the live
//! listener attaches.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::RngCore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::client::{CallOutcome, ChatPlatformClient, ConversationId};

pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;
const MAX_RETRY_COUNT: u8 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub message_id: i64,
    pub captured_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub retry_count: u8,
}

impl QueuedMessage {
    pub fn new(message_id: i64, payload: serde_json::Value) -> Self {
        Self { message_id, captured_at: Utc::now(), payload, retry_count: 0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessResult {
    pub success_count: u64,
    pub failed_count: u64,
    pub skipped_count: u64,
    pub failed_ids: Vec<i64>,
}

pub enum ProcessOutcome {
    Done(ProcessResult),
    FloodWait { partial: ProcessResult, seconds: u64 },
}

/// A queue shared between the service and the background task draining a
/// client's live-message subscription into it.
#[derive(Clone)]
struct TailQueue {
    items: Arc<Mutex<VecDeque<QueuedMessage>>>,
    dropped: Arc<AtomicU64>,
}

impl TailQueue {
    fn new() -> Self {
        Self { items: Arc::new(Mutex::new(VecDeque::new())), dropped: Arc::new(AtomicU64::new(0)) }
    }

    async fn enqueue(&self, item: QueuedMessage, max_queue_size: usize) -> Option<u64> {
        let mut guard = self.items.lock().await;
        guard.push_back(item);
        if guard.len() > max_queue_size {
            guard.pop_front();
            Some(self.dropped.fetch_add(1, Ordering::SeqCst) + 1)
        } else {
            None
        }
    }
}

pub struct RealtimeService {
    max_queue_size: usize,
    queues: HashMap<ConversationId, TailQueue>,
    mappings: HashMap<ConversationId, ConversationId>,
    listener_tasks: HashMap<ConversationId, JoinHandle<()>>,
    active_listeners: usize,
}

impl RealtimeService {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            max_queue_size,
            queues: HashMap::new(),
            mappings: HashMap::new(),
            listener_tasks: HashMap::new(),
            active_listeners: 0,
        }
    }

    pub fn active_listener_count(&self) -> usize {
        self.active_listeners
    }

    /// Registers a fresh queue scoped to `conv_id`, then subscribes to the
    /// client's live-message feed and spawns a task draining it into that
    /// queue for the lifetime of the listener. If the client has no
    /// subscription support, the queue is still registered (so
    /// `process_queue` has something to drain) but nothing will ever land
    /// in it. Re-registering replaces the previous queue and task.
    pub async fn start_listening(&mut self, client: &dyn ChatPlatformClient, conv_id: &ConversationId) {
        self.stop_listening(conv_id);

        let tail_queue = TailQueue::new();
        self.queues.insert(conv_id.clone(), tail_queue.clone());
        self.active_listeners += 1;

        if let CallOutcome::Ok(mut rx) = client.subscribe_new_messages(conv_id).await {
            let max_queue_size = self.max_queue_size;
            let handle = tokio::spawn(async move {
                while let Some(raw) = rx.recv().await {
                    let payload = serde_json::to_value(&raw).unwrap_or(serde_json::Value::Null);
                    tail_queue.enqueue(QueuedMessage::new(raw.id, payload), max_queue_size).await;
                }
            });
            self.listener_tasks.insert(conv_id.clone(), handle);
        }
    }

    pub fn register_mapping(&mut self, conv_id: &ConversationId, dest_id: ConversationId) {
        self.mappings.insert(conv_id.clone(), dest_id);
    }

    /// Appends `item`; if the queue has already reached `max_queue_size`,
    /// evicts the oldest entry and returns the running dropped total for
    /// this conversation.
    pub async fn enqueue(&mut self, conv_id: &ConversationId, item: QueuedMessage) -> Option<u64> {
        let queue = self.queues.get(conv_id)?.clone();
        queue.enqueue(item, self.max_queue_size).await
    }

    /// Unregisters the handler, aborts its background drain task, and
    /// clears the queue and mapping. Safe to call on unknown ids.
    pub fn stop_listening(&mut self, conv_id: &ConversationId) {
        if let Some(handle) = self.listener_tasks.remove(conv_id) {
            handle.abort();
        }
        if self.queues.remove(conv_id).is_some() {
            self.active_listeners = self.active_listeners.saturating_sub(1);
        }
        self.mappings.remove(conv_id);
    }

    /// Drains the queue in ascending message-id order. Ids at or below
    /// `last_batch_message_id` are treated as already migrated. A
    /// floodwait observed mid-drain re-queues the remainder and yields
    /// control to the caller with the partial result.
    pub async fn process_queue(
        &mut self,
        client: &dyn ChatPlatformClient,
        conv_id: &ConversationId,
        last_batch_message_id: i64,
    ) -> ProcessOutcome {
        let Some(queue) = self.queues.get(conv_id).cloned() else {
            return ProcessOutcome::Done(ProcessResult::default());
        };
        let Some(dest) = self.mappings.get(conv_id).cloned() else {
            return ProcessOutcome::Done(ProcessResult::default());
        };

        let mut items: Vec<QueuedMessage> = {
            let mut guard = queue.items.lock().await;
            guard.drain(..).collect()
        };
        items.sort_by_key(|m| m.message_id);

        let mut result = ProcessResult::default();
        let mut rng = rand::thread_rng();
        let mut iter = items.into_iter().peekable();

        while let Some(mut item) = iter.next() {
            if item.message_id <= last_batch_message_id {
                result.skipped_count += 1;
                continue;
            }
            let nonce = rng.next_u64();
            match client.forward_messages(conv_id, &dest, &[item.message_id], &[nonce]).await {
                CallOutcome::Ok(()) => result.success_count += 1,
                CallOutcome::FloodWait(fw) => {
                    let mut remainder: VecDeque<QueuedMessage> = VecDeque::new();
                    remainder.push_back(item);
                    remainder.extend(iter);
                    let mut guard = queue.items.lock().await;
                    *guard = remainder;
                    return ProcessOutcome::FloodWait { partial: result, seconds: fw.seconds };
                }
                CallOutcome::Err(_) => {
                    item.retry_count += 1;
                    if item.retry_count >= MAX_RETRY_COUNT {
                        result.failed_count += 1;
                        result.failed_ids.push(item.message_id);
                    } else {
                        let mut guard = queue.items.lock().await;
                        guard.push_back(item);
                    }
                }
            }
        }

        ProcessOutcome::Done(result)
    }
}
