//! Scriptable in-memory fake of the out-of-scope wire-level client, shared
//! by the orchestrator's black-box integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use dialog_migrator::client::{CallOutcome, ChatPlatformClient, ConversationId, FloodWait, RawEntity, RawMessage};

pub struct FakeClient {
    pub conversations: Vec<RawEntity>,
    pub histories: Mutex<HashMap<ConversationId, Vec<RawMessage>>>,
    pub forward_flood_wait: Mutex<HashMap<ConversationId, VecDeque<u64>>>,
    pub forward_calls: Mutex<Vec<(ConversationId, Vec<i64>)>>,
    pub created_channels: Mutex<Vec<String>>,
    pub sent_messages: Mutex<Vec<(ConversationId, String)>>,
    next_channel_id: Mutex<u64>,
}

impl FakeClient {
    pub fn new(conversations: Vec<RawEntity>) -> Self {
        Self {
            conversations,
            histories: Mutex::new(HashMap::new()),
            forward_flood_wait: Mutex::new(HashMap::new()),
            forward_calls: Mutex::new(Vec::new()),
            created_channels: Mutex::new(Vec::new()),
            sent_messages: Mutex::new(Vec::new()),
            next_channel_id: Mutex::new(1),
        }
    }

    pub fn with_history(self, conv_id: &str, ids: impl IntoIterator<Item = i64>) -> Self {
        let history = ids
            .into_iter()
            .map(|id| RawMessage { id, date: chrono::Utc::now(), is_service: false })
            .collect();
        self.histories.lock().unwrap().insert(conv_id.to_string(), history);
        self
    }

    /// Schedules `seconds` to be returned as FLOOD_WAIT on the nth
    /// `forward_messages` call for `conv_id` (1-indexed call count).
    pub fn flood_wait_on_forward_call(self, conv_id: &str, call_index: usize, seconds: u64) -> Self {
        let mut map = self.forward_flood_wait.lock().unwrap();
        let queue = map.entry(conv_id.to_string()).or_default();
        while queue.len() < call_index {
            queue.push_back(0);
        }
        queue[call_index - 1] = seconds;
        drop(map);
        self
    }

    pub fn forward_call_count(&self, conv_id: &str) -> usize {
        self.forward_calls.lock().unwrap().iter().filter(|(id, _)| id == conv_id).count()
    }
}

pub fn entity(id: &str, message_count: u64) -> RawEntity {
    RawEntity {
        id: id.to_string(),
        display_name: format!("conv-{id}"),
        is_user: true,
        is_bot: false,
        is_chat: false,
        is_megagroup: false,
        is_channel: false,
        archived: false,
        approx_message_count: message_count,
    }
}

#[async_trait::async_trait]
impl ChatPlatformClient for FakeClient {
    async fn list_conversations(&self) -> CallOutcome<Vec<RawEntity>> {
        CallOutcome::Ok(self.conversations.clone())
    }

    async fn get_history(&self, peer: &ConversationId, offset_id: i64, limit: u32) -> CallOutcome<Vec<RawMessage>> {
        let histories = self.histories.lock().unwrap();
        let all = histories.get(peer).cloned().unwrap_or_default();
        let mut page: Vec<RawMessage> = all.into_iter().filter(|m| offset_id == 0 || m.id < offset_id).collect();
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.truncate(limit as usize);
        CallOutcome::Ok(page)
    }

    async fn forward_messages(&self, from: &ConversationId, _to: &ConversationId, ids: &[i64], nonces: &[u64]) -> CallOutcome<()> {
        assert_eq!(ids.len(), nonces.len());
        let call_index = {
            let mut calls = self.forward_calls.lock().unwrap();
            calls.push((from.clone(), ids.to_vec()));
            calls.iter().filter(|(id, _)| id == from).count()
        };
        let seconds = self
            .forward_flood_wait
            .lock()
            .unwrap()
            .get(from)
            .and_then(|q| q.get(call_index - 1).copied())
            .unwrap_or(0);
        if seconds > 0 {
            CallOutcome::FloodWait(FloodWait { seconds })
        } else {
            CallOutcome::Ok(())
        }
    }

    async fn create_channel(&self, title: &str, _description: &str) -> CallOutcome<RawEntity> {
        let mut counter = self.next_channel_id.lock().unwrap();
        let id = format!("dest-{}", *counter);
        *counter += 1;
        self.created_channels.lock().unwrap().push(title.to_string());
        CallOutcome::Ok(entity(&id, 0))
    }

    async fn invite_to_channel(&self, _channel: &ConversationId, _user: &str) -> CallOutcome<()> {
        CallOutcome::Ok(())
    }

    async fn send_message(&self, peer: &ConversationId, text: &str) -> CallOutcome<()> {
        self.sent_messages.lock().unwrap().push((peer.clone(), text.to_string()));
        CallOutcome::Ok(())
    }

    async fn resolve_entity(&self, id: &ConversationId) -> CallOutcome<RawEntity> {
        CallOutcome::Ok(entity(id, 0))
    }
}

pub fn test_config() -> dialog_migrator::config::Config {
    dialog_migrator::config::Config {
        api_id: 123456,
        api_hash: "a".repeat(32),
        phone_a: "+15551234567".to_string(),
        target_user_b: "targetuser".to_string(),
        batch_size: 100,
        batch_delay_ms: 0,
        group_creation_delay_ms: 0,
        flood_wait_threshold_seconds: 300,
        ..Default::default()
    }
}
