//! The wire-level chat platform client.
//!
//! Session/credential management, 2FA, reconnection, and the actual wire
//! protocol are out of scope. This module only specifies the interface
//! the orchestrator depends on, so the core is testable against an
//! in-memory fake without a real network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::ConversationType;

/// Opaque conversation identifier as seen on the wire. Stable for the
/// lifetime of a run; never reused across conversations.
pub type ConversationId = String;

/// A conversation entity exactly as returned by the platform, before
/// classification. `raw` carries whatever the wire client attached and is
/// opaque to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntity {
    pub id: ConversationId,
    pub display_name: String,
    pub is_user: bool,
    pub is_bot: bool,
    pub is_chat: bool,
    pub is_megagroup: bool,
    pub is_channel: bool,
    pub archived: bool,
    pub approx_message_count: u64,
}

impl RawEntity {
    pub fn classify(&self) -> ConversationType {
        if self.is_user && self.is_bot {
            ConversationType::Bot
        } else if self.is_user {
            ConversationType::Private
        } else if self.is_chat {
            ConversationType::Group
        } else if self.is_channel && self.is_megagroup {
            ConversationType::Supergroup
        } else if self.is_channel {
            ConversationType::Channel
        } else {
            ConversationType::Private
        }
    }
}

/// A single raw message as paginated from history. `is_service` messages
/// count toward pagination progress but are excluded from the forward set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    pub date: chrono::DateTime<chrono::Utc>,
    pub is_service: bool,
}

/// A floodwait signal from the remote, as surfaced by any client call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodWait {
    pub seconds: u64,
}

/// Result of a single client call that may be rejected by a platform-side
/// floodwait. Kept distinct from `ClientError` so call sites can branch on
/// floodwait without matching an open-ended error enum.
#[derive(Debug, Clone)]
pub enum CallOutcome<T> {
    Ok(T),
    FloodWait(FloodWait),
    Err(String),
}

/// The external collaborator interface. Production code is generic over
/// this trait; a real implementation over a wire protocol is out of scope.
#[async_trait]
pub trait ChatPlatformClient: Send + Sync {
    async fn list_conversations(&self) -> CallOutcome<Vec<RawEntity>>;

    async fn get_history(
        &self,
        peer: &ConversationId,
        offset_id: i64,
        limit: u32,
    ) -> CallOutcome<Vec<RawMessage>>;

    async fn forward_messages(
        &self,
        from: &ConversationId,
        to: &ConversationId,
        ids: &[i64],
        nonces: &[u64],
    ) -> CallOutcome<()>;

    async fn create_channel(&self, title: &str, description: &str) -> CallOutcome<RawEntity>;

    async fn invite_to_channel(
        &self,
        channel: &ConversationId,
        user: &str,
    ) -> CallOutcome<()>;

    async fn send_message(&self, peer: &ConversationId, text: &str) -> CallOutcome<()>;

    async fn resolve_entity(&self, id: &ConversationId) -> CallOutcome<RawEntity>;

    /// Opens a live feed of newly arriving messages for `conv_id`, so the
    /// tail-sync queue can catch messages that land while history is still
    /// being paged. The default implementation reports no support; a real
    /// wire client overrides this to attach an update handler and forward
    /// each message over the returned channel.
    async fn subscribe_new_messages(
        &self,
        conv_id: &ConversationId,
    ) -> CallOutcome<tokio::sync::mpsc::UnboundedReceiver<RawMessage>> {
        let _ = conv_id;
        CallOutcome::Err("event subscription is not supported by this client".to_string())
    }
}
