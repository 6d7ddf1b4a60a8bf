use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{ConversationId, RawEntity};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    Private,
    Group,
    Supergroup,
    Channel,
    Bot,
}

/// Immutable once observed during a run — classification and message
/// counts are snapshotted at enumeration time, not re-fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDescriptor {
    pub id: ConversationId,
    pub display_name: String,
    pub conversation_type: ConversationType,
    pub approx_message_count: u64,
    pub archived: bool,
    pub raw: RawEntity,
}

impl From<RawEntity> for ConversationDescriptor {
    fn from(raw: RawEntity) -> Self {
        Self {
            id: raw.id.clone(),
            display_name: raw.display_name.clone(),
            conversation_type: raw.classify(),
            approx_message_count: raw.approx_message_count,
            archived: raw.archived,
            raw,
        }
    }
}

/// Created once per source conversation; thereafter referenced by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: ConversationId,
    pub display_name: String,
    pub source_conversation_id: ConversationId,
    pub created_at: DateTime<Utc>,
}
