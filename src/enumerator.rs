//! Conversation enumerator + filter.

use std::collections::HashSet;
use std::time::Duration;

use crate::client::{CallOutcome, ChatPlatformClient};
use crate::error::DialogError;
use crate::model::{ConversationDescriptor, ConversationType};

const DEFAULT_MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Lists every conversation the authenticated account can see, retrying
/// transient fetch failures up to `max_retries` times before giving up.
pub async fn list_all(
    client: &dyn ChatPlatformClient,
    max_retries: u32,
) -> Result<Vec<ConversationDescriptor>, DialogError> {
    let mut last_err = String::new();
    for attempt in 0..=max_retries {
        match client.list_conversations().await {
            CallOutcome::Ok(entities) => {
                return Ok(entities.into_iter().map(ConversationDescriptor::from).collect());
            }
            CallOutcome::FloodWait(fw) => {
                last_err = format!("flood wait {}s", fw.seconds);
            }
            CallOutcome::Err(e) => {
                last_err = e;
            }
        }
        if attempt < max_retries {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    Err(DialogError::FetchFailed(last_err))
}

#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub include_ids: Vec<String>,
    pub exclude_ids: Vec<String>,
    pub include_types: Vec<ConversationType>,
    pub exclude_types: Vec<ConversationType>,
    pub min_message_count: Option<u64>,
    pub max_message_count: Option<u64>,
}

/// Applies the filter stages in a fixed order: id whitelist, id
/// blacklist, type whitelist, type blacklist, then the
/// inclusive message-count range. The order is what makes the pipeline
/// composable regardless of which stages the caller actually populates.
pub fn filter(
    list: Vec<ConversationDescriptor>,
    f: &ConversationFilter,
) -> Vec<ConversationDescriptor> {
    let include_ids: HashSet<&str> = f.include_ids.iter().map(String::as_str).collect();
    let exclude_ids: HashSet<&str> = f.exclude_ids.iter().map(String::as_str).collect();
    let include_types: HashSet<ConversationType> = f.include_types.iter().copied().collect();
    let exclude_types: HashSet<ConversationType> = f.exclude_types.iter().copied().collect();

    list.into_iter()
        .filter(|c| include_ids.is_empty() || include_ids.contains(c.id.as_str()))
        .filter(|c| !exclude_ids.contains(c.id.as_str()))
        .filter(|c| include_types.is_empty() || include_types.contains(&c.conversation_type))
        .filter(|c| !exclude_types.contains(&c.conversation_type))
        .filter(|c| f.min_message_count.map_or(true, |min| c.approx_message_count >= min))
        .filter(|c| f.max_message_count.map_or(true, |max| c.approx_message_count <= max))
        .collect()
}
