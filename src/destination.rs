//! Destination group manager: creates and resolves the per-conversation
//! supergroup a migrated conversation lands in.

use std::time::Duration;

use chrono::Utc;

use crate::client::{CallOutcome, ChatPlatformClient, ConversationId};
use crate::error::GroupError;
use crate::model::{ConversationDescriptor, Destination};

const DEFAULT_FLOOD_WAIT_SECONDS: u64 = 60;

/// Creates a supergroup titled `${prefix}${source.name}` and sleeps for
/// `group_creation_delay` afterwards, which is a mandatory cooldown to
/// avoid tripping platform-side abuse heuristics, not a retry backoff.
pub async fn create_destination(
    client: &dyn ChatPlatformClient,
    source: &ConversationDescriptor,
    group_name_prefix: &str,
    group_creation_delay: Duration,
) -> Result<Destination, GroupError> {
    let title = format!("{group_name_prefix}{}", source.display_name);
    let description = format!("Mirrors the source conversation \"{}\"", source.display_name);

    match client.create_channel(&title, &description).await {
        CallOutcome::Ok(entity) => {
            let destination = Destination {
                id: entity.id,
                display_name: title,
                source_conversation_id: source.id.clone(),
                created_at: Utc::now(),
            };
            tokio::time::sleep(group_creation_delay).await;
            Ok(destination)
        }
        CallOutcome::FloodWait(fw) => Err(GroupError::FloodWait(fw.seconds)),
        CallOutcome::Err(e) => Err(GroupError::CreateFailed(e)),
    }
}

/// Resolves `identifier` (username or phone) to an entity, then invites it
/// into `dest`. Remote error classification is fixed: not-found/invalid
/// substrings map to `UserNotFound`, restricted
/// substrings map to `UserRestricted`, and anything carrying a flood tag
/// maps to `FloodWait` (defaulting to 60s if the server omitted the value).
pub async fn invite_user(
    client: &dyn ChatPlatformClient,
    dest: &ConversationId,
    identifier: &str,
) -> Result<(), GroupError> {
    match client.resolve_entity(&identifier.to_string()).await {
        CallOutcome::Ok(_) => {}
        CallOutcome::FloodWait(fw) => return Err(GroupError::FloodWait(fw.seconds)),
        CallOutcome::Err(e) => return Err(classify_invite_error(&e)),
    }

    match client.invite_to_channel(dest, identifier).await {
        CallOutcome::Ok(()) => Ok(()),
        CallOutcome::FloodWait(fw) => Err(GroupError::FloodWait(fw.seconds)),
        CallOutcome::Err(e) => Err(classify_invite_error(&e)),
    }
}

fn classify_invite_error(message: &str) -> GroupError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("usernamenotoccupied")
        || lower.contains("usernameinvalid")
        || lower.contains("not found")
        || lower.contains("invalid")
    {
        GroupError::UserNotFound
    } else if lower.contains("userrestricted") || lower.contains("restricted") {
        GroupError::UserRestricted
    } else if lower.contains("floodwait") || lower.contains("flood_wait") {
        GroupError::FloodWait(DEFAULT_FLOOD_WAIT_SECONDS)
    } else {
        GroupError::InviteFailed(message.to_string())
    }
}
