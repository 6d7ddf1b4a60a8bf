//! Error kinds for every component, one `thiserror` enum per concern.
//!
//! Each category maps 1:1 onto the remote platform's own error surface so
//! that callers can match on a stable local vocabulary instead of raw
//! server strings.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid login code")]
    InvalidCode,
    #[error("invalid two-factor password")]
    Invalid2fa,
    #[error("session expired")]
    SessionExpired,
    #[error("network error: {0}")]
    NetworkError(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DialogError {
    #[error("failed to fetch dialog list: {0}")]
    FetchFailed(String),
    #[error("dialog not found")]
    NotFound,
    #[error("access denied")]
    AccessDenied,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GroupError {
    #[error("failed to create destination group: {0}")]
    CreateFailed(String),
    #[error("failed to invite user: {0}")]
    InviteFailed(String),
    #[error("user is restricted from being added")]
    UserRestricted,
    #[error("user not found")]
    UserNotFound,
    #[error("flood wait: retry after {0}s")]
    FloodWait(u64),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MigrationError {
    #[error("failed to fetch source history: {0}")]
    DialogFetchFailed(String),
    #[error("failed to create destination group: {0}")]
    GroupCreateFailed(String),
    #[error("failed to invite target user: {0}")]
    InviteFailed(String),
    #[error("forward call failed: {0}")]
    ForwardFailed(String),
    #[error("flood wait: retry after {0}s")]
    FloodWait(u64),
    #[error("migration aborted")]
    Aborted,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProgressError {
    #[error("progress file not found")]
    FileNotFound,
    #[error("progress file is corrupted: {0}")]
    FileCorrupted(String),
    #[error("failed to write progress file: {0}")]
    WriteFailed(String),
    #[error("progress file has an invalid or unsupported format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RealtimeError {
    #[error("failed to start live listener: {0}")]
    ListenerInitFailed(String),
    #[error("forward call failed: {0}")]
    ForwardFailed(String),
    #[error("queue overflow, dropped {0} messages")]
    QueueOverflow(usize),
    #[error("flood wait: retry after {0}s")]
    FloodWait(u64),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing required configuration value: {0}")]
    MissingRequired(String),
    #[error("configuration value has an invalid shape: {0}")]
    InvalidShape(String),
}

/// A single error record appended to a conversation's append-only error log.
///
/// `kind` is a stable, short machine-readable tag (e.g. `"FORWARD_FAILED"`)
/// rather than a `Display` string, so that persisted progress files remain
/// diffable across runs even as error message text evolves.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub message_id: Option<i64>,
    pub kind: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            message_id: None,
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn with_message_id(mut self, id: i64) -> Self {
        self.message_id = Some(id);
        self
    }
}
