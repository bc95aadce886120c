use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tickets::transcript::TranscriptDocument;

/// A chat-platform user as the core sees it: an opaque id plus a display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub label: String,
}

impl UserRef {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageEmbed {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAttachment {
    pub name: String,
    pub url: String,
}

/// One message from a ticket channel's history, chronological order is the
/// collaborator's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub author: UserRef,
    pub author_is_bot: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub mentions: Vec<UserRef>,
    #[serde(default)]
    pub embeds: Vec<MessageEmbed>,
    #[serde(default)]
    pub attachments: Vec<MessageAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub guild_id: String,
    pub guild_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GrantTarget {
    Member(UserRef),
    Role { id: String },
}

/// A single permission overwrite on a ticket channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub target: GrantTarget,
    pub allow_send: bool,
    /// Whether the grantee holds an administrative role in the guild.
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionSnapshot {
    pub grants: Vec<PermissionGrant>,
}

#[derive(Debug, Clone)]
pub enum ChatError {
    NotFound(String),
    PermissionDenied(String),
    RateLimited { retry_after: Option<u64> },
    NetworkError(String),
    ApiError { code: Option<String>, message: String },
}

impl ChatError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "Not found: {what}"),
            Self::PermissionDenied(msg) => write!(f, "Permission denied: {msg}"),
            Self::RateLimited { retry_after } => {
                if let Some(secs) = retry_after {
                    write!(f, "Rate limited, retry after {secs} seconds")
                } else {
                    write!(f, "Rate limited")
                }
            }
            Self::NetworkError(msg) => write!(f, "Network error: {msg}"),
            Self::ApiError { code, message } => {
                if let Some(code) = code {
                    write!(f, "API error {code}: {message}")
                } else {
                    write!(f, "API error: {message}")
                }
            }
        }
    }
}

impl std::error::Error for ChatError {}

/// The collaborator chat layer, injected at construction. The core never
/// talks to the platform directly; everything it needs from the outside world
/// goes through this trait.
#[async_trait::async_trait]
pub trait ChatPort: Send + Sync {
    async fn rename_channel(&self, channel_id: &str, new_name: &str) -> Result<(), ChatError>;

    async fn set_send_permission(
        &self,
        channel_id: &str,
        user_id: &str,
        allowed: bool,
    ) -> Result<(), ChatError>;

    async fn send_system_message(&self, channel_id: &str, text: &str) -> Result<(), ChatError>;

    async fn deliver_archive(
        &self,
        destination_id: &str,
        document: &TranscriptDocument,
    ) -> Result<(), ChatError>;

    /// Deleting an already-deleted channel must be reported as success.
    async fn delete_channel(&self, channel_id: &str) -> Result<(), ChatError>;

    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, ChatError>;

    /// Chronological history, at most `limit` messages. Channels with more
    /// messages than the cap are truncated, not rejected.
    async fn fetch_history(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatError>;

    async fn fetch_latest_message(
        &self,
        channel_id: &str,
    ) -> Result<Option<ChatMessage>, ChatError>;

    async fn fetch_permission_snapshot(
        &self,
        channel_id: &str,
    ) -> Result<PermissionSnapshot, ChatError>;

    /// All channels whose name carries the given marker prefix.
    async fn list_marked_channels(&self, marker: &str) -> Result<Vec<ChannelInfo>, ChatError>;
}
