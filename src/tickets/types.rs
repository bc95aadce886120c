use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatError, UserRef};

/// Delimiter between accumulated soft-close summaries.
pub const SUMMARY_DELIMITER: &str = " | ";

/// Channel-name prefix that marks a ticket counting down to auto-close. The
/// sweeper recognizes mid-lifecycle tickets by this marker after a restart.
pub const SOFT_CLOSE_MARKER: &str = "closing-";

/// Opaque ticket identifier: the chat channel id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TicketId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TicketId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Join,
    #[default]
    General,
    Shop,
}

impl TicketCategory {
    /// Channel-name prefix the UI layer uses when it creates a ticket channel.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Join => "join-",
            Self::General => "general-",
            Self::Shop => "shop-",
        }
    }

    /// Best-effort category recovery from a channel name, tolerating the
    /// soft-close marker prefix. Renamed (claimed) channels lose the marker,
    /// in which case this returns `None`.
    pub fn from_channel_name(name: &str) -> Option<Self> {
        let base = name.strip_prefix(SOFT_CLOSE_MARKER).unwrap_or(name);
        [Self::Join, Self::General, Self::Shop]
            .into_iter()
            .find(|category| base.starts_with(category.marker()))
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Join => write!(f, "join"),
            Self::General => write!(f, "general"),
            Self::Shop => write!(f, "shop"),
        }
    }
}

impl std::str::FromStr for TicketCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "join" => Ok(Self::Join),
            "general" => Ok(Self::General),
            "shop" => Ok(Self::Shop),
            other => Err(format!("unknown ticket category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Open,
    Claimed,
    SoftClosing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEvent {
    pub admin: UserRef,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub category: TicketCategory,
    pub created_by: Option<UserRef>,
    /// Ordered, append-only. The current claimant is the last entry.
    pub claim_history: Vec<ClaimEvent>,
    pub lifecycle: Lifecycle,
    pub soft_close_summary: String,
    /// Diagnostics only; the scheduler is authoritative for firing.
    pub soft_close_started_at: Option<DateTime<Utc>>,
    pub verified: bool,
}

impl Ticket {
    pub fn new(id: TicketId, category: TicketCategory) -> Self {
        Self {
            id,
            category,
            created_by: None,
            claim_history: Vec::new(),
            lifecycle: Lifecycle::Open,
            soft_close_summary: String::new(),
            soft_close_started_at: None,
            verified: false,
        }
    }

    pub fn current_claim(&self) -> Option<&ClaimEvent> {
        self.claim_history.last()
    }

    /// Appends to the accumulated summary, never replaces. Blank text is
    /// ignored so repeated soft-closes without a note do not produce empty
    /// delimiter segments.
    pub fn append_summary(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.soft_close_summary.is_empty() {
            self.soft_close_summary.push_str(SUMMARY_DELIMITER);
        }
        self.soft_close_summary.push_str(text);
    }
}

/// Why a ticket is being closed; drives the `<Auto-Closed>` transcript block
/// and the recorded closer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Timer expiry or sweeper staleness detection.
    Inactivity,
    /// Explicit admin-initiated closure.
    Manual { closer: Option<UserRef> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub was_reclaim: bool,
    pub previous_claimant: Option<UserRef>,
}

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    /// No-op signal, not a system error: the current claimant claimed again.
    #[error("ticket {0} is already claimed by this admin")]
    AlreadyClaimedBySelf(TicketId),
    #[error("no archive destination configured for category {0}")]
    ArchiveDestinationUnresolved(TicketCategory),
    #[error("chat platform error: {0}")]
    Chat(#[from] ChatError),
}
