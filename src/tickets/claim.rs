use std::sync::Arc;

use chrono::Utc;

use crate::chat::UserRef;
use crate::tickets::store::TicketStore;
use crate::tickets::types::{ClaimEvent, ClaimOutcome, Lifecycle, TicketError, TicketId};

/// System message announcing a claim. The recovery scan keys off this exact
/// prefix, so the two sides must stay in lockstep.
pub(crate) const CLAIM_ANNOUNCEMENT_PREFIX: &str = "Ticket claimed by ";

pub(crate) fn claim_announcement(admin: &UserRef) -> String {
    format!("{}{}", CLAIM_ANNOUNCEMENT_PREFIX, admin.mention())
}

/// Decides claim/re-claim semantics and mutates claim ownership in the store.
/// Claim exclusivity means one admin actively drives a ticket conversation at
/// a time (enforced by permission edits in the caller), while the full
/// history preserves accountability for the archived transcript.
pub struct ClaimManager {
    store: Arc<TicketStore>,
}

impl ClaimManager {
    pub fn new(store: Arc<TicketStore>) -> Self {
        Self { store }
    }

    /// First claim appends an event and promotes `Open` to `Claimed`. A claim
    /// by the current claimant is the `AlreadyClaimedBySelf` no-op signal; the
    /// caller must not mutate state or emit a permission change. A claim by a
    /// different admin appends a new event (history keeps the old one) and
    /// returns the previous claimant so the caller can revoke their send
    /// permission before granting the new one.
    pub async fn claim(&self, id: &TicketId, admin: UserRef) -> Result<ClaimOutcome, TicketError> {
        self.store
            .with_ticket(id, |ticket| {
                if let Some(current) = ticket.current_claim() {
                    if current.admin.id == admin.id {
                        return Err(TicketError::AlreadyClaimedBySelf(id.clone()));
                    }
                }

                let previous_claimant = ticket.current_claim().map(|event| event.admin.clone());
                ticket.claim_history.push(ClaimEvent {
                    admin,
                    claimed_at: Utc::now(),
                });
                if ticket.lifecycle == Lifecycle::Open {
                    ticket.lifecycle = Lifecycle::Claimed;
                }

                Ok(ClaimOutcome {
                    was_reclaim: previous_claimant.is_some(),
                    previous_claimant,
                })
            })
            .await
    }
}
