pub mod claim;
pub mod recovery;
pub mod scheduler;
pub mod store;
pub mod sweeper;
pub mod transcript;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};

use crate::chat::{ChatPort, PermissionSnapshot, UserRef};
use crate::config::TicketConfig;
use crate::tickets::claim::{claim_announcement, ClaimManager};
use crate::tickets::scheduler::{ExpireHandler, SoftCloseScheduler};
use crate::tickets::store::TicketStore;
use crate::tickets::types::{
    ClaimOutcome, CloseReason, Lifecycle, Ticket, TicketCategory, TicketError, TicketId,
    SOFT_CLOSE_MARKER,
};

/// Wiring layer for the ticket lifecycle engine: owns the store, the
/// scheduler, the per-ticket serialization locks and the injected chat port.
/// Inbound events from the collaborator layer arrive as method calls; every
/// outbound side effect goes through [`ChatPort`].
pub struct TicketService {
    config: TicketConfig,
    chat: Arc<dyn ChatPort>,
    store: Arc<TicketStore>,
    claims: ClaimManager,
    scheduler: Arc<SoftCloseScheduler>,
    /// Keyed locks serializing all mutations per ticket; the only guard
    /// against the timer/sweeper double-archival race.
    locks: Mutex<HashMap<TicketId, Arc<Mutex<()>>>>,
}

impl TicketService {
    /// Must be called from within a tokio runtime: the expiry dispatcher is
    /// spawned here.
    pub fn new(config: TicketConfig, chat: Arc<dyn ChatPort>) -> Arc<Self> {
        let store = Arc::new(TicketStore::new());

        // Expired ids are handed to a dispatcher over a channel so timer
        // tasks stay tiny; the dispatcher spawns one closure task per ticket
        // so archival of one never blocks another's timers or resets.
        let (expired_tx, mut expired_rx) = mpsc::unbounded_channel::<TicketId>();
        let on_expire: ExpireHandler = Arc::new(move |id| {
            let expired_tx = expired_tx.clone();
            Box::pin(async move {
                let _ = expired_tx.send(id);
            })
        });

        let scheduler = Arc::new(SoftCloseScheduler::new(
            Arc::clone(&store),
            config.soft_close,
            on_expire,
        ));

        let service = Arc::new(Self {
            claims: ClaimManager::new(Arc::clone(&store)),
            scheduler,
            store,
            chat,
            config,
            locks: Mutex::new(HashMap::new()),
        });

        let dispatcher = Arc::clone(&service);
        tokio::spawn(async move {
            while let Some(id) = expired_rx.recv().await {
                let service = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    if let Err(e) = service.close_ticket(&id, CloseReason::Inactivity).await {
                        error!("Auto-close of ticket {} failed: {}", id, e);
                    }
                });
            }
        });

        service
    }

    pub fn config(&self) -> &TicketConfig {
        &self.config
    }

    pub(crate) fn chat(&self) -> &Arc<dyn ChatPort> {
        &self.chat
    }

    /// Snapshot of a ticket's current state, if the store knows it.
    pub async fn ticket(&self, id: &TicketId) -> Option<Ticket> {
        self.store.peek(id).await
    }

    /// Called by the UI layer when it creates a ticket channel. Category is
    /// fixed here; the creator is write-once.
    pub async fn register_ticket(&self, id: &TicketId, category: TicketCategory, creator: UserRef) {
        let lock = self.ticket_lock(id).await;
        let _guard = lock.lock().await;

        self.store
            .with_ticket(id, |ticket| {
                ticket.category = category;
            })
            .await;
        self.store.set_creator(id, creator).await;
        info!("Ticket {} registered ({})", id, category);
    }

    /// Inbound message activity. Bot messages never count; a human message
    /// resets a running countdown and doubles as the creator record when
    /// registration never happened (mirrors the recovery heuristic).
    pub async fn record_activity(&self, id: &TicketId, author: UserRef, author_is_bot: bool) {
        if author_is_bot {
            return;
        }

        let lock = self.ticket_lock(id).await;
        let _guard = lock.lock().await;

        if let Some(ticket) = self.store.peek(id).await {
            if ticket.created_by.is_none() {
                self.store.set_creator(id, author).await;
            }
        }

        if self.scheduler.reset_on_activity(id).await {
            debug!("Ticket {} countdown reset by activity", id);
        }
    }

    /// Claim or re-claim a ticket. `AlreadyClaimedBySelf` surfaces unchanged
    /// as the no-op signal. On success the permission hand-over, claim
    /// announcement and rename are attempted; all are cosmetic and merely
    /// logged on failure.
    pub async fn claim(&self, id: &TicketId, admin: UserRef) -> Result<ClaimOutcome, TicketError> {
        let lock = self.ticket_lock(id).await;
        let _guard = lock.lock().await;

        let outcome = self.claims.claim(id, admin.clone()).await?;

        if let Some(previous) = &outcome.previous_claimant {
            if let Err(e) = self
                .chat
                .set_send_permission(id.as_str(), &previous.id, false)
                .await
            {
                warn!(
                    "Ticket {}: revoking send permission for {} failed: {}",
                    id, previous.label, e
                );
            }
        }
        if let Err(e) = self
            .chat
            .set_send_permission(id.as_str(), &admin.id, true)
            .await
        {
            warn!(
                "Ticket {}: granting send permission to {} failed: {}",
                id, admin.label, e
            );
        }
        if let Err(e) = self
            .chat
            .send_system_message(id.as_str(), &claim_announcement(&admin))
            .await
        {
            warn!("Ticket {}: claim announcement failed: {}", id, e);
        }
        let name = format!("claimed-{}", slug(&admin.label));
        if let Err(e) = self.chat.rename_channel(id.as_str(), &name).await {
            warn!("Ticket {}: rename to {} failed: {}", id, name, e);
        }

        info!(
            "Ticket {} claimed by {}{}",
            id,
            admin.label,
            if outcome.was_reclaim { " (re-claim)" } else { "" }
        );
        Ok(outcome)
    }

    /// Starts (or restarts) the inactivity countdown, accumulating the
    /// summary text. The channel is renamed to carry the soft-close marker so
    /// the sweeper can find it after a restart; the rename and the countdown
    /// notice are cosmetic.
    pub async fn soft_close(&self, id: &TicketId, summary: &str) {
        let lock = self.ticket_lock(id).await;
        let _guard = lock.lock().await;

        self.scheduler.start(id, summary).await;

        match self.chat.channel_info(id.as_str()).await {
            Ok(channel) if !channel.name.starts_with(SOFT_CLOSE_MARKER) => {
                let marked = format!("{}{}", SOFT_CLOSE_MARKER, channel.name);
                if let Err(e) = self.chat.rename_channel(id.as_str(), &marked).await {
                    warn!("Ticket {}: soft-close marker rename failed: {}", id, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!(
                "Ticket {}: channel lookup for marker rename failed: {}",
                id, e
            ),
        }

        let hours = self.config.soft_close.as_secs() / 3600;
        let notice = format!(
            "This ticket will be closed and archived automatically after {hours} hours of inactivity."
        );
        if let Err(e) = self.chat.send_system_message(id.as_str(), &notice).await {
            warn!("Ticket {}: soft-close notice failed: {}", id, e);
        }

        info!("Ticket {} soft-closing", id);
    }

    /// External verification event. Informational only; no lifecycle effect.
    pub async fn mark_verified(&self, id: &TicketId) {
        let lock = self.ticket_lock(id).await;
        let _guard = lock.lock().await;
        self.store
            .with_ticket(id, |ticket| {
                ticket.verified = true;
            })
            .await;
    }

    /// Explicit admin-initiated closure: archives immediately, records the
    /// closer, omits the auto-close stamp.
    pub async fn request_close(&self, id: &TicketId, closer: UserRef) -> Result<(), TicketError> {
        self.close_ticket(
            id,
            CloseReason::Manual {
                closer: Some(closer),
            },
        )
        .await
    }

    /// The single closure pipeline shared by live timers, the sweeper and
    /// explicit closes: recover state if the store lost it, render the
    /// transcript, deliver it, then (and only then) delete the channel and
    /// erase the ticket. Any failure before the archive hand-off leaves the
    /// ticket exactly as it was, eligible for retry on the next sweep.
    pub async fn close_ticket(
        &self,
        id: &TicketId,
        reason: CloseReason,
    ) -> Result<(), TicketError> {
        let lock = self.ticket_lock(id).await;
        let _guard = lock.lock().await;

        let channel = match self.chat.channel_info(id.as_str()).await {
            Ok(channel) => channel,
            Err(e) if e.is_not_found() => {
                // The other closure path already finished; make cleanup stick
                // and report success.
                self.scheduler.cancel(id).await;
                self.store.delete(id).await;
                drop(_guard);
                drop(lock);
                self.discard_lock(id).await;
                return Ok(());
            }
            Err(e) => return Err(TicketError::Chat(e)),
        };

        if !self.store.contains(id).await {
            // Restart wiped the store; rebuild what we can before archiving.
            let history = self
                .chat
                .fetch_history(id.as_str(), self.config.history_fetch_cap)
                .await
                .unwrap_or_default();
            let permissions = self
                .chat
                .fetch_permission_snapshot(id.as_str())
                .await
                .unwrap_or_else(|e| {
                    warn!("Ticket {}: permission snapshot failed: {}", id, e);
                    PermissionSnapshot::default()
                });
            let recovered = recovery::reconstruct(&channel, &history, &permissions);
            self.store.insert(recovered.into_ticket(id.clone())).await;
            info!("Ticket {} state reconstructed from channel history", id);
        }

        let ticket = self.store.get(id).await;

        // Resolve the destination before touching anything destructive; a
        // ticket is never deleted without a confirmed archive hand-off.
        let destination = self
            .config
            .archive_destination(ticket.category)
            .ok_or(TicketError::ArchiveDestinationUnresolved(ticket.category))?
            .to_string();

        let history = match self
            .chat
            .fetch_history(id.as_str(), self.config.history_fetch_cap)
            .await
        {
            Ok(history) => history,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(TicketError::Chat(e)),
        };

        let document = transcript::render(&ticket, &channel, &history, &reason);
        self.chat.deliver_archive(&destination, &document).await?;

        match self.chat.delete_channel(id.as_str()).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            // Archived but not deleted: keep the ticket so the next sweep
            // retries the whole closure.
            Err(e) => return Err(TicketError::Chat(e)),
        }

        self.scheduler.cancel(id).await;
        self.store
            .with_ticket(id, |ticket| {
                ticket.lifecycle = Lifecycle::Closed;
            })
            .await;
        self.store.delete(id).await;

        info!(
            "Ticket {} closed and archived ({} messages)",
            id, document.message_count
        );

        drop(_guard);
        drop(lock);
        self.discard_lock(id).await;
        Ok(())
    }

    async fn ticket_lock(&self, id: &TicketId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drops a closed ticket's lock entry once nobody else is waiting on it.
    async fn discard_lock(&self, id: &TicketId) {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(id);
            }
        }
    }
}

fn slug(label: &str) -> String {
    let slug: String = label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "admin".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_flattens_labels_for_channel_names() {
        assert_eq!(slug("Ben Dover"), "ben-dover");
        assert_eq!(slug("Ann"), "ann");
        assert_eq!(slug("!!!"), "admin");
    }
}
