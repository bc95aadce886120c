use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::debug;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::tickets::store::TicketStore;
use crate::tickets::types::{Lifecycle, TicketId};

/// Expiry callback, injected once at construction.
pub type ExpireHandler = Arc<
    dyn Fn(TicketId) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        + Send
        + Sync,
>;

struct TimerEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

/// One cancellable countdown per ticket. Arming always aborts the prior
/// handle under the timer-map lock and bumps a generation; a firing task
/// re-checks its generation under the same lock and removes its own entry
/// before dispatching. At most one of {fire, re-arm} can win, so the expiry
/// callback runs exactly once per uninterrupted countdown.
pub struct SoftCloseScheduler {
    store: Arc<TicketStore>,
    duration: Duration,
    timers: Arc<RwLock<HashMap<TicketId, TimerEntry>>>,
    next_generation: AtomicU64,
    on_expire: ExpireHandler,
}

impl SoftCloseScheduler {
    pub fn new(store: Arc<TicketStore>, duration: Duration, on_expire: ExpireHandler) -> Self {
        Self {
            store,
            duration,
            timers: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            on_expire,
        }
    }

    /// Moves the ticket into `SoftClosing`, appends the summary text
    /// (delimited, never replaced) and arms a fresh countdown, cancelling any
    /// prior one.
    pub async fn start(&self, id: &TicketId, summary_append: &str) {
        self.store
            .with_ticket(id, |ticket| {
                ticket.lifecycle = Lifecycle::SoftClosing;
                ticket.append_summary(summary_append);
                ticket.soft_close_started_at = Some(Utc::now());
            })
            .await;
        self.arm(id).await;
        debug!("Ticket {} soft-close countdown armed", id);
    }

    /// Re-arms the countdown if the ticket is counting down; returns `false`
    /// without touching anything otherwise.
    pub async fn reset_on_activity(&self, id: &TicketId) -> bool {
        let counting = self
            .store
            .peek(id)
            .await
            .map(|ticket| ticket.lifecycle == Lifecycle::SoftClosing)
            .unwrap_or(false);
        if !counting {
            return false;
        }

        self.store
            .with_ticket(id, |ticket| {
                ticket.soft_close_started_at = Some(Utc::now());
            })
            .await;
        self.arm(id).await;
        debug!("Ticket {} soft-close countdown reset", id);
        true
    }

    /// Cancels the timer if present. Lifecycle is untouched; this is only for
    /// full cleanup after closure.
    pub async fn cancel(&self, id: &TicketId) {
        let mut timers = self.timers.write().await;
        if let Some(entry) = timers.remove(id) {
            entry.handle.abort();
        }
    }

    pub async fn has_timer(&self, id: &TicketId) -> bool {
        self.timers.read().await.contains_key(id)
    }

    async fn arm(&self, id: &TicketId) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let on_expire = Arc::clone(&self.on_expire);
        let ticket_id = id.clone();
        let duration = self.duration;

        // Hold the map lock across abort + spawn + insert so the new task
        // cannot observe the map before its own entry is registered.
        let mut map = self.timers.write().await;
        if let Some(previous) = map.remove(id) {
            previous.handle.abort();
        }

        // Deadline is fixed at arm time, not at the task's first poll.
        let countdown = tokio::time::sleep(duration);
        let handle = tokio::spawn(async move {
            countdown.await;

            let fire = {
                let mut map = timers.write().await;
                match map.get(&ticket_id) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(&ticket_id);
                        true
                    }
                    // Superseded by a later start/reset, or cancelled.
                    _ => false,
                }
            };

            if fire {
                on_expire(ticket_id).await;
            }
        });

        map.insert(id.clone(), TimerEntry { generation, handle });
    }
}
