use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::tickets::types::{CloseReason, TicketError, TicketId, SOFT_CLOSE_MARKER};
use crate::tickets::TicketService;

/// Periodic, idempotent safety net: re-checks every soft-closing channel for
/// staleness independent of in-process timers. Deliberately redundant with
/// the live countdowns — it is the durability guarantee against wake-ups lost
/// to a restart. The first tick fires immediately, which doubles as the
/// startup reconciliation pass.
pub struct TicketSweeper {
    service: Arc<TicketService>,
}

impl TicketSweeper {
    pub fn new(service: Arc<TicketService>) -> Self {
        Self { service }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        let interval = self.service.config().sweep_interval;
        info!(
            "Reconciliation sweeper started (every {}s)",
            interval.as_secs()
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    error!("Reconciliation sweep failed: {}", e);
                }
            }
        })
    }

    /// One pass over all channels bearing the soft-close marker. Tickets
    /// whose most recent message (or creation, for empty channels) is older
    /// than the soft-close duration go through the shared closure pipeline;
    /// channels that vanish mid-pass were closed by the other path and are
    /// skipped.
    pub async fn sweep(&self) -> Result<(), TicketError> {
        let threshold = chrono::Duration::from_std(self.service.config().soft_close)
            .unwrap_or_else(|_| chrono::Duration::hours(24));

        let channels = self
            .service
            .chat()
            .list_marked_channels(SOFT_CLOSE_MARKER)
            .await?;

        for channel in channels {
            let id = TicketId::from(channel.id.as_str());

            let last_seen = match self.service.chat().fetch_latest_message(&channel.id).await {
                Ok(Some(message)) => message.timestamp,
                Ok(None) => channel.created_at,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!("Sweep could not inspect channel {}: {}", channel.id, e);
                    continue;
                }
            };

            if Utc::now() - last_seen < threshold {
                continue;
            }

            info!(
                "Sweep found stale ticket {} (last activity {})",
                id, last_seen
            );
            if let Err(e) = self
                .service
                .close_ticket(&id, CloseReason::Inactivity)
                .await
            {
                warn!("Sweep close of ticket {} failed: {}", id, e);
            }
        }

        Ok(())
    }
}
