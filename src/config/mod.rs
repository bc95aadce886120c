use std::collections::HashMap;
use std::time::Duration;

use crate::tickets::types::TicketCategory;

const DEFAULT_SOFT_CLOSE_HOURS: u64 = 24;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;
const DEFAULT_HISTORY_FETCH_CAP: usize = 2000;

/// Engine configuration. Everything has a default; embedders can load
/// overrides from the environment with [`TicketConfig::from_env`].
#[derive(Debug, Clone)]
pub struct TicketConfig {
    /// Inactivity span after which a soft-closing ticket is archived.
    pub soft_close: Duration,
    /// Reconciliation sweep cadence. Tunable, not a contract.
    pub sweep_interval: Duration,
    /// Upper bound on fetched history; longer channels are truncated
    /// (documented best-effort, not an error).
    pub history_fetch_cap: usize,
    /// Archive channel per ticket category. A category without an entry
    /// cannot be closed (closure aborts and retries on the next sweep).
    pub archive_destinations: HashMap<TicketCategory, String>,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            soft_close: Duration::from_secs(DEFAULT_SOFT_CLOSE_HOURS * 3600),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            history_fetch_cap: DEFAULT_HISTORY_FETCH_CAP,
            archive_destinations: HashMap::new(),
        }
    }
}

impl TicketConfig {
    pub fn from_env() -> Self {
        let get_u64 = |key: &str, default: u64| -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let get_usize = |key: &str, default: usize| -> usize {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        let mut archive_destinations = HashMap::new();
        for (category, key) in [
            (TicketCategory::Join, "TICKET_ARCHIVE_JOIN"),
            (TicketCategory::General, "TICKET_ARCHIVE_GENERAL"),
            (TicketCategory::Shop, "TICKET_ARCHIVE_SHOP"),
        ] {
            if let Ok(channel_id) = std::env::var(key) {
                if !channel_id.is_empty() {
                    archive_destinations.insert(category, channel_id);
                }
            }
        }

        Self {
            soft_close: Duration::from_secs(
                get_u64("TICKET_SOFT_CLOSE_HOURS", DEFAULT_SOFT_CLOSE_HOURS) * 3600,
            ),
            sweep_interval: Duration::from_secs(get_u64(
                "TICKET_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )),
            history_fetch_cap: get_usize("TICKET_HISTORY_FETCH_CAP", DEFAULT_HISTORY_FETCH_CAP),
            archive_destinations,
        }
    }

    pub fn archive_destination(&self, category: TicketCategory) -> Option<&str> {
        self.archive_destinations
            .get(&category)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = TicketConfig::default();
        assert_eq!(config.soft_close, Duration::from_secs(24 * 3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(600));
        assert_eq!(config.history_fetch_cap, 2000);
        assert!(config.archive_destinations.is_empty());
    }

    #[test]
    fn destination_lookup_per_category() {
        let mut config = TicketConfig::default();
        config
            .archive_destinations
            .insert(TicketCategory::Join, "archive-join".to_string());

        assert_eq!(
            config.archive_destination(TicketCategory::Join),
            Some("archive-join")
        );
        assert_eq!(config.archive_destination(TicketCategory::Shop), None);
    }
}
