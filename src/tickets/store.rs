use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::chat::UserRef;
use crate::tickets::types::{Ticket, TicketCategory, TicketId};

/// In-memory authoritative record of ticket state, keyed by ticket id. Pure
/// data plus accessors; issues no external calls. Volatile by design: a
/// restart wipes it and the recovery path rebuilds what it can.
///
/// The inner lock only protects the map structure. Single-writer-at-a-time
/// per id is the callers' responsibility (`TicketService` holds a per-ticket
/// lock around every mutation sequence).
pub struct TicketStore {
    tickets: RwLock<HashMap<TicketId, Ticket>>,
}

impl TicketStore {
    pub fn new() -> Self {
        Self {
            tickets: RwLock::new(HashMap::new()),
        }
    }

    /// Get-or-create: absent ids yield a default `Open` record with empty
    /// fields. Never errors.
    pub async fn get(&self, id: &TicketId) -> Ticket {
        let mut tickets = self.tickets.write().await;
        tickets
            .entry(id.clone())
            .or_insert_with(|| Ticket::new(id.clone(), TicketCategory::default()))
            .clone()
    }

    /// Read without creating.
    pub async fn peek(&self, id: &TicketId) -> Option<Ticket> {
        self.tickets.read().await.get(id).cloned()
    }

    /// Get-or-create, then apply a mutating closure under the map lock.
    pub async fn with_ticket<F, R>(&self, id: &TicketId, f: F) -> R
    where
        F: FnOnce(&mut Ticket) -> R,
    {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .entry(id.clone())
            .or_insert_with(|| Ticket::new(id.clone(), TicketCategory::default()));
        f(ticket)
    }

    /// No-op if a creator is already recorded.
    pub async fn set_creator(&self, id: &TicketId, who: UserRef) {
        self.with_ticket(id, |ticket| {
            if ticket.created_by.is_none() {
                ticket.created_by = Some(who);
            }
        })
        .await;
    }

    /// Inserts a fully-formed record (recovery path). Does not overwrite an
    /// existing entry.
    pub async fn insert(&self, ticket: Ticket) {
        let mut tickets = self.tickets.write().await;
        tickets.entry(ticket.id.clone()).or_insert(ticket);
    }

    pub async fn contains(&self, id: &TicketId) -> bool {
        self.tickets.read().await.contains_key(id)
    }

    pub async fn delete(&self, id: &TicketId) {
        self.tickets.write().await.remove(id);
    }
}

impl Default for TicketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::types::Lifecycle;

    #[tokio::test]
    async fn get_creates_default_open_record() {
        let store = TicketStore::new();
        let id = TicketId::from("1001");

        let ticket = store.get(&id).await;
        assert_eq!(ticket.lifecycle, Lifecycle::Open);
        assert!(ticket.created_by.is_none());
        assert!(ticket.claim_history.is_empty());
        assert!(store.contains(&id).await);
    }

    #[tokio::test]
    async fn set_creator_is_write_once() {
        let store = TicketStore::new();
        let id = TicketId::from("1002");

        store.set_creator(&id, UserRef::new("u1", "Alice")).await;
        store.set_creator(&id, UserRef::new("u2", "Bob")).await;

        let ticket = store.peek(&id).await.unwrap();
        assert_eq!(ticket.created_by.unwrap().id, "u1");
    }

    #[tokio::test]
    async fn delete_removes_the_record() {
        let store = TicketStore::new();
        let id = TicketId::from("1003");

        store.get(&id).await;
        store.delete(&id).await;
        assert!(!store.contains(&id).await);
        assert!(store.peek(&id).await.is_none());
    }

    #[tokio::test]
    async fn insert_does_not_overwrite() {
        let store = TicketStore::new();
        let id = TicketId::from("1004");

        store
            .with_ticket(&id, |t| t.append_summary("original"))
            .await;
        store
            .insert(Ticket::new(id.clone(), TicketCategory::Shop))
            .await;

        let ticket = store.peek(&id).await.unwrap();
        assert_eq!(ticket.soft_close_summary, "original");
    }
}
