//! In-memory table of outstanding marketplace tickets.
//!
//! Holds only `Open` tickets: a ticket is inserted on successful submission
//! and leaves the table exactly once, either resolved or abandoned. Nothing is
//! persisted; the audit pass rediscovers drift lost across a restart.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::{Ticket, TicketEvent};

#[derive(Clone, Debug, Default)]
pub struct TicketRegistry {
    open: BTreeMap<String, Ticket>,
}

impl TicketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly submitted ticket. Returns the ticket previously stored
    /// under the same ID, if the marketplace ever reuses one.
    pub fn register(&mut self, ticket: Ticket) -> Option<Ticket> {
        self.open.insert(ticket.id.clone(), ticket)
    }

    /// Mark a ticket finished and drop it from the table.
    pub fn resolve(&mut self, id: &str) -> Option<Ticket> {
        let mut t = self.open.remove(id)?;
        // Only Open tickets are stored, so the transition is always legal.
        let _ = t.apply(TicketEvent::Finished);
        Some(t)
    }

    /// Drop a ticket as abandoned and return the product IDs it covered.
    pub fn abandon(&mut self, id: &str) -> Vec<String> {
        match self.open.remove(id) {
            Some(mut t) => {
                // Stored tickets are Open; abandoning one cannot fail.
                let _ = t.apply(TicketEvent::DeadlineExceeded);
                t.product_ids
            }
            None => Vec::new(),
        }
    }

    /// Abandon every ticket older than `deadline`. Returned in ID order.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>, deadline: Duration) -> Vec<Ticket> {
        let expired: Vec<String> = self
            .open
            .values()
            .filter(|t| t.is_expired(now, deadline))
            .map(|t| t.id.clone())
            .collect();

        let mut out = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(mut t) = self.open.remove(&id) {
                // Same as `abandon`: the transition from Open is always legal.
                let _ = t.apply(TicketEvent::DeadlineExceeded);
                out.push(t);
            }
        }
        out
    }

    /// Count one unfinished poll. Returns the new poll count.
    pub fn record_poll(&mut self, id: &str) -> Option<u32> {
        let t = self.open.get_mut(id)?;
        t.apply(TicketEvent::Polled).ok()?;
        Some(t.poll_count)
    }

    pub fn get(&self, id: &str) -> Option<&Ticket> {
        self.open.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.open.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ticket> {
        self.open.values()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
