//! Manual sync requests waiting for the debouncer.

use std::collections::BTreeSet;
use std::sync::Mutex;

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Set of product IDs queued by the trigger endpoint.
///
/// Kept outside the engine lock so an HTTP handler never waits on a running
/// pass. Duplicate IDs coalesce.
#[derive(Debug, Default)]
pub struct TriggerInbox {
    pending: Mutex<BTreeSet<String>>,
    notify: Notify,
}

impl TriggerInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `id` and wake the debouncer. Returns false if it was already queued.
    pub fn enqueue(&self, id: impl Into<String>) -> bool {
        let inserted = self.lock().insert(id.into());
        self.notify.notify_one();
        inserted
    }

    /// Take everything queued so far, in ID order.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolves after the next `enqueue` (or immediately if one happened
    /// since the last wakeup).
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        // The set is always left consistent, so a poisoned guard is still usable.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn duplicates_coalesce_and_drain_empties() {
        let inbox = TriggerInbox::new();
        assert!(inbox.enqueue("b"));
        assert!(inbox.enqueue("a"));
        assert!(!inbox.enqueue("b"));
        assert_eq!(inbox.len(), 2);

        assert_eq!(inbox.drain(), vec!["a".to_string(), "b".to_string()]);
        assert!(inbox.is_empty());
        assert!(inbox.drain().is_empty());
    }

    #[tokio::test]
    async fn enqueue_before_wait_is_not_lost() {
        let inbox = TriggerInbox::new();
        inbox.enqueue("x");
        tokio::time::timeout(Duration::from_millis(200), inbox.notified())
            .await
            .expect("stored permit must wake the waiter");
    }
}
