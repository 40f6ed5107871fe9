//! Tracks local mutations so a sync cycle never commits rows fetched while a
//! mutation was being applied or written through.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct LocalWrites {
    revision: AtomicU64,
    in_flight: AtomicUsize,
    settled: Notify,
}

impl LocalWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a mutation as started. Call with the state write lock held, so a
    /// commit holding the same lock sees either no change or the new revision.
    pub fn begin(&self) -> WriteGuard<'_> {
        self.revision.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        WriteGuard { writes: self }
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no mutation is in flight and return the revision reached.
    pub async fn settled(&self) -> u64 {
        loop {
            // Created before the check so a `notify_waiters` in between is not missed.
            let notified = self.settled.notified();
            if self.in_flight() == 0 {
                return self.revision();
            }
            notified.await;
        }
    }
}

/// Held for the whole of a mutation, remote write included.
#[must_use]
pub struct WriteGuard<'a> {
    writes: &'a LocalWrites,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.writes.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.writes.settled.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn begin_bumps_revision() {
        let writes = LocalWrites::new();
        let guard = writes.begin();
        assert_eq!(writes.revision(), 1);
        assert_eq!(writes.in_flight(), 1);
        drop(guard);
        assert_eq!(writes.in_flight(), 0);
        assert_eq!(writes.revision(), 1);
    }

    #[tokio::test]
    async fn settled_waits_for_guards() {
        let writes = Arc::new(LocalWrites::new());
        let held = writes.clone();
        let task = tokio::spawn(async move {
            let _guard = held.begin();
            tokio::time::sleep(Duration::from_millis(30)).await;
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(writes.in_flight(), 1);

        assert_eq!(writes.settled().await, 1);
        assert_eq!(writes.in_flight(), 0);
        task.await.unwrap();
    }
}
