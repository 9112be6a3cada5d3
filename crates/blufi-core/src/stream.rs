// ── Snapshot subscriptions ──
//
// Read handles over the sorted stores and the session log. Every change
// publishes a whole new list, so a reader that falls behind only ever
// skips to the newest one.

use std::sync::Arc;

use tokio::sync::watch;

type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// Follows one snapshot list (log entries, devices, networks).
pub struct SnapshotStream<T> {
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T> SnapshotStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot<T>>) -> Self {
        Self { receiver }
    }

    pub fn latest(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Resolve with the first snapshot, current one included, that
    /// satisfies `accept`.
    pub async fn wait_for(
        &mut self,
        mut accept: impl FnMut(&[Arc<T>]) -> bool,
    ) -> Option<Snapshot<T>> {
        let snapshot = self.receiver.wait_for(|snap| accept(snap)).await.ok()?;
        Some(snapshot.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_sees_the_current_snapshot() {
        let (tx, rx) = watch::channel(Arc::new(vec![Arc::new(1)]));
        let mut stream = SnapshotStream::new(rx);

        let snap = stream.wait_for(|s| !s.is_empty()).await.unwrap();
        assert_eq!(*snap[0], 1);
        drop(tx);
    }

    #[tokio::test]
    async fn wait_for_skips_rejected_snapshots() {
        let (tx, rx) = watch::channel(Arc::new(Vec::<Arc<u8>>::new()));
        let mut stream = SnapshotStream::new(rx);

        let waiter = tokio::spawn(async move { stream.wait_for(|s| s.len() == 2).await });
        tx.send_replace(Arc::new(vec![Arc::new(1)]));
        tx.send_replace(Arc::new(vec![Arc::new(1), Arc::new(2)]));

        let snap = waiter.await.unwrap().unwrap();
        assert_eq!(snap.len(), 2);
    }

    #[tokio::test]
    async fn closed_store_ends_the_stream() {
        let (tx, rx) = watch::channel(Arc::new(Vec::<Arc<u8>>::new()));
        let mut stream = SnapshotStream::new(rx);
        drop(tx);

        assert!(stream.changed().await.is_none());
        assert!(stream.wait_for(|s| !s.is_empty()).await.is_none());
    }
}
