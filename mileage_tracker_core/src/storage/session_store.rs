use std::sync::Arc;

use mileage_tracker_lib::snapshot::{SessionSnapshot, SessionStatus};
use tokio::sync::{mpsc, oneshot, watch};

use crate::TRIP_STATE_KEY;

use super::KeyValueStore;

enum StoreCommand {
    Flush(SessionSnapshot, u64),
    Clear,
    Settle(oneshot::Sender<()>),
}

/// Proof that a snapshot reached the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteReceipt {
    /// The generation the snapshot was flushed under.
    pub generation: u64,
    pub distance_miles: f64,
}

/**
 * SessionStore persists the in-progress trip under a single key.
 * Writes are queued to one writer task, so a flush never holds up the
 * caller and a clear always lands after the flushes queued before it.
 * Successful writes are reported through `last_written`.
 */
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    tx: mpsc::UnboundedSender<StoreCommand>,
    written: watch::Receiver<Option<WriteReceipt>>,
}

impl SessionStore {
    /// Spawns the writer, so this must be called inside a tokio runtime.
    pub fn start(store: Arc<dyn KeyValueStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (receipts, written) = watch::channel(None);
        tokio::spawn(run_writer(store.clone(), rx, receipts));
        Self { store, tx, written }
    }

    /// Reads the persisted trip. Unreadable snapshots are logged and treated as absent.
    pub async fn load(&self) -> Option<SessionSnapshot> {
        let value = match self.store.get(TRIP_STATE_KEY).await {
            Ok(value) => value?,
            Err(err) => {
                tracing::error!("Failed to read session snapshot: {err}");
                return None;
            }
        };

        match SessionSnapshot::try_from(value.as_str()) {
            Ok(snapshot) if snapshot.status == SessionStatus::Tracking => Some(snapshot),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!("Ignoring unreadable session snapshot: {err}");
                None
            }
        }
    }

    /// Queues a write of `snapshot`, replacing whatever is stored.
    /// `generation` is echoed back in the receipt once the write succeeds.
    pub fn flush(&self, snapshot: SessionSnapshot, generation: u64) {
        if self.tx.send(StoreCommand::Flush(snapshot, generation)).is_err() {
            tracing::error!("Session writer is gone, snapshot dropped");
        }
    }

    /// Queues removal of the snapshot, after every flush queued before it.
    pub fn clear(&self) {
        if self.tx.send(StoreCommand::Clear).is_err() {
            tracing::error!("Session writer is gone, snapshot not cleared");
        }
    }

    /// The newest snapshot write that succeeded.
    pub fn last_written(&self) -> Option<WriteReceipt> {
        *self.written.borrow()
    }

    /// Waits until every queued command has been attempted.
    pub async fn settle(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(StoreCommand::Settle(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run_writer(
    store: Arc<dyn KeyValueStore>,
    mut rx: mpsc::UnboundedReceiver<StoreCommand>,
    receipts: watch::Sender<Option<WriteReceipt>>,
) {
    let mut pending = None;

    loop {
        let command = match pending.take() {
            Some(command) => command,
            None => match rx.recv().await {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            StoreCommand::Flush(mut snapshot, mut generation) => {
                // Only the newest of a burst of flushes is worth writing
                while let Ok(next) = rx.try_recv() {
                    match next {
                        StoreCommand::Flush(newer, newer_generation) => {
                            snapshot = newer;
                            generation = newer_generation;
                        }
                        other => {
                            pending = Some(other);
                            break;
                        }
                    }
                }
                if write_snapshot(store.as_ref(), &snapshot).await {
                    receipts.send_replace(Some(WriteReceipt { generation, distance_miles: snapshot.distance_miles }));
                }
            }
            StoreCommand::Clear => {
                if let Err(err) = store.remove(TRIP_STATE_KEY).await {
                    tracing::error!("Failed to clear session snapshot: {err}");
                }
            }
            StoreCommand::Settle(ack) => {
                let _ = ack.send(());
            }
        }
    }

    tracing::debug!("Session writer stopped");
}

async fn write_snapshot(store: &dyn KeyValueStore, snapshot: &SessionSnapshot) -> bool {
    let json = match snapshot.to_json() {
        Ok(json) => json,
        Err(err) => {
            tracing::error!("{err}");
            return false;
        }
    };

    match store.set(TRIP_STATE_KEY, &json).await {
        Ok(()) => {
            tracing::debug!("Saved snapshot at {:.3} mi, {} points", snapshot.distance_miles, snapshot.path.len());
            true
        }
        Err(err) => {
            tracing::error!("Failed to save session snapshot: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use mileage_tracker_lib::{path_point::PathPoint, trip_record::TripType};

    use crate::{storage::MemoryStore, test_support::FailingStore};

    use super::*;

    fn snapshot(distance_miles: f64) -> SessionSnapshot {
        let point = PathPoint::new(40.0, -75.0, 5.);
        SessionSnapshot::new(distance_miles, vec![point], Some(point), TripType::Work)
    }

    #[tokio::test]
    async fn flush_then_load() {
        let kv = Arc::new(MemoryStore::new());
        let store = SessionStore::start(kv.clone());
        assert_eq!(store.load().await, None);

        store.flush(snapshot(0.5), 1);
        store.settle().await;

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.distance_miles, 0.5);
        assert_eq!(loaded.status, SessionStatus::Tracking);
    }

    #[tokio::test]
    async fn last_flush_wins() {
        let kv = Arc::new(MemoryStore::new());
        let store = SessionStore::start(kv.clone());

        for i in 1..=20 {
            store.flush(snapshot(i as f64 * 0.03), 1);
        }
        store.settle().await;

        assert!((store.load().await.unwrap().distance_miles - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn clear_lands_after_queued_flushes() {
        let kv = Arc::new(MemoryStore::new());
        let store = SessionStore::start(kv.clone());

        store.flush(snapshot(0.1), 1);
        store.flush(snapshot(0.2), 1);
        store.clear();
        store.settle().await;

        assert_eq!(store.load().await, None);
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn idle_or_corrupt_snapshots_are_ignored() {
        let kv = Arc::new(MemoryStore::new());
        let store = SessionStore::start(kv.clone());

        kv.set(TRIP_STATE_KEY, "not json").await.unwrap();
        assert_eq!(store.load().await, None);

        let mut idle = snapshot(1.0);
        idle.status = SessionStatus::Idle;
        kv.set(TRIP_STATE_KEY, &idle.to_json().unwrap()).await.unwrap();
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn write_failures_are_swallowed() {
        let kv = Arc::new(FailingStore::default());
        let store = SessionStore::start(kv.clone());

        store.flush(snapshot(0.3), 1);
        store.settle().await;
        store.clear();

        // The writer is still alive after the failures
        store.flush(snapshot(0.4), 1);
        store.settle().await;
        assert_eq!(kv.attempts(), 3);
        assert_eq!(store.last_written(), None);
    }

    #[tokio::test]
    async fn receipts_follow_successful_writes() {
        let store = SessionStore::start(Arc::new(MemoryStore::new()));
        assert_eq!(store.last_written(), None);

        store.flush(snapshot(0.1), 3);
        store.flush(snapshot(0.25), 4);
        store.settle().await;

        assert_eq!(store.last_written(), Some(WriteReceipt { generation: 4, distance_miles: 0.25 }));
    }
}
