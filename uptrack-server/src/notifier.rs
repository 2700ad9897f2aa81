//! Progress notifier
//!
//! Polls the tracker at a fixed interval and pushes one snapshot per tick to
//! a single subscriber. The same loop serves SSE (push mode, stops when the
//! liveness predicate reports a disconnect) and websockets (duplex mode,
//! stops when the transport closes). Both modes also stop when the shared
//! shutdown token fires.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{TrackerError, TrackerResult};
use crate::models::{UploadBatch, UploadId};
use crate::tracker::UploadTracker;

/// State of a batch as seen by a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Current batch state
    Report(UploadBatch),
    /// No batch under this id (yet)
    Pending,
}

impl Snapshot {
    /// JSON value sent on the wire; `Pending` is an empty object
    pub fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Snapshot::Report(batch) => serde_json::to_value(batch),
            Snapshot::Pending => Ok(Value::Object(Default::default())),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        self.to_value().map(|value| value.to_string())
    }
}

/// Outbound side of a subscription
#[async_trait]
pub trait SnapshotSink: Send {
    /// Deliver one snapshot; an error ends the subscription
    async fn push(&mut self, snapshot: &Snapshot) -> TrackerResult<()>;

    /// Liveness predicate checked before every push-mode tick
    fn is_connected(&self) -> bool {
        true
    }
}

/// Polling loop over the tracker
#[derive(Debug, Clone)]
pub struct ProgressNotifier {
    tracker: UploadTracker,
    interval: Duration,
    shutdown: CancellationToken,
}

impl ProgressNotifier {
    pub fn new(tracker: UploadTracker, interval: Duration) -> Self {
        Self {
            tracker,
            interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// End every subscription when `shutdown` is cancelled
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Read the batch once, mapping an unknown id to [`Snapshot::Pending`]
    pub async fn snapshot(&self, id: &UploadId) -> TrackerResult<Snapshot> {
        match self.tracker.get_report(id).await {
            Ok(batch) => Ok(Snapshot::Report(batch)),
            Err(TrackerError::NotFound(_)) => Ok(Snapshot::Pending),
            Err(e) => Err(e),
        }
    }

    async fn push_once<S: SnapshotSink>(&self, id: &UploadId, sink: &mut S) -> TrackerResult<()> {
        let snapshot = self.snapshot(id).await?;
        debug!(upload_id = %id, pending = matches!(snapshot, Snapshot::Pending), "Pushing snapshot");
        sink.push(&snapshot).await
    }

    /// Push mode: one snapshot per interval while the sink is connected
    ///
    /// The predicate is checked before each store read, so no read happens
    /// after a disconnect is observed. Shutdown interrupts a pending push or
    /// sleep. Returns the number of snapshots sent.
    pub async fn run_push<S: SnapshotSink>(&self, id: &UploadId, sink: &mut S) -> TrackerResult<u64> {
        let mut sent = 0;
        while sink.is_connected() && !self.shutdown.is_cancelled() {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.push_once(id, sink) => {
                    result?;
                    sent += 1;
                }
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        Ok(sent)
    }

    /// Duplex mode: push until `closed` resolves or a push fails
    ///
    /// `closed` should complete when the peer closes the transport or the
    /// transport errors; shutdown is handled the same way. Returns the number
    /// of snapshots sent.
    pub async fn run_duplex<S, C>(&self, id: &UploadId, sink: &mut S, closed: C) -> TrackerResult<u64>
    where
        S: SnapshotSink,
        C: Future<Output = ()>,
    {
        tokio::pin!(closed);
        let mut sent = 0;
        loop {
            tokio::select! {
                _ = &mut closed => return Ok(sent),
                _ = self.shutdown.cancelled() => return Ok(sent),
                result = self.push_once(id, sink) => {
                    result?;
                    sent += 1;
                }
            }
            tokio::select! {
                _ = &mut closed => return Ok(sent),
                _ = self.shutdown.cancelled() => return Ok(sent),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UploadStatus;
    use crate::store::{BatchStore, MemoryStore, StoreError, StoreResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Store wrapper counting lookups
    struct CountingStore {
        inner: MemoryStore,
        finds: AtomicUsize,
    }

    #[async_trait]
    impl BatchStore for CountingStore {
        fn backend_name(&self) -> &'static str {
            "counting"
        }

        async fn upsert(&self, id: &UploadId, batch: &UploadBatch) -> StoreResult<()> {
            self.inner.upsert(id, batch).await
        }

        async fn find(&self, id: &UploadId) -> StoreResult<Option<UploadBatch>> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            self.inner.find(id).await
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl BatchStore for BrokenStore {
        fn backend_name(&self) -> &'static str {
            "broken"
        }

        async fn upsert(&self, _id: &UploadId, _batch: &UploadBatch) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn find(&self, _id: &UploadId) -> StoreResult<Option<UploadBatch>> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    /// Sink that disconnects after `limit` snapshots
    struct LimitedSink {
        received: Vec<Snapshot>,
        limit: usize,
    }

    #[async_trait]
    impl SnapshotSink for LimitedSink {
        async fn push(&mut self, snapshot: &Snapshot) -> TrackerResult<()> {
            self.received.push(snapshot.clone());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.received.len() < self.limit
        }
    }

    struct FailingSink;

    #[async_trait]
    impl SnapshotSink for FailingSink {
        async fn push(&mut self, _snapshot: &Snapshot) -> TrackerResult<()> {
            Err(TrackerError::Transport("peer gone".to_string()))
        }
    }

    fn counting() -> (Arc<CountingStore>, ProgressNotifier) {
        let store = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            finds: AtomicUsize::new(0),
        });
        let tracker = UploadTracker::new(store.clone());
        let notifier = ProgressNotifier::new(tracker, Duration::from_millis(5));
        (store, notifier)
    }

    #[test]
    fn test_pending_serialises_as_empty_object() {
        assert_eq!(Snapshot::Pending.to_json().unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_push_stops_reading_after_disconnect() {
        let (store, notifier) = counting();
        let batch = notifier
            .tracker
            .create_batch("images", vec!["a.jpg".to_string()])
            .await
            .unwrap();

        let mut sink = LimitedSink {
            received: Vec::new(),
            limit: 3,
        };
        let sent = notifier.run_push(&batch.upload_id, &mut sink).await.unwrap();

        assert_eq!(sent, 3);
        assert_eq!(store.finds.load(Ordering::SeqCst), 3);
        assert!(sink
            .received
            .iter()
            .all(|s| matches!(s, Snapshot::Report(b) if b.upload_id == batch.upload_id)));
    }

    #[tokio::test]
    async fn test_push_emits_pending_for_unknown_id() {
        let (_store, notifier) = counting();
        let mut sink = LimitedSink {
            received: Vec::new(),
            limit: 2,
        };
        notifier
            .run_push(&UploadId::from("not-yet"), &mut sink)
            .await
            .unwrap();
        assert_eq!(sink.received, vec![Snapshot::Pending, Snapshot::Pending]);
    }

    #[tokio::test]
    async fn test_push_observes_convergence() {
        let (_store, notifier) = counting();
        let tracker = notifier.tracker.clone();
        let batch = tracker
            .create_batch("images", vec!["a.jpg".to_string()])
            .await
            .unwrap();

        let mut sink = LimitedSink {
            received: Vec::new(),
            limit: 1,
        };
        notifier.run_push(&batch.upload_id, &mut sink).await.unwrap();
        tracker
            .record_file_completion(&batch.upload_id, "a.jpg")
            .await
            .unwrap();
        sink.limit = 2;
        notifier.run_push(&batch.upload_id, &mut sink).await.unwrap();

        let statuses: Vec<_> = sink
            .received
            .iter()
            .map(|s| match s {
                Snapshot::Report(b) => b.status,
                Snapshot::Pending => panic!("batch exists"),
            })
            .collect();
        assert_eq!(statuses, vec![UploadStatus::InProgress, UploadStatus::Completed]);
    }

    #[tokio::test]
    async fn test_disconnected_sink_never_reads() {
        let (store, notifier) = counting();
        let mut sink = LimitedSink {
            received: Vec::new(),
            limit: 0,
        };
        let sent = notifier.run_push(&UploadId::from("x"), &mut sink).await.unwrap();
        assert_eq!(sent, 0);
        assert_eq!(store.finds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_failure_ends_subscription() {
        let (_store, notifier) = counting();
        let result = notifier.run_push(&UploadId::from("x"), &mut FailingSink).await;
        assert!(matches!(result, Err(TrackerError::Transport(_))));

        let closed = std::future::pending::<()>();
        let result = notifier
            .run_duplex(&UploadId::from("x"), &mut FailingSink, closed)
            .await;
        assert!(matches!(result, Err(TrackerError::Transport(_))));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_pending() {
        let tracker = UploadTracker::new(Arc::new(BrokenStore));
        let notifier = ProgressNotifier::new(tracker, Duration::from_millis(5));
        let mut sink = LimitedSink {
            received: Vec::new(),
            limit: 5,
        };

        let result = notifier.run_push(&UploadId::from("x"), &mut sink).await;
        assert!(matches!(result, Err(TrackerError::StoreUnavailable(_))));
        assert!(sink.received.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_ends_both_modes() {
        let (_store, notifier) = counting();
        let token = CancellationToken::new();
        let notifier = notifier.with_shutdown(token.clone());

        let push = {
            let notifier = notifier.clone();
            tokio::spawn(async move {
                let mut sink = LimitedSink {
                    received: Vec::new(),
                    limit: usize::MAX,
                };
                notifier.run_push(&UploadId::from("x"), &mut sink).await
            })
        };
        let duplex = {
            let notifier = notifier.clone();
            tokio::spawn(async move {
                let mut sink = LimitedSink {
                    received: Vec::new(),
                    limit: usize::MAX,
                };
                notifier
                    .run_duplex(&UploadId::from("x"), &mut sink, std::future::pending::<()>())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let pushed = tokio::time::timeout(Duration::from_secs(1), push)
            .await
            .expect("push loop stops on shutdown")
            .unwrap()
            .unwrap();
        let duplexed = tokio::time::timeout(Duration::from_secs(1), duplex)
            .await
            .expect("duplex loop stops on shutdown")
            .unwrap()
            .unwrap();
        assert!(pushed >= 1);
        assert!(duplexed >= 1);

        // A subscription opened after shutdown never reads the store
        let mut sink = LimitedSink {
            received: Vec::new(),
            limit: usize::MAX,
        };
        assert_eq!(notifier.run_push(&UploadId::from("x"), &mut sink).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplex_stops_when_closed() {
        let (_store, notifier) = counting();
        let (close_tx, close_rx) = tokio::sync::oneshot::channel::<()>();
        let mut sink = LimitedSink {
            received: Vec::new(),
            limit: usize::MAX,
        };

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = close_tx.send(());
        });
        let closed = async move {
            let _ = close_rx.await;
        };

        let sent = notifier
            .run_duplex(&UploadId::from("x"), &mut sink, closed)
            .await
            .unwrap();
        closer.await.unwrap();

        assert!(sent >= 1);
        assert_eq!(sent as usize, sink.received.len());
    }
}
