//! Server-Sent Events progress subscription
//!
//! GET /uploads/:upload_id/sse streams one `data:` JSON snapshot per notifier
//! tick. The push loop runs in its own task and stops once the client goes
//! away (the response body, and with it the channel receiver, is dropped).

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::models::UploadId;
use crate::notifier::{Snapshot, SnapshotSink};
use crate::AppState;

/// Snapshots buffered between the push loop and the response body
const CHANNEL_CAPACITY: usize = 16;

/// Push-mode sink feeding an SSE response
pub struct SseSink {
    tx: mpsc::Sender<Result<Event, Infallible>>,
}

impl SseSink {
    pub fn new(tx: mpsc::Sender<Result<Event, Infallible>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl SnapshotSink for SseSink {
    async fn push(&mut self, snapshot: &Snapshot) -> TrackerResult<()> {
        let data = snapshot
            .to_json()
            .map_err(|e| TrackerError::Transport(format!("Failed to encode snapshot: {}", e)))?;
        self.tx
            .send(Ok(Event::default().data(data)))
            .await
            .map_err(|_| TrackerError::Transport("SSE client disconnected".to_string()))
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// GET /uploads/:upload_id/sse
pub async fn upload_event_stream(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = UploadId::from(upload_id);
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    info!(upload_id = %id, "SSE subscription opened");

    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        let mut sink = SseSink::new(tx);
        match notifier.run_push(&id, &mut sink).await {
            Ok(sent) => info!(upload_id = %id, sent, "SSE subscription closed"),
            Err(e) => warn!(upload_id = %id, error = %e, "SSE subscription ended on error"),
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(uptrack_common::sse::keep_alive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_reports_disconnect_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        let mut sink = SseSink::new(tx);
        assert!(sink.is_connected());

        drop(rx);
        assert!(!sink.is_connected());
        let result = sink.push(&Snapshot::Pending).await;
        assert!(matches!(result, Err(TrackerError::Transport(_))));
    }
}
