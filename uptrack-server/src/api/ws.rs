//! Websocket progress subscription
//!
//! GET /uploads/:upload_id/ws upgrades to a websocket that receives one JSON
//! text frame per notifier tick. Inbound frames are read only to detect the
//! peer closing the socket.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::models::UploadId;
use crate::notifier::{Snapshot, SnapshotSink};
use crate::AppState;

/// Duplex-mode sink over the outbound half of a websocket
pub struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl SnapshotSink for WsSink {
    async fn push(&mut self, snapshot: &Snapshot) -> TrackerResult<()> {
        let text = snapshot
            .to_json()
            .map_err(|e| TrackerError::Transport(format!("Failed to encode snapshot: {}", e)))?;
        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))
    }
}

/// GET /uploads/:upload_id/ws
pub async fn upload_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Response {
    let id = UploadId::from(upload_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, id))
}

/// Resolves once the peer closes the socket or the transport fails
async fn wait_for_close(mut receiver: SplitStream<WebSocket>, id: UploadId) {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => {
                debug!(upload_id = %id, "Websocket closed by peer");
                break;
            }
            Err(e) => {
                debug!(upload_id = %id, error = %e, "Websocket receive error");
                break;
            }
            // Ignored for now
            Ok(_) => {}
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, id: UploadId) {
    info!(upload_id = %id, "Websocket subscription opened");

    let (sender, receiver) = socket.split();
    let mut sink = WsSink { sender };
    let closed = wait_for_close(receiver, id.clone());

    match state.notifier.run_duplex(&id, &mut sink, closed).await {
        Ok(sent) => info!(upload_id = %id, sent, "Websocket subscription closed"),
        Err(e) => warn!(upload_id = %id, error = %e, "Websocket subscription ended on error"),
    }

    let _ = sink.sender.close().await;
}
