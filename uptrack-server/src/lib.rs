//! uptrack-server library - upload batch tracking service
//!
//! Clients declare a batch of files, report per-file completions and watch
//! the batch converge over SSE or a websocket. Batch state lives in an
//! injected [`store::BatchStore`].

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod models;
pub mod notifier;
pub mod store;
pub mod tracker;
pub mod validation;

use notifier::ProgressNotifier;
use store::BatchStore;
use tracker::UploadTracker;

/// Application state shared across HTTP handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub tracker: UploadTracker,
    pub notifier: ProgressNotifier,
    /// Cancelled on process shutdown; ends open SSE and websocket subscriptions
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create application state over a store
    pub fn new(store: Arc<dyn BatchStore>, poll_interval: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let tracker = UploadTracker::new(store);
        let notifier =
            ProgressNotifier::new(tracker.clone(), poll_interval).with_shutdown(shutdown.clone());
        Self {
            tracker,
            notifier,
            shutdown,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::upload_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
