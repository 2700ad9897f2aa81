//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE settings for uptrack event streams.

use axum::response::sse::KeepAlive;
use std::time::Duration;

/// Interval between keep-alive comments on idle SSE connections
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Keep-alive configuration applied to every SSE response
///
/// Proxies tend to drop idle event streams; a comment line every
/// [`KEEP_ALIVE_INTERVAL`] keeps the connection open between snapshots.
///
/// # Example
/// ```rust,ignore
/// Sse::new(stream).keep_alive(uptrack_common::sse::keep_alive())
/// ```
pub fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(KEEP_ALIVE_INTERVAL)
        .text("keep-alive")
}
