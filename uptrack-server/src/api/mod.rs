//! HTTP API handlers for uptrack-server
//!
//! JSON request/response routes for batch lifecycle operations, plus the two
//! progress subscription transports (SSE and websocket).

pub mod health;
pub mod sse;
pub mod uploads;
pub mod ws;

pub use health::health_routes;
pub use sse::upload_event_stream;
pub use uploads::upload_routes;
pub use ws::upload_websocket;
