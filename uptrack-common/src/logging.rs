//! Tracing subscriber initialisation

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directives for a configured level
///
/// Covers the uptrack crates and tower-http request tracing.
pub fn default_directives(level: &str) -> String {
    format!(
        "uptrack_server={level},uptrack_common={level},tower_http={level}",
        level = level
    )
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence when set; otherwise the configured level is
/// applied to the uptrack crates. Calling this twice is an error.
pub fn init_tracing(level: &str) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| crate::Error::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
