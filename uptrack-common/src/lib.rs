//! # uptrack Common Library
//!
//! Shared code for the uptrack services:
//! - Bootstrap configuration loading (TOML + defaults)
//! - Tracing subscriber initialisation
//! - Common error type
//! - Server-Sent Events helpers

pub mod config;
pub mod error;
pub mod logging;
pub mod sse;

pub use error::{Error, Result};
