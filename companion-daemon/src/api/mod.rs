//! HTTP API for the daemon.
//!
//! This module provides the axum router serving token issuance, webhook
//! relay and the Feishu event callback.

pub mod error;
pub mod handlers;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use handlers::ApiState;
pub use server::{router, start_server, ServerHandle};
pub use types::*;
