//! Messaging abstraction.
//!
//! This module provides:
//! - [`Messenger`] - Trait for sending a text message to a recipient
//! - [`MessagingError`] - Error type for messaging operations
//! - [`LogMessenger`] - Logs messages instead of sending them
//! - [`FeishuMessenger`] - Feishu/Lark IM implementation (with `feishu` feature)

use async_trait::async_trait;
use thiserror::Error;

mod logging;
#[cfg(feature = "feishu")]
mod feishu;

pub use logging::LogMessenger;
#[cfg(feature = "feishu")]
pub use feishu::FeishuMessenger;

/// Error type for messaging operations.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The provider rejected the request.
    #[error("messaging provider returned code {code}: {message} (log id: {})", .log_id.as_deref().unwrap_or("-"))]
    Api {
        code: i64,
        message: String,
        log_id: Option<String>,
    },

    /// Obtaining an access token failed.
    #[error("messaging authentication failed: {message}")]
    Auth { message: String },

    /// The request did not complete (connect, TLS, timeout).
    #[error("messaging transport error: {message}")]
    Transport { message: String },

    /// The provider answered with a body that could not be understood.
    #[error("unexpected messaging response: {message}")]
    Decode { message: String },

    /// The client could not be constructed from its configuration.
    #[error("invalid messaging configuration: {message}")]
    Config { message: String },
}

/// Capability to deliver a plain-text message.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Name of this adapter as used in routing configuration (e.g. `"feishu"`).
    fn actor(&self) -> &str;

    /// Send `text` to the recipient identified by `(receive_id_type, receive_id)`.
    async fn send_text(
        &self,
        receive_id_type: &str,
        receive_id: &str,
        text: &str,
    ) -> Result<(), MessagingError>;
}
