//! A [`Messenger`] that only logs.

use async_trait::async_trait;
use tracing::info;

use super::{Messenger, MessagingError};

/// Messenger that writes messages to the log instead of delivering them.
///
/// Used when no messaging provider is configured.
#[derive(Debug, Clone)]
pub struct LogMessenger {
    actor: String,
}

impl LogMessenger {
    /// Create a messenger answering to `actor` in route configuration.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
        }
    }
}

#[async_trait]
impl Messenger for LogMessenger {
    fn actor(&self) -> &str {
        &self.actor
    }

    async fn send_text(
        &self,
        receive_id_type: &str,
        receive_id: &str,
        text: &str,
    ) -> Result<(), MessagingError> {
        info!(receive_id_type, receive_id, text, "message not delivered (no messaging provider)");
        Ok(())
    }
}
