//! Top-level error types for the companion.

use thiserror::Error;

use crate::event::EventDecodeError;
use crate::idp::IdpError;
use crate::issuer::IssueError;
use crate::messaging::MessagingError;
use crate::reconcile::ReconcileError;
use crate::relay::RelayError;
use crate::store::StoreError;

/// Top-level error type encompassing all companion errors.
#[derive(Debug, Error)]
pub enum CompanionError {
    /// Error from directory operations.
    #[error("IdP error: {0}")]
    Idp(#[from] IdpError),

    /// Error from the messaging adapter.
    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Error from token storage.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from identity reconciliation.
    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Error from token issuance.
    #[error("issue error: {0}")]
    Issue(#[from] IssueError),

    /// Error from the webhook relay.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Error decoding an event callback.
    #[error("event error: {0}")]
    Event(#[from] EventDecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_step() -> Result<(), CompanionError> {
        Err(RelayError::NotFound {
            source_tag: "billing".to_string(),
        })?;
        Ok(())
    }

    #[test]
    fn test_component_errors_convert() {
        let err = relay_step().unwrap_err();
        assert!(matches!(err, CompanionError::Relay(RelayError::NotFound { .. })));
        assert!(err.to_string().starts_with("relay error: "));
        assert!(err.to_string().contains("billing"));
    }

    #[test]
    fn test_idp_error_keeps_operation() {
        let err: CompanionError = IdpError::Transport {
            operation: "add_user",
            message: "timed out".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "IdP error: add_user failed in transport: timed out"
        );
    }
}
