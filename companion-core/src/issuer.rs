//! Idempotent gateway token issuance.
//!
//! This module provides [`TokenIssuer`], which ensures that a named token
//! exists for a gateway user and returns it.
//!
//! # Concurrency
//!
//! The issuer holds no lock of its own. Convergence under concurrent calls
//! for the same (owner, name) pair comes from
//! [`TokenStore::insert_token_if_absent`]: the first writer wins, and every
//! caller then reads back the single live row.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::secret::Secret;
use crate::store::{InsertOutcome, NewGatewayToken, StoreError, TokenStore};

/// Length of the random part of a token.
pub const TOKEN_SECRET_LEN: usize = 48;

/// Marker prepended to secrets handed out to callers. Not stored.
pub const TOKEN_PREFIX: &str = "sk-";

/// Error type for token issuance.
#[derive(Debug, Error)]
pub enum IssueError {
    /// The request was missing a required value.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// No live gateway user has this external subject ID.
    #[error("no gateway user for subject {external_subject_id}")]
    OwnerNotFound { external_subject_id: String },

    /// The token store failed.
    #[error("token store error during {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

/// A token as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token_id: i64,

    /// Secret including the [`TOKEN_PREFIX`] marker.
    pub token: Secret,
}

/// Ensures named gateway tokens exist.
#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Ensure a token named `token_name` exists for the user with
    /// `external_subject_id`, creating it in `token_group` if needed.
    ///
    /// Repeated and concurrent calls return the same token.
    pub async fn ensure_token(
        &self,
        external_subject_id: &str,
        token_name: &str,
        token_group: &str,
    ) -> Result<IssuedToken, IssueError> {
        if external_subject_id.trim().is_empty() {
            return Err(IssueError::InvalidRequest {
                message: "subject id must not be empty".to_string(),
            });
        }
        if token_name.trim().is_empty() {
            return Err(IssueError::InvalidRequest {
                message: "token name must not be empty".to_string(),
            });
        }

        let owner = self
            .store
            .find_owner(external_subject_id)
            .await
            .map_err(|source| IssueError::Store {
                operation: "find_owner",
                source,
            })?
            .ok_or_else(|| IssueError::OwnerNotFound {
                external_subject_id: external_subject_id.to_string(),
            })?;

        let candidate = NewGatewayToken {
            owner_id: owner.id,
            name: token_name.to_string(),
            group: token_group.to_string(),
            secret: generate_secret(),
            created_time: Utc::now().timestamp(),
            unlimited_quota: true,
        };

        let outcome = self
            .store
            .insert_token_if_absent(&candidate)
            .await
            .map_err(|source| IssueError::Store {
                operation: "insert_token",
                source,
            })?;

        let token = self
            .store
            .find_token(owner.id, token_name)
            .await
            .map_err(|source| IssueError::Store {
                operation: "find_token",
                source,
            })?
            .ok_or_else(|| IssueError::Store {
                operation: "find_token",
                source: StoreError::BackendError {
                    message: format!(
                        "token {:?} for user {} missing after insert",
                        token_name, owner.id
                    ),
                },
            })?;

        match outcome {
            InsertOutcome::Created => info!(
                owner_id = owner.id,
                token_id = token.id,
                token_name,
                token_group,
                "created gateway token"
            ),
            InsertOutcome::AlreadyExists => debug!(
                owner_id = owner.id,
                token_id = token.id,
                token_name,
                "gateway token already exists"
            ),
        }

        Ok(IssuedToken {
            token_id: token.id,
            token: Secret::new(format!("{}{}", TOKEN_PREFIX, token.secret.expose())),
        })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").finish_non_exhaustive()
    }
}

/// Generate a fresh random secret from `[0-9a-zA-Z]`.
pub fn generate_secret() -> Secret {
    let value: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_SECRET_LEN)
        .map(char::from)
        .collect();
    Secret::new(value)
}
