//! Gateway token storage abstraction.
//!
//! This module provides:
//! - [`TokenStore`] - Trait for the token store backing [`TokenIssuer`](crate::issuer::TokenIssuer)
//! - [`MemoryTokenStore`] - In-memory implementation for testing
//! - [`SqliteTokenStore`] - SQLite implementation over the gateway's own database
//!   (with `sqlite` feature)
//!
//! # Row Liveness
//!
//! Both users and tokens are soft-deleted upstream; only rows whose
//! `deleted_at` is unset are considered.
//!
//! # Atomicity
//!
//! [`TokenStore::insert_token_if_absent`] must perform its existence check and
//! insert as one indivisible storage operation. Several companion instances
//! may share one database, so in-process locking is not enough.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::secret::Secret;

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryTokenStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTokenStore;

/// Error type for token store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// The store could not be opened.
    #[error("failed to open token store: {message}")]
    Open { message: String },
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::BackendError {
            message: e.to_string(),
        }
    }
}

/// A live gateway user that tokens can be issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOwner {
    pub id: i64,
    pub username: Option<String>,
    pub external_subject_id: String,
}

/// A token row to insert.
#[derive(Debug, Clone)]
pub struct NewGatewayToken {
    pub owner_id: i64,
    pub name: String,
    pub group: String,

    /// Raw secret, without any display prefix.
    pub secret: Secret,

    /// Creation (and first access) time, unix seconds.
    pub created_time: i64,

    pub unlimited_quota: bool,
}

/// A live token row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayToken {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub group: Option<String>,

    /// Raw secret, without any display prefix.
    pub secret: Secret,
}

/// Result of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertOutcome {
    /// No live token existed for the (owner, name) pair; one was inserted.
    Created,
    /// A live token already existed; nothing was written.
    AlreadyExists,
}

/// Abstraction over the gateway's token storage.
///
/// Implementations include:
/// - [`MemoryTokenStore`] - In-memory storage for testing
/// - [`SqliteTokenStore`] (with `sqlite` feature) - the gateway's SQLite database
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Find the live user whose external subject ID matches.
    ///
    /// Returns `Ok(None)` if there is none.
    async fn find_owner(&self, external_subject_id: &str)
    -> Result<Option<TokenOwner>, StoreError>;

    /// Insert `token` unless a live token with the same owner and name exists.
    ///
    /// Check and insert happen atomically at the storage layer.
    async fn insert_token_if_absent(
        &self,
        token: &NewGatewayToken,
    ) -> Result<InsertOutcome, StoreError>;

    /// Fetch the live token for an owner and name.
    ///
    /// Returns `Ok(None)` if there is none.
    async fn find_token(&self, owner_id: i64, name: &str)
    -> Result<Option<GatewayToken>, StoreError>;
}
