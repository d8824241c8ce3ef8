//! Identity provider directory abstraction.
//!
//! This module provides:
//! - [`IdpClient`] - Trait for the user-management capabilities the reconciler needs
//! - [`IdpUserRecord`] - A user as reported by the directory
//! - [`NewHumanUser`] / [`HumanUserUpdate`] - Mutation payloads
//! - [`MemoryDirectory`] - In-memory implementation for development and tests
//! - [`ZitadelClient`] - ZITADEL REST implementation (with `zitadel` feature)
//!
//! The directory never hard-deletes users; removal upstream maps to
//! deactivation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::IdpUserId;

mod memory;
#[cfg(feature = "zitadel")]
mod zitadel;

pub use memory::MemoryDirectory;
#[cfg(feature = "zitadel")]
pub use zitadel::ZitadelClient;

/// Metadata key holding the original avatar URL.
pub const AVATAR_ORIGIN_KEY: &str = "feishu:avatar_origin_url";

/// Metadata key holding the 240px avatar URL.
pub const AVATAR_240_KEY: &str = "feishu:avatar_240_url";

/// Lifecycle state of a directory user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    Active,
    Inactive,
    /// Any other state the directory reports (initial, locked, ...).
    Other,
}

/// A user record as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpUserRecord {
    pub user_id: IdpUserId,

    /// Login name; the enterprise email for users managed here.
    pub login_name: String,

    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub phone: Option<String>,

    pub state: UserState,

    #[serde(default)]
    pub metadata: BTreeMap<String, Vec<u8>>,
}

/// Human profile fields shared by add and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanProfile {
    pub given_name: String,
    pub family_name: String,
    pub display_name: String,
}

/// Link between a directory user and an external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpLink {
    /// Identifier of the external provider as configured in the directory.
    pub idp_id: String,

    /// The user's identifier at the external provider.
    pub user_id: String,

    pub user_name: String,
}

/// A single metadata key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Payload for creating a human user.
///
/// The email (and the phone, when present) are always marked verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHumanUser {
    pub username: String,
    pub profile: HumanProfile,
    pub email: String,
    pub phone: Option<String>,
    pub idp_links: Vec<IdpLink>,
    pub metadata: Vec<MetadataEntry>,
}

/// Payload for updating an existing human user.
///
/// The email is always marked verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanUserUpdate {
    pub username: String,
    pub profile: HumanProfile,
    pub email: String,
}

/// Error type for directory operations.
#[derive(Debug, Error)]
pub enum IdpError {
    /// The directory answered with an error status.
    #[error("{operation} rejected by IdP (status {status}): {message}")]
    Api {
        operation: &'static str,
        status: u16,
        message: String,
    },

    /// The request did not complete (connect, TLS, timeout).
    #[error("{operation} failed in transport: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The directory answered with a body that could not be understood.
    #[error("{operation} returned an unexpected response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    /// The addressed user does not exist.
    #[error("IdP user {user_id} not found")]
    UserNotFound { user_id: String },

    /// The login name is already taken by another user.
    #[error("login name {login_name} is already taken")]
    Conflict { login_name: String },

    /// The client could not be constructed from its configuration.
    #[error("invalid IdP client configuration: {message}")]
    Config { message: String },
}

/// User-management capabilities of the directory.
///
/// Implementations:
/// - [`MemoryDirectory`] - In-memory directory
/// - [`ZitadelClient`] (with `zitadel` feature) - ZITADEL v2 REST API
#[async_trait]
pub trait IdpClient: Send + Sync {
    /// Find users whose login name equals `email` exactly.
    async fn list_users_by_email(&self, email: &str) -> Result<Vec<IdpUserRecord>, IdpError>;

    /// Create a human user and return its identifier.
    async fn add_user(&self, user: &NewHumanUser) -> Result<IdpUserId, IdpError>;

    /// Replace profile, username and email of an existing user.
    async fn update_user(
        &self,
        user_id: &IdpUserId,
        update: &HumanUserUpdate,
    ) -> Result<IdpUserId, IdpError>;

    /// Set (insert or overwrite) metadata entries on a user.
    async fn set_metadata(
        &self,
        user_id: &IdpUserId,
        entries: &[MetadataEntry],
    ) -> Result<(), IdpError>;

    async fn deactivate_user(&self, user_id: &IdpUserId) -> Result<(), IdpError>;

    async fn reactivate_user(&self, user_id: &IdpUserId) -> Result<(), IdpError>;
}
