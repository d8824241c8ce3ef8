//! # Companion Core
//!
//! Core library for the auth companion, the bridge between the Feishu IM
//! directory, the ZITADEL identity provider and the new-api gateway.
//!
//! This crate provides:
//! - Domain types for user profiles and lifecycle events
//! - The [`Reconciler`], which applies lifecycle events to the IdP directory
//! - The [`TokenIssuer`], which idempotently ensures gateway tokens
//! - The [`WebhookRelay`], which forwards gateway notifications as IM messages
//! - Narrow adapter traits ([`IdpClient`], [`Messenger`], [`TokenStore`]) with
//!   in-memory and (optionally) ZITADEL, Feishu and SQLite implementations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use companion_core::{LifecycleEvent, MemoryDirectory, Reconciler, ReconcilerConfig, UserProfileSnapshot};
//!
//! async fn sync(snapshot: UserProfileSnapshot) -> Result<(), companion_core::ReconcileError> {
//!     let reconciler = Reconciler::new(Arc::new(MemoryDirectory::new()), ReconcilerConfig::default());
//!     let outcome = reconciler.handle(&LifecycleEvent::updated(snapshot)).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod event;
pub mod idp;
pub mod issuer;
pub mod messaging;
pub mod model;
pub mod reconcile;
pub mod relay;
pub mod secret;
pub mod store;

// Re-export commonly used types at crate root
pub use model::{
    AvatarUrls,
    IdpUserId,
    LifecycleEvent,
    LifecycleKind,
    ProfileField,
    StatusFlags,
    UserProfileSnapshot,
    split_en_name,
};

pub use secret::Secret;

pub use idp::{
    IdpClient,
    IdpError,
    IdpUserRecord,
    MemoryDirectory,
};

#[cfg(feature = "zitadel")]
pub use idp::ZitadelClient;

pub use messaging::{
    LogMessenger,
    Messenger,
    MessagingError,
};

#[cfg(feature = "feishu")]
pub use messaging::FeishuMessenger;

pub use store::{
    TokenStore,
    StoreError,
    MemoryTokenStore,
};

#[cfg(feature = "sqlite")]
pub use store::SqliteTokenStore;

pub use reconcile::{
    Reconciler,
    ReconcilerConfig,
    ReconcileError,
    ReconcileOutcome,
};

pub use issuer::{
    IssuedToken,
    IssueError,
    TokenIssuer,
};

pub use relay::{
    NotificationPayload,
    RelayError,
    RouteTable,
    WebhookRelay,
    WebhookRoute,
};

pub use event::{
    Callback,
    EventDecodeError,
    decode_callback,
};

pub use error::CompanionError;
