//! Identity reconciliation.
//!
//! [`Reconciler`] turns user lifecycle events from the IM provider into
//! calls against an [`IdpClient`], converging the directory toward the IM
//! provider's view of each user.
//!
//! # Ordering
//!
//! Events may arrive duplicated or out of order. Every path is written so
//! that replaying it converges:
//! - an update for a user the directory does not know adds the user
//! - repeated updates rewrite the same profile
//! - an update after a delete only toggles the activation state
//!
//! The reconciler neither buffers nor retries. Whether a failed event is
//! worth redelivering is reported by [`ReconcileError::is_retryable`].

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::idp::{
    AVATAR_240_KEY, AVATAR_ORIGIN_KEY, HumanProfile, HumanUserUpdate, IdpClient, IdpError,
    IdpLink, IdpUserRecord, MetadataEntry, NewHumanUser, UserState,
};
use crate::model::{
    AvatarUrls, IdpUserId, LifecycleEvent, LifecycleKind, PreflightedProfile, ProfileField,
    UserProfileSnapshot, split_en_name,
};

/// Error type for reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Mandatory profile fields were absent.
    #[error("profile is missing required fields: {}", format_fields(.missing))]
    PreflightFailed { missing: Vec<ProfileField> },

    /// No directory user has this email as login name.
    #[error("no IdP user with login name {email}")]
    UserNotFound { email: String },

    /// A directory call failed.
    #[error("IdP call {operation} failed: {source}")]
    Adapter {
        operation: &'static str,
        #[source]
        source: IdpError,
    },
}

impl ReconcileError {
    /// Whether redelivering the same event could succeed.
    ///
    /// Only adapter failures qualify, and not those where the directory
    /// already reported a conflicting login name.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Adapter { source, .. } => !matches!(source, IdpError::Conflict { .. }),
            Self::PreflightFailed { .. } | Self::UserNotFound { .. } => false,
        }
    }

    fn adapter(operation: &'static str) -> impl FnOnce(IdpError) -> Self {
        move |source| Self::Adapter { operation, source }
    }
}

fn format_fields(fields: &[ProfileField]) -> String {
    fields
        .iter()
        .map(ProfileField::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of applying the derived activation state after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    /// The directory call succeeded.
    Applied,
    /// The directory already reported the target state; nothing was called.
    Unchanged,
    /// The directory call failed; the failure was logged.
    Failed,
}

/// Activation target and what happened when applying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Activation {
    pub active: bool,
    pub status: ActivationStatus,
}

/// What a handled event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// A new directory user was added.
    Created { user_id: IdpUserId },

    /// An existing directory user was updated.
    Updated {
        user_id: IdpUserId,
        activation: Activation,
    },

    /// An update found no directory user, so one was added.
    SelfHealed {
        user_id: IdpUserId,
        activation: Activation,
    },

    /// A directory user was deactivated after deletion upstream.
    Deactivated { user_id: IdpUserId },

    /// The event lacked mandatory fields and was dropped.
    Skipped { missing: Vec<ProfileField> },
}

impl ReconcileOutcome {
    /// The directory user the event resolved to, if any.
    pub fn user_id(&self) -> Option<&IdpUserId> {
        match self {
            Self::Created { user_id }
            | Self::Updated { user_id, .. }
            | Self::SelfHealed { user_id, .. }
            | Self::Deactivated { user_id } => Some(user_id),
            Self::Skipped { .. } => None,
        }
    }
}

/// Reconciler settings.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerConfig {
    /// Directory-side identity provider ID used to link added users to the
    /// IM provider. Without it no link is created.
    pub idp_link_id: Option<String>,
}

/// Applies user lifecycle events to the directory.
#[derive(Clone)]
pub struct Reconciler {
    idp: Arc<dyn IdpClient>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(idp: Arc<dyn IdpClient>, config: ReconcilerConfig) -> Self {
        Self { idp, config }
    }

    /// Handle one event.
    ///
    /// Preflight failures are logged and reported as
    /// [`ReconcileOutcome::Skipped`] so the event is acknowledged upstream.
    /// All other errors are returned.
    pub async fn handle(&self, event: &LifecycleEvent) -> Result<ReconcileOutcome, ReconcileError> {
        debug!(
            kind = %event.kind,
            event_id = event.event_id.as_deref().unwrap_or("-"),
            "handling lifecycle event"
        );

        let result = match event.kind {
            LifecycleKind::Created => self.handle_created(&event.snapshot).await,
            LifecycleKind::Updated => self.handle_updated(&event.snapshot).await,
            LifecycleKind::Deleted => self.handle_deleted(&event.snapshot).await,
        };

        match result {
            Err(ReconcileError::PreflightFailed { missing }) => {
                warn!(
                    kind = %event.kind,
                    event_id = event.event_id.as_deref().unwrap_or("-"),
                    missing = %format_fields(&missing),
                    "incomplete user profile, event dropped"
                );
                Ok(ReconcileOutcome::Skipped { missing })
            }
            other => other,
        }
    }

    /// Add the user described by `snapshot` to the directory.
    pub async fn handle_created(
        &self,
        snapshot: &UserProfileSnapshot,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let profile = preflight(snapshot, "create")?;
        let user_id = self.add(&profile).await?;
        Ok(ReconcileOutcome::Created { user_id })
    }

    /// Update the user described by `snapshot`, adding it if the directory
    /// does not know it, then apply its derived activation state.
    pub async fn handle_updated(
        &self,
        snapshot: &UserProfileSnapshot,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let profile = preflight(snapshot, "update")?;
        let active = snapshot.status.is_active();
        debug!(email = profile.email, active, status = ?snapshot.status, "updating user");

        match self.find_by_email(profile.email).await {
            Ok(record) => {
                let user_id = self.update(&profile, &record).await?;
                let activation = self
                    .apply_activation(&user_id, active, Some(record.state))
                    .await;
                Ok(ReconcileOutcome::Updated {
                    user_id,
                    activation,
                })
            }
            Err(ReconcileError::UserNotFound { email }) => {
                warn!(email = %email, "user not found in IdP, adding now");
                let user_id = self.add(&profile).await?;
                let activation = self.apply_activation(&user_id, active, None).await;
                Ok(ReconcileOutcome::SelfHealed {
                    user_id,
                    activation,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Deactivate the directory user matching the snapshot's email.
    pub async fn handle_deleted(
        &self,
        snapshot: &UserProfileSnapshot,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let email = snapshot.email().ok_or_else(|| {
            error!(action = "delete", "missing enterprise email, skipping IdP sync");
            ReconcileError::PreflightFailed {
                missing: vec![ProfileField::EnterpriseEmail],
            }
        })?;

        let record = self.find_by_email(email).await.inspect_err(|e| {
            if matches!(e, ReconcileError::UserNotFound { .. }) {
                warn!(email, action = "delete", "user not found in IdP, nothing to deactivate");
            }
        })?;

        if record.state == UserState::Inactive {
            info!(email, user_id = %record.user_id, "user already inactive");
            return Ok(ReconcileOutcome::Deactivated {
                user_id: record.user_id,
            });
        }

        self.idp
            .deactivate_user(&record.user_id)
            .await
            .inspect_err(|e| error!(email, user_id = %record.user_id, error = %e, "failed to deactivate user"))
            .map_err(ReconcileError::adapter("deactivate_user"))?;

        info!(email, user_id = %record.user_id, "deactivated deleted user");
        Ok(ReconcileOutcome::Deactivated {
            user_id: record.user_id,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<IdpUserRecord, ReconcileError> {
        let records = self
            .idp
            .list_users_by_email(email)
            .await
            .inspect_err(|e| error!(email, error = %e, "failed to list users"))
            .map_err(ReconcileError::adapter("list_users_by_email"))?;

        if records.len() > 1 {
            warn!(email, count = records.len(), "several IdP users share a login name, using the first");
        }

        records
            .into_iter()
            .next()
            .ok_or_else(|| ReconcileError::UserNotFound {
                email: email.to_string(),
            })
    }

    async fn add(&self, profile: &PreflightedProfile<'_>) -> Result<IdpUserId, ReconcileError> {
        let user = self.new_human_user(profile);
        let user_id = self
            .idp
            .add_user(&user)
            .await
            .inspect_err(|e| error!(email = profile.email, error = %e, "failed to add user"))
            .map_err(ReconcileError::adapter("add_user"))?;

        info!(email = profile.email, user_id = %user_id, "added user");
        Ok(user_id)
    }

    async fn update(
        &self,
        profile: &PreflightedProfile<'_>,
        record: &IdpUserRecord,
    ) -> Result<IdpUserId, ReconcileError> {
        let update = HumanUserUpdate {
            username: profile.email.to_string(),
            profile: human_profile(profile.en_name),
            email: profile.email.to_string(),
        };

        let user_id = self
            .idp
            .update_user(&record.user_id, &update)
            .await
            .inspect_err(|e| error!(user_id = %record.user_id, error = %e, "failed to update user"))
            .map_err(ReconcileError::adapter("update_user"))?;

        let metadata = avatar_metadata(&profile.snapshot.avatar);
        if !metadata.is_empty() {
            if let Err(e) = self.idp.set_metadata(&user_id, &metadata).await {
                error!(user_id = %user_id, error = %e, "failed to update metadata");
            }
        }

        info!(email = profile.email, user_id = %user_id, "updated user");
        Ok(user_id)
    }

    async fn apply_activation(
        &self,
        user_id: &IdpUserId,
        active: bool,
        known_state: Option<UserState>,
    ) -> Activation {
        let target = if active {
            UserState::Active
        } else {
            UserState::Inactive
        };
        if known_state == Some(target) {
            return Activation {
                active,
                status: ActivationStatus::Unchanged,
            };
        }

        let result = if active {
            self.idp.reactivate_user(user_id).await
        } else {
            info!(user_id = %user_id, "deactivating inactive user");
            self.idp.deactivate_user(user_id).await
        };

        let status = match result {
            Ok(()) => ActivationStatus::Applied,
            Err(e) => {
                warn!(user_id = %user_id, active, error = %e, "could not apply activation state");
                ActivationStatus::Failed
            }
        };
        Activation { active, status }
    }

    fn new_human_user(&self, profile: &PreflightedProfile<'_>) -> NewHumanUser {
        let snapshot = profile.snapshot;
        let idp_links = match (&self.config.idp_link_id, snapshot.union_id.as_deref()) {
            (Some(idp_id), Some(union_id)) if !union_id.is_empty() => vec![IdpLink {
                idp_id: idp_id.clone(),
                user_id: union_id.to_string(),
                user_name: profile.email.to_string(),
            }],
            _ => Vec::new(),
        };

        NewHumanUser {
            username: profile.email.to_string(),
            profile: human_profile(profile.en_name),
            email: profile.email.to_string(),
            phone: snapshot.mobile.clone().filter(|m| !m.is_empty()),
            idp_links,
            metadata: avatar_metadata(&snapshot.avatar),
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn preflight<'a>(
    snapshot: &'a UserProfileSnapshot,
    action: &'static str,
) -> Result<PreflightedProfile<'a>, ReconcileError> {
    snapshot.preflight().map_err(|missing| {
        error!(
            action,
            missing = %format_fields(&missing),
            "missing essential profile fields, skipping IdP sync"
        );
        ReconcileError::PreflightFailed { missing }
    })
}

fn human_profile(en_name: &str) -> HumanProfile {
    let (given_name, family_name) = split_en_name(en_name);
    HumanProfile {
        given_name,
        family_name,
        display_name: en_name.to_string(),
    }
}

fn avatar_metadata(avatar: &AvatarUrls) -> Vec<MetadataEntry> {
    let mut entries = Vec::new();
    if let Some(url) = avatar.origin.as_deref().filter(|u| !u.is_empty()) {
        entries.push(MetadataEntry::new(AVATAR_ORIGIN_KEY, url));
    }
    if let Some(url) = avatar.size_240.as_deref().filter(|u| !u.is_empty()) {
        entries.push(MetadataEntry::new(AVATAR_240_KEY, url));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idp::MemoryDirectory;
    use crate::model::StatusFlags;

    fn reconciler(directory: Arc<MemoryDirectory>) -> Reconciler {
        Reconciler::new(
            directory,
            ReconcilerConfig {
                idp_link_id: Some("idp-feishu".to_string()),
            },
        )
    }

    fn alice() -> UserProfileSnapshot {
        UserProfileSnapshot::new("Alice Liddell", "alice@example.com")
            .with_union_id("on_alice")
            .with_mobile("+8613800000000")
            .with_avatar(AvatarUrls {
                origin: Some("https://cdn.example/a.png".to_string()),
                size_240: Some("https://cdn.example/a_240.png".to_string()),
            })
            .with_status(StatusFlags::active())
    }

    #[test]
    fn test_human_profile_splits_name() {
        let profile = human_profile("Alice Liddell");
        assert_eq!(profile.given_name, "Alice");
        assert_eq!(profile.family_name, "Liddell");
        assert_eq!(profile.display_name, "Alice Liddell");
    }

    #[test]
    fn test_avatar_metadata_skips_missing_urls() {
        let entries = avatar_metadata(&AvatarUrls {
            origin: None,
            size_240: Some("https://cdn.example/240.png".to_string()),
        });
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, AVATAR_240_KEY);
        assert_eq!(entries[0].value, b"https://cdn.example/240.png".to_vec());
    }

    #[test]
    fn test_retryable_classification() {
        let adapter = ReconcileError::Adapter {
            operation: "add_user",
            source: IdpError::Transport {
                operation: "add_user",
                message: "timed out".to_string(),
            },
        };
        assert!(adapter.is_retryable());

        let conflict = ReconcileError::Adapter {
            operation: "add_user",
            source: IdpError::Conflict {
                login_name: "alice@example.com".to_string(),
            },
        };
        assert!(!conflict.is_retryable());

        assert!(!ReconcileError::PreflightFailed { missing: vec![] }.is_retryable());
        assert!(
            !ReconcileError::UserNotFound {
                email: "a@b".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_preflight_error_lists_fields() {
        let err = ReconcileError::PreflightFailed {
            missing: vec![ProfileField::EnName, ProfileField::EnterpriseEmail],
        };
        assert_eq!(
            err.to_string(),
            "profile is missing required fields: en_name, enterprise_email"
        );
    }

    #[tokio::test]
    async fn test_created_adds_user_with_link_phone_and_metadata() {
        let directory = Arc::new(MemoryDirectory::new());
        let outcome = reconciler(directory.clone())
            .handle_created(&alice())
            .await
            .unwrap();

        let user_id = outcome.user_id().unwrap().clone();
        let record = directory.get(&user_id).unwrap();
        assert_eq!(record.login_name, "alice@example.com");
        assert_eq!(record.given_name.as_deref(), Some("Alice"));
        assert_eq!(record.family_name.as_deref(), Some("Liddell"));
        assert_eq!(record.phone.as_deref(), Some("+8613800000000"));
        assert_eq!(
            record.metadata.get(AVATAR_ORIGIN_KEY).map(Vec::as_slice),
            Some(b"https://cdn.example/a.png".as_slice())
        );
    }

    #[tokio::test]
    async fn test_updated_unknown_user_self_heals() {
        let directory = Arc::new(MemoryDirectory::new());
        let outcome = reconciler(directory.clone())
            .handle_updated(&alice())
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::SelfHealed { .. }));
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_then_stale_update_only_toggles() {
        let directory = Arc::new(MemoryDirectory::new());
        let reconciler = reconciler(directory.clone());

        reconciler.handle_created(&alice()).await.unwrap();
        let deleted = reconciler.handle_deleted(&alice()).await.unwrap();
        let user_id = deleted.user_id().unwrap().clone();
        assert_eq!(directory.get(&user_id).unwrap().state, UserState::Inactive);

        let mut stale = alice();
        stale.status = StatusFlags {
            is_resigned: true,
            ..StatusFlags::active()
        };
        let outcome = reconciler.handle_updated(&stale).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Updated {
                user_id: user_id.clone(),
                activation: Activation {
                    active: false,
                    status: ActivationStatus::Unchanged,
                },
            }
        );
        assert_eq!(directory.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_swallows_preflight_failure() {
        let directory = Arc::new(MemoryDirectory::new());
        let snapshot = UserProfileSnapshot {
            en_name: Some("Nameless".to_string()),
            ..Default::default()
        };

        let outcome = reconciler(directory.clone())
            .handle(&LifecycleEvent::created(snapshot))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Skipped {
                missing: vec![ProfileField::EnterpriseEmail]
            }
        );
        assert!(directory.is_empty());
    }
}
