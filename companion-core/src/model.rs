//! Domain model types for the companion.
//!
//! This module defines the core types used throughout the companion:
//! - [`UserProfileSnapshot`] - A user's profile as carried by one lifecycle event
//! - [`StatusFlags`] - The IM-side status flags and the derived activation
//! - [`LifecycleEvent`] - A created/updated/deleted notification
//! - [`IdpUserId`] - Identifier of a record in the IdP directory
//! - [`split_en_name`] - Given/family name derivation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a user record in the IdP directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdpUserId(String);

impl IdpUserId {
    /// Create a new IdP user ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the user ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdpUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IdpUserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for IdpUserId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Status flags reported by the IM provider for a user.
///
/// Flags absent from an event are treated as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    #[serde(default)]
    pub is_activated: bool,
    #[serde(default)]
    pub is_exited: bool,
    #[serde(default)]
    pub is_frozen: bool,
    #[serde(default)]
    pub is_resigned: bool,
    #[serde(default)]
    pub is_unjoin: bool,
}

impl StatusFlags {
    /// Flags of a regular, activated member.
    pub fn active() -> Self {
        Self {
            is_activated: true,
            ..Self::default()
        }
    }

    /// Derived activation: activated and none of the negative flags set.
    pub fn is_active(&self) -> bool {
        self.is_activated
            && !(self.is_exited || self.is_frozen || self.is_resigned || self.is_unjoin)
    }
}

/// Avatar URLs carried by a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarUrls {
    /// Original-size avatar.
    pub origin: Option<String>,

    /// 240x240 avatar.
    pub size_240: Option<String>,
}

impl AvatarUrls {
    pub fn is_empty(&self) -> bool {
        self.origin.is_none() && self.size_240.is_none()
    }
}

/// A mandatory profile field that preflight checks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    EnName,
    EnterpriseEmail,
}

impl ProfileField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnName => "en_name",
            Self::EnterpriseEmail => "enterprise_email",
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's profile as carried by a single lifecycle event.
///
/// Every field may be absent upstream; nothing here is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfileSnapshot {
    /// Provider-scoped subject identifier (`open_id`).
    pub external_subject_id: Option<String>,

    /// Tenant-wide identifier used to link the IdP account to the IM provider.
    pub union_id: Option<String>,

    /// Latin-script display name, split into given/family name.
    pub en_name: Option<String>,

    /// Enterprise mailbox, used as the IdP login name.
    pub enterprise_email: Option<String>,

    pub mobile: Option<String>,

    #[serde(default)]
    pub avatar: AvatarUrls,

    #[serde(default)]
    pub status: StatusFlags,
}

/// View of a snapshot whose mandatory fields are known to be present.
#[derive(Debug, Clone, Copy)]
pub struct PreflightedProfile<'a> {
    pub en_name: &'a str,
    pub email: &'a str,
    pub snapshot: &'a UserProfileSnapshot,
}

impl UserProfileSnapshot {
    /// Create a snapshot with the two mandatory fields set.
    pub fn new(en_name: impl Into<String>, enterprise_email: impl Into<String>) -> Self {
        Self {
            en_name: Some(en_name.into()),
            enterprise_email: Some(enterprise_email.into()),
            ..Self::default()
        }
    }

    pub fn with_union_id(mut self, union_id: impl Into<String>) -> Self {
        self.union_id = Some(union_id.into());
        self
    }

    pub fn with_subject_id(mut self, subject_id: impl Into<String>) -> Self {
        self.external_subject_id = Some(subject_id.into());
        self
    }

    pub fn with_mobile(mut self, mobile: impl Into<String>) -> Self {
        self.mobile = Some(mobile.into());
        self
    }

    pub fn with_avatar(mut self, avatar: AvatarUrls) -> Self {
        self.avatar = avatar;
        self
    }

    pub fn with_status(mut self, status: StatusFlags) -> Self {
        self.status = status;
        self
    }

    /// The enterprise email if present and non-blank.
    pub fn email(&self) -> Option<&str> {
        non_blank(self.enterprise_email.as_deref())
    }

    /// Check that the fields required for an add or update are present.
    ///
    /// Blank strings count as missing. On failure every missing field is
    /// reported, in declaration order.
    pub fn preflight(&self) -> Result<PreflightedProfile<'_>, Vec<ProfileField>> {
        match (non_blank(self.en_name.as_deref()), self.email()) {
            (Some(en_name), Some(email)) => Ok(PreflightedProfile {
                en_name,
                email,
                snapshot: self,
            }),
            (en_name, email) => {
                let mut missing = Vec::new();
                if en_name.is_none() {
                    missing.push(ProfileField::EnName);
                }
                if email.is_none() {
                    missing.push(ProfileField::EnterpriseEmail);
                }
                Err(missing)
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Kind of a user lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Created,
    Updated,
    Deleted,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user lifecycle notification from the IM provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,

    pub snapshot: UserProfileSnapshot,

    /// Upstream event identifier, kept for log correlation only.
    pub event_id: Option<String>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, snapshot: UserProfileSnapshot) -> Self {
        Self {
            kind,
            snapshot,
            event_id: None,
        }
    }

    pub fn created(snapshot: UserProfileSnapshot) -> Self {
        Self::new(LifecycleKind::Created, snapshot)
    }

    pub fn updated(snapshot: UserProfileSnapshot) -> Self {
        Self::new(LifecycleKind::Updated, snapshot)
    }

    pub fn deleted(snapshot: UserProfileSnapshot) -> Self {
        Self::new(LifecycleKind::Deleted, snapshot)
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

/// Split an English name into `(given_name, family_name)` at the first space.
///
/// A name without a space yields an empty family name and logs a warning.
pub fn split_en_name(en_name: &str) -> (String, String) {
    let en_name = en_name.trim();
    match en_name.split_once(char::is_whitespace) {
        Some((given, family)) => (given.to_string(), family.trim_start().to_string()),
        None => {
            tracing::warn!(en_name, "user does not seem to have a family name");
            (en_name.to_string(), String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_en_name_two_parts() {
        assert_eq!(
            split_en_name("John Smith"),
            ("John".to_string(), "Smith".to_string())
        );
    }

    #[test]
    fn test_split_en_name_keeps_remainder_as_family_name() {
        assert_eq!(
            split_en_name("Mary Jane Watson"),
            ("Mary".to_string(), "Jane Watson".to_string())
        );
    }

    #[test]
    fn test_split_en_name_ignores_surrounding_whitespace() {
        assert_eq!(
            split_en_name(" Bob  Stone "),
            ("Bob".to_string(), "Stone".to_string())
        );
    }

    #[test]
    fn test_split_en_name_single_token() {
        assert_eq!(
            split_en_name("Madonna"),
            ("Madonna".to_string(), String::new())
        );
    }

    #[test]
    fn test_idp_user_ids_order_by_value() {
        let mut ids = vec![IdpUserId::new("b"), IdpUserId::new("a")];
        ids.sort();
        assert_eq!(ids, vec![IdpUserId::new("a"), IdpUserId::new("b")]);
    }

    #[test]
    fn test_status_flags_active() {
        assert!(StatusFlags::active().is_active());
        assert!(!StatusFlags::default().is_active());
    }

    #[test]
    fn test_status_flags_any_negative_flag_deactivates() {
        let negatives: [fn(&mut StatusFlags); 4] = [
            |s| s.is_exited = true,
            |s| s.is_frozen = true,
            |s| s.is_resigned = true,
            |s| s.is_unjoin = true,
        ];

        for set in negatives {
            let mut flags = StatusFlags::active();
            set(&mut flags);
            assert!(!flags.is_active(), "{:?} should be inactive", flags);
        }
    }

    #[test]
    fn test_preflight_requires_both_fields() {
        let snapshot = UserProfileSnapshot::default();
        assert_eq!(
            snapshot.preflight().unwrap_err(),
            vec![ProfileField::EnName, ProfileField::EnterpriseEmail]
        );

        let snapshot = UserProfileSnapshot {
            en_name: Some("John Smith".into()),
            ..Default::default()
        };
        assert_eq!(
            snapshot.preflight().unwrap_err(),
            vec![ProfileField::EnterpriseEmail]
        );
    }

    #[test]
    fn test_preflight_treats_blank_as_missing() {
        let snapshot = UserProfileSnapshot::new("   ", "john@example.com");
        assert_eq!(snapshot.preflight().unwrap_err(), vec![ProfileField::EnName]);
    }

    #[test]
    fn test_preflight_success() {
        let snapshot = UserProfileSnapshot::new("John Smith", "john@example.com");
        let profile = snapshot.preflight().unwrap();
        assert_eq!(profile.en_name, "John Smith");
        assert_eq!(profile.email, "john@example.com");
    }
}
