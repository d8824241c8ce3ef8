//! In-memory directory implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    HumanUserUpdate, IdpClient, IdpError, IdpUserRecord, MetadataEntry, NewHumanUser, UserState,
};
use crate::model::IdpUserId;

/// In-memory directory for development and tests.
///
/// Login names are unique, like in a real directory. Activation toggles are
/// idempotent. Data is lost when the process exits.
pub struct MemoryDirectory {
    users: RwLock<BTreeMap<IdpUserId, IdpUserRecord>>,
    next_id: AtomicU64,
}

impl MemoryDirectory {
    /// Create a new empty directory.
    pub fn new() -> Self {
        Self {
            users: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a directory seeded with existing records.
    pub fn with_users(users: impl IntoIterator<Item = IdpUserRecord>) -> Self {
        let directory = Self::new();
        {
            let mut map = directory.users.write();
            for user in users {
                map.insert(user.user_id.clone(), user);
            }
        }
        directory
    }

    /// Get a record by ID.
    pub fn get(&self, user_id: &IdpUserId) -> Option<IdpUserRecord> {
        self.users.read().get(user_id).cloned()
    }

    /// Number of records, active or not.
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_state(&self, user_id: &IdpUserId, state: UserState) -> Result<(), IdpError> {
        let mut users = self.users.write();
        let user = users.get_mut(user_id).ok_or_else(|| IdpError::UserNotFound {
            user_id: user_id.to_string(),
        })?;
        user.state = state;
        Ok(())
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDirectory")
            .field("users_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl IdpClient for MemoryDirectory {
    async fn list_users_by_email(&self, email: &str) -> Result<Vec<IdpUserRecord>, IdpError> {
        Ok(self
            .users
            .read()
            .values()
            .filter(|u| u.login_name == email)
            .cloned()
            .collect())
    }

    async fn add_user(&self, user: &NewHumanUser) -> Result<IdpUserId, IdpError> {
        let mut users = self.users.write();
        if users.values().any(|u| u.login_name == user.username) {
            return Err(IdpError::Conflict {
                login_name: user.username.clone(),
            });
        }

        let user_id = IdpUserId::new(format!(
            "mem-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));
        let record = IdpUserRecord {
            user_id: user_id.clone(),
            login_name: user.username.clone(),
            display_name: Some(user.profile.display_name.clone()),
            given_name: Some(user.profile.given_name.clone()),
            family_name: Some(user.profile.family_name.clone()),
            phone: user.phone.clone(),
            state: UserState::Active,
            metadata: user
                .metadata
                .iter()
                .map(|m| (m.key.clone(), m.value.clone()))
                .collect(),
        };
        users.insert(user_id.clone(), record);

        Ok(user_id)
    }

    async fn update_user(
        &self,
        user_id: &IdpUserId,
        update: &HumanUserUpdate,
    ) -> Result<IdpUserId, IdpError> {
        let mut users = self.users.write();
        if users
            .values()
            .any(|u| &u.user_id != user_id && u.login_name == update.username)
        {
            return Err(IdpError::Conflict {
                login_name: update.username.clone(),
            });
        }

        let user = users.get_mut(user_id).ok_or_else(|| IdpError::UserNotFound {
            user_id: user_id.to_string(),
        })?;
        user.login_name = update.username.clone();
        user.display_name = Some(update.profile.display_name.clone());
        user.given_name = Some(update.profile.given_name.clone());
        user.family_name = Some(update.profile.family_name.clone());

        Ok(user_id.clone())
    }

    async fn set_metadata(
        &self,
        user_id: &IdpUserId,
        entries: &[MetadataEntry],
    ) -> Result<(), IdpError> {
        let mut users = self.users.write();
        let user = users.get_mut(user_id).ok_or_else(|| IdpError::UserNotFound {
            user_id: user_id.to_string(),
        })?;
        for entry in entries {
            user.metadata.insert(entry.key.clone(), entry.value.clone());
        }
        Ok(())
    }

    async fn deactivate_user(&self, user_id: &IdpUserId) -> Result<(), IdpError> {
        self.set_state(user_id, UserState::Inactive)
    }

    async fn reactivate_user(&self, user_id: &IdpUserId) -> Result<(), IdpError> {
        self.set_state(user_id, UserState::Active)
    }
}
