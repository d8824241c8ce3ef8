//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;

use async_trait::async_trait;
use companion_core::idp::{
    HumanUserUpdate, IdpClient, IdpError, IdpUserRecord, MemoryDirectory, MetadataEntry,
    NewHumanUser,
};
use companion_core::messaging::{Messenger, MessagingError};
use companion_core::IdpUserId;
use parking_lot::Mutex;

/// A directory call as seen by [`RecordingDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(String),
    Add(NewHumanUser),
    Update(IdpUserId, HumanUserUpdate),
    SetMetadata(IdpUserId, Vec<MetadataEntry>),
    Deactivate(IdpUserId),
    Reactivate(IdpUserId),
}

/// A [`MemoryDirectory`] that records every call and can be told to fail
/// specific operations.
#[derive(Default)]
pub struct RecordingDirectory {
    pub inner: MemoryDirectory,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl RecordingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = IdpUserRecord>) -> Self {
        Self {
            inner: MemoryDirectory::with_users(users),
            ..Self::default()
        }
    }

    /// Make every later call to `operation` fail with a 500.
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().insert(operation);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn adds(&self) -> Vec<NewHumanUser> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Add(user) => Some(user),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<(), IdpError> {
        self.calls.lock().push(call);
        if self.failing.lock().contains(operation) {
            return Err(IdpError::Api {
                operation,
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IdpClient for RecordingDirectory {
    async fn list_users_by_email(&self, email: &str) -> Result<Vec<IdpUserRecord>, IdpError> {
        self.record("list_users_by_email", Call::List(email.to_string()))?;
        self.inner.list_users_by_email(email).await
    }

    async fn add_user(&self, user: &NewHumanUser) -> Result<IdpUserId, IdpError> {
        self.record("add_user", Call::Add(user.clone()))?;
        self.inner.add_user(user).await
    }

    async fn update_user(
        &self,
        user_id: &IdpUserId,
        update: &HumanUserUpdate,
    ) -> Result<IdpUserId, IdpError> {
        self.record("update_user", Call::Update(user_id.clone(), update.clone()))?;
        self.inner.update_user(user_id, update).await
    }

    async fn set_metadata(
        &self,
        user_id: &IdpUserId,
        entries: &[MetadataEntry],
    ) -> Result<(), IdpError> {
        self.record(
            "set_metadata",
            Call::SetMetadata(user_id.clone(), entries.to_vec()),
        )?;
        self.inner.set_metadata(user_id, entries).await
    }

    async fn deactivate_user(&self, user_id: &IdpUserId) -> Result<(), IdpError> {
        self.record("deactivate_user", Call::Deactivate(user_id.clone()))?;
        self.inner.deactivate_user(user_id).await
    }

    async fn reactivate_user(&self, user_id: &IdpUserId) -> Result<(), IdpError> {
        self.record("reactivate_user", Call::Reactivate(user_id.clone()))?;
        self.inner.reactivate_user(user_id).await
    }
}

/// A sent message as seen by [`RecordingMessenger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub receive_id_type: String,
    pub receive_id: String,
    pub text: String,
}

/// A messenger that records messages instead of sending them.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    fail: bool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    fn actor(&self) -> &str {
        "feishu"
    }

    async fn send_text(
        &self,
        receive_id_type: &str,
        receive_id: &str,
        text: &str,
    ) -> Result<(), MessagingError> {
        self.sent.lock().push(SentMessage {
            receive_id_type: receive_id_type.to_string(),
            receive_id: receive_id.to_string(),
            text: text.to_string(),
        });
        if self.fail {
            return Err(MessagingError::Api {
                code: 230001,
                message: "injected failure".to_string(),
                log_id: None,
            });
        }
        Ok(())
    }
}
