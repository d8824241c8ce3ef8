//! Shared fixtures for daemon tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use companion_core::idp::{
    HumanUserUpdate, IdpClient, IdpError, IdpUserRecord, MetadataEntry, NewHumanUser,
};
use companion_core::messaging::{Messenger, MessagingError};
use companion_core::{
    IdpUserId, MemoryDirectory, MemoryTokenStore, Reconciler, ReconcilerConfig, Secret,
    TokenIssuer, WebhookRelay, WebhookRoute,
};
use companion_daemon::ApiState;

/// A messenger that keeps sent texts in memory.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
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
        self.sent.lock().unwrap().push((
            receive_id_type.to_string(),
            receive_id.to_string(),
            text.to_string(),
        ));
        Ok(())
    }
}

/// A directory whose every call fails in transport.
pub struct UnreachableDirectory;

fn unreachable(operation: &'static str) -> IdpError {
    IdpError::Transport {
        operation,
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl IdpClient for UnreachableDirectory {
    async fn list_users_by_email(&self, _email: &str) -> Result<Vec<IdpUserRecord>, IdpError> {
        Err(unreachable("list_users_by_email"))
    }

    async fn add_user(&self, _user: &NewHumanUser) -> Result<IdpUserId, IdpError> {
        Err(unreachable("add_user"))
    }

    async fn update_user(
        &self,
        _user_id: &IdpUserId,
        _update: &HumanUserUpdate,
    ) -> Result<IdpUserId, IdpError> {
        Err(unreachable("update_user"))
    }

    async fn set_metadata(
        &self,
        _user_id: &IdpUserId,
        _entries: &[MetadataEntry],
    ) -> Result<(), IdpError> {
        Err(unreachable("set_metadata"))
    }

    async fn deactivate_user(&self, _user_id: &IdpUserId) -> Result<(), IdpError> {
        Err(unreachable("deactivate_user"))
    }

    async fn reactivate_user(&self, _user_id: &IdpUserId) -> Result<(), IdpError> {
        Err(unreachable("reactivate_user"))
    }
}

/// Handles to the in-memory adapters behind a test [`ApiState`].
pub struct TestHarness {
    pub state: ApiState,
    pub directory: Arc<MemoryDirectory>,
    pub store: Arc<MemoryTokenStore>,
    pub messenger: Arc<RecordingMessenger>,
}

pub fn routes() -> Vec<WebhookRoute> {
    vec![
        WebhookRoute {
            src: "default".to_string(),
            actor: "feishu".to_string(),
            dst: "open_id:ou_admin".to_string(),
        },
        WebhookRoute {
            src: "broken".to_string(),
            actor: "feishu".to_string(),
            dst: "no-separator".to_string(),
        },
    ]
}

pub fn harness() -> TestHarness {
    let directory = Arc::new(MemoryDirectory::new());
    let store = Arc::new(MemoryTokenStore::new());
    let messenger = Arc::new(RecordingMessenger::default());

    let reconciler = Reconciler::new(
        directory.clone(),
        ReconcilerConfig {
            idp_link_id: Some("idp-feishu".to_string()),
        },
    );
    let issuer = TokenIssuer::new(store.clone());
    let relay = WebhookRelay::from_routes(messenger.clone(), &routes());

    TestHarness {
        state: ApiState::new(reconciler, issuer, relay),
        directory,
        store,
        messenger,
    }
}

pub fn harness_with_token(token: &str) -> TestHarness {
    let mut harness = harness();
    harness.state = harness
        .state
        .with_verification_token(Some(Secret::new(token)));
    harness
}

pub fn unreachable_state() -> ApiState {
    let harness = harness();
    ApiState {
        reconciler: Reconciler::new(Arc::new(UnreachableDirectory), ReconcilerConfig::default()),
        ..harness.state
    }
}

/// A `contact.user.*_v3` callback body for `email`.
pub fn lifecycle_body(event_type: &str, email: &str, activated: bool, token: &str) -> String {
    serde_json::json!({
        "schema": "2.0",
        "header": {
            "event_id": "ev-1",
            "token": token,
            "event_type": event_type,
        },
        "event": {
            "object": {
                "open_id": "ou_1",
                "union_id": "on_1",
                "en_name": "Alice Liddell",
                "enterprise_email": email,
                "mobile": "+8613800000000",
                "status": {
                    "is_activated": activated,
                    "is_exited": false,
                    "is_frozen": false,
                    "is_resigned": false,
                    "is_unjoin": false
                }
            }
        }
    })
    .to_string()
}
