//! Decoding of Feishu event callbacks.
//!
//! Feishu posts schema 2.0 JSON envelopes to the event callback URL. This
//! module turns the plaintext form of those envelopes into a [`Callback`]:
//! a URL verification challenge, a user [`LifecycleEvent`], or an event the
//! companion does not handle.
//!
//! Encrypted callbacks (an `encrypt` field) are rejected; configure the app
//! without an encrypt key.

use serde::Deserialize;
use thiserror::Error;

use crate::model::{AvatarUrls, LifecycleEvent, LifecycleKind, StatusFlags, UserProfileSnapshot};

pub const USER_CREATED_EVENT: &str = "contact.user.created_v3";
pub const USER_UPDATED_EVENT: &str = "contact.user.updated_v3";
pub const USER_DELETED_EVENT: &str = "contact.user.deleted_v3";

/// Error type for callback decoding.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    /// The body was not valid JSON of the expected shape.
    #[error("malformed callback body: {message}")]
    Malformed { message: String },

    /// The body was encrypted.
    #[error("encrypted callbacks are not supported")]
    Encrypted,

    /// A required field was absent.
    #[error("callback is missing {field}")]
    MissingField { field: &'static str },

    /// The verification token did not match the configured one.
    #[error("verification token mismatch")]
    TokenMismatch,
}

/// A decoded callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    /// Feishu checks the callback URL by asking for the challenge back.
    UrlVerification {
        challenge: String,
        token: Option<String>,
    },

    /// A user lifecycle event.
    Lifecycle {
        event: LifecycleEvent,
        token: Option<String>,
    },

    /// Any other event type.
    Ignored {
        event_type: String,
        token: Option<String>,
    },
}

impl Callback {
    /// The verification token carried by the callback.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::UrlVerification { token, .. }
            | Self::Lifecycle { token, .. }
            | Self::Ignored { token, .. } => token.as_deref(),
        }
    }

    /// Check the carried token against `expected`.
    ///
    /// Passes when no token is expected.
    pub fn verify(&self, expected: Option<&str>) -> Result<(), EventDecodeError> {
        match expected.filter(|t| !t.is_empty()) {
            Some(expected) if self.token() != Some(expected) => Err(EventDecodeError::TokenMismatch),
            _ => Ok(()),
        }
    }
}

#[derive(Deserialize)]
struct RawCallback {
    #[serde(rename = "type")]
    kind: Option<String>,
    challenge: Option<String>,
    token: Option<String>,
    encrypt: Option<String>,
    header: Option<RawHeader>,
    event: Option<RawEvent>,
}

#[derive(Deserialize)]
struct RawHeader {
    event_id: Option<String>,
    event_type: Option<String>,
    token: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    object: Option<RawUser>,
}

#[derive(Deserialize)]
struct RawUser {
    open_id: Option<String>,
    union_id: Option<String>,
    en_name: Option<String>,
    enterprise_email: Option<String>,
    mobile: Option<String>,
    avatar: Option<RawAvatar>,
    #[serde(default)]
    status: StatusFlags,
}

#[derive(Deserialize)]
struct RawAvatar {
    avatar_origin: Option<String>,
    avatar_240: Option<String>,
}

impl From<RawUser> for UserProfileSnapshot {
    fn from(raw: RawUser) -> Self {
        let avatar = raw
            .avatar
            .map(|a| AvatarUrls {
                origin: a.avatar_origin,
                size_240: a.avatar_240,
            })
            .unwrap_or_default();

        UserProfileSnapshot {
            external_subject_id: raw.open_id,
            union_id: raw.union_id,
            en_name: raw.en_name,
            enterprise_email: raw.enterprise_email,
            mobile: raw.mobile,
            avatar,
            status: raw.status,
        }
    }
}

fn lifecycle_kind(event_type: &str) -> Option<LifecycleKind> {
    match event_type {
        USER_CREATED_EVENT => Some(LifecycleKind::Created),
        USER_UPDATED_EVENT => Some(LifecycleKind::Updated),
        USER_DELETED_EVENT => Some(LifecycleKind::Deleted),
        _ => None,
    }
}

/// Decode a plaintext callback body.
pub fn decode_callback(body: &[u8]) -> Result<Callback, EventDecodeError> {
    let raw: RawCallback =
        serde_json::from_slice(body).map_err(|e| EventDecodeError::Malformed {
            message: e.to_string(),
        })?;

    if raw.encrypt.is_some() {
        return Err(EventDecodeError::Encrypted);
    }

    if raw.kind.as_deref() == Some("url_verification") {
        let challenge = raw
            .challenge
            .ok_or(EventDecodeError::MissingField { field: "challenge" })?;
        return Ok(Callback::UrlVerification {
            challenge,
            token: raw.token,
        });
    }

    let header = raw
        .header
        .ok_or(EventDecodeError::MissingField { field: "header" })?;
    let event_type = header
        .event_type
        .ok_or(EventDecodeError::MissingField {
            field: "header.event_type",
        })?;
    let token = header.token;

    let Some(kind) = lifecycle_kind(&event_type) else {
        return Ok(Callback::Ignored { event_type, token });
    };

    let object = raw
        .event
        .and_then(|e| e.object)
        .ok_or(EventDecodeError::MissingField {
            field: "event.object",
        })?;

    let mut event = LifecycleEvent::new(kind, object.into());
    if let Some(event_id) = header.event_id {
        event = event.with_event_id(event_id);
    }

    Ok(Callback::Lifecycle { event, token })
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPDATED: &str = r#"{
        "schema": "2.0",
        "header": {
            "event_id": "ev-1",
            "token": "vt",
            "create_time": "1700000000000",
            "event_type": "contact.user.updated_v3",
            "tenant_key": "tk",
            "app_id": "cli_a"
        },
        "event": {
            "object": {
                "open_id": "ou_1",
                "union_id": "on_1",
                "name": "爱丽丝",
                "en_name": "Alice Liddell",
                "enterprise_email": "alice@example.com",
                "mobile": "+8613800000000",
                "avatar": {
                    "avatar_72": "https://cdn.example/72.png",
                    "avatar_240": "https://cdn.example/240.png",
                    "avatar_origin": "https://cdn.example/o.png"
                },
                "status": {
                    "is_frozen": false,
                    "is_resigned": false,
                    "is_activated": true,
                    "is_exited": false,
                    "is_unjoin": false
                }
            },
            "old_object": {"en_name": "Alice"}
        }
    }"#;

    #[test]
    fn test_decode_updated_event() {
        let callback = decode_callback(UPDATED.as_bytes()).unwrap();
        let Callback::Lifecycle { event, token } = callback else {
            panic!("expected lifecycle callback");
        };

        assert_eq!(token.as_deref(), Some("vt"));
        assert_eq!(event.kind, LifecycleKind::Updated);
        assert_eq!(event.event_id.as_deref(), Some("ev-1"));
        assert_eq!(event.snapshot.external_subject_id.as_deref(), Some("ou_1"));
        assert_eq!(event.snapshot.email(), Some("alice@example.com"));
        assert_eq!(
            event.snapshot.avatar.size_240.as_deref(),
            Some("https://cdn.example/240.png")
        );
        assert!(event.snapshot.status.is_active());
    }

    #[test]
    fn test_decode_missing_status_defaults_to_inactive() {
        let body = r#"{"header":{"event_type":"contact.user.deleted_v3"},"event":{"object":{"enterprise_email":"a@b.c"}}}"#;
        let Callback::Lifecycle { event, .. } = decode_callback(body.as_bytes()).unwrap() else {
            panic!("expected lifecycle callback");
        };
        assert_eq!(event.kind, LifecycleKind::Deleted);
        assert!(!event.snapshot.status.is_active());
    }

    #[test]
    fn test_decode_url_verification() {
        let body = r#"{"challenge":"c-123","token":"vt","type":"url_verification"}"#;
        assert_eq!(
            decode_callback(body.as_bytes()).unwrap(),
            Callback::UrlVerification {
                challenge: "c-123".to_string(),
                token: Some("vt".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_other_event_is_ignored() {
        let body = r#"{"header":{"event_type":"im.message.receive_v1"},"event":{}}"#;
        assert!(matches!(
            decode_callback(body.as_bytes()).unwrap(),
            Callback::Ignored { ref event_type, .. } if event_type == "im.message.receive_v1"
        ));
    }

    #[test]
    fn test_decode_rejects_encrypted() {
        let body = r#"{"encrypt":"abcdef"}"#;
        assert!(matches!(
            decode_callback(body.as_bytes()),
            Err(EventDecodeError::Encrypted)
        ));
    }

    #[test]
    fn test_verify_token() {
        let callback = decode_callback(UPDATED.as_bytes()).unwrap();
        assert!(callback.verify(None).is_ok());
        assert!(callback.verify(Some("")).is_ok());
        assert!(callback.verify(Some("vt")).is_ok());
        assert!(matches!(
            callback.verify(Some("other")),
            Err(EventDecodeError::TokenMismatch)
        ));
    }
}
