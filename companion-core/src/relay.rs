//! Webhook relay.
//!
//! This module provides:
//! - [`WebhookRoute`] - One configured `{src, actor, dst}` mapping
//! - [`RouteTable`] - Source tag to destination lookup, built once at startup
//! - [`Destination`] - A parsed `idType:id` destination
//! - [`NotificationPayload`] - The notification body posted by the gateway
//! - [`WebhookRelay`] - Renders notifications and forwards them via a [`Messenger`]

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::messaging::{Messenger, MessagingError};

/// Placeholder substituted with the notification values.
pub const VALUE_PLACEHOLDER: &str = "{{value}}";

/// Error type for relaying a notification.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No route is configured for the source tag.
    #[error("no destination configured for source {source_tag}")]
    NotFound { source_tag: String },

    /// The configured destination is malformed.
    #[error("invalid destination {destination:?}: {message}")]
    Configuration {
        destination: String,
        message: String,
    },

    /// The content does not fit the supplied values.
    #[error("invalid template: {message}")]
    InvalidTemplate { message: String },

    /// Sending through the messaging adapter failed.
    #[error("failed to deliver notification: {0}")]
    Messaging(#[from] MessagingError),
}

/// A configured webhook route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRoute {
    /// Opaque source tag, taken from the request path.
    pub src: String,

    /// Messaging adapter that should deliver (e.g. `"feishu"`).
    pub actor: String,

    /// Destination as `idType:id`, e.g. `open_id:ou_123` or `chat_id:oc_456`.
    pub dst: String,
}

/// Immutable source tag to destination mapping.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, String>,
}

impl RouteTable {
    /// Build the table from configured routes, keeping only those addressed
    /// to `actor`.
    ///
    /// Routes for other actors are logged and skipped. A repeated source
    /// tag replaces the earlier destination.
    pub fn from_routes<'a>(routes: impl IntoIterator<Item = &'a WebhookRoute>, actor: &str) -> Self {
        let mut table = HashMap::new();
        for route in routes {
            if route.actor != actor {
                error!(
                    src = %route.src,
                    dst = %route.dst,
                    actor = %route.actor,
                    supported = actor,
                    "webhook route names an unsupported actor, skipping"
                );
                continue;
            }
            if let Some(previous) = table.insert(route.src.clone(), route.dst.clone()) {
                warn!(
                    src = %route.src,
                    previous = %previous,
                    dst = %route.dst,
                    "duplicate webhook source, later route wins"
                );
            }
        }
        Self { routes: table }
    }

    /// Raw destination for a source tag.
    pub fn get(&self, source_tag: &str) -> Option<&str> {
        self.routes.get(source_tag).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A messaging destination split into recipient type and ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub id_type: String,
    pub id: String,
}

impl Destination {
    /// Parse `idType:id`, splitting at the first `:`.
    pub fn parse(destination: &str) -> Result<Self, RelayError> {
        match destination.split_once(':') {
            Some((id_type, id)) if !id_type.is_empty() && !id.is_empty() => Ok(Self {
                id_type: id_type.to_string(),
                id: id.to_string(),
            }),
            _ => Err(RelayError::Configuration {
                destination: destination.to_string(),
                message: "expected receive_id_type:receive_id".to_string(),
            }),
        }
    }
}

/// Notification body posted by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,

    #[serde(default)]
    pub timestamp: i64,
}

/// Render `content`, substituting [`VALUE_PLACEHOLDER`] with `values`.
///
/// Without values the content is returned verbatim. With values the content
/// must contain exactly one placeholder. Strings render verbatim, other JSON
/// values in JSON form, joined by `", "`.
pub fn render_content(content: &str, values: Option<&[Value]>) -> Result<String, RelayError> {
    let values = match values {
        Some(values) if !values.is_empty() => values,
        _ => return Ok(content.to_string()),
    };

    let placeholders = content.matches(VALUE_PLACEHOLDER).count();
    if placeholders != 1 {
        return Err(RelayError::InvalidTemplate {
            message: format!(
                "content must contain exactly one {} placeholder, found {}",
                VALUE_PLACEHOLDER, placeholders
            ),
        });
    }

    let rendered = values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");

    Ok(content.replacen(VALUE_PLACEHOLDER, &rendered, 1))
}

/// Wrap rendered content in the delivery envelope.
pub fn envelope(caller: &str, source_tag: &str, title: &str, content: &str) -> String {
    format!(
        "Received: from {}\nFrom: {}\nSubject: {}\n\n{}",
        caller, source_tag, title, content
    )
}

/// Forwards gateway notifications to configured destinations.
#[derive(Clone)]
pub struct WebhookRelay {
    messenger: Arc<dyn Messenger>,
    routes: Arc<RouteTable>,
}

impl WebhookRelay {
    pub fn new(messenger: Arc<dyn Messenger>, routes: RouteTable) -> Self {
        Self {
            messenger,
            routes: Arc::new(routes),
        }
    }

    /// Build the route table from configured routes for this messenger's actor.
    pub fn from_routes<'a>(
        messenger: Arc<dyn Messenger>,
        routes: impl IntoIterator<Item = &'a WebhookRoute>,
    ) -> Self {
        let table = RouteTable::from_routes(routes, messenger.actor());
        Self::new(messenger, table)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Render and deliver one notification from `source_tag`.
    ///
    /// `caller` is the remote address of the poster and appears in the
    /// envelope.
    pub async fn handle_notification(
        &self,
        source_tag: &str,
        caller: &str,
        payload: &NotificationPayload,
    ) -> Result<(), RelayError> {
        let dst = self
            .routes
            .get(source_tag)
            .ok_or_else(|| RelayError::NotFound {
                source_tag: source_tag.to_string(),
            })?;
        let destination = Destination::parse(dst).inspect_err(|_| {
            error!(src = source_tag, dst, "incorrect dst, missing receive_id_type or receive_id");
        })?;

        info!(
            src = source_tag,
            dst,
            kind = %payload.kind,
            title = %payload.title,
            timestamp = payload.timestamp,
            "received webhook notification"
        );

        let content = render_content(&payload.content, payload.values.as_deref())?;
        let text = envelope(caller, source_tag, &payload.title, &content);

        self.messenger
            .send_text(&destination.id_type, &destination.id, &text)
            .await
            .inspect_err(|e| error!(src = source_tag, dst, error = %e, "failed to deliver notification"))?;

        Ok(())
    }
}

impl std::fmt::Debug for WebhookRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookRelay")
            .field("actor", &self.messenger.actor())
            .field("routes", &self.routes.len())
            .finish()
    }
}
