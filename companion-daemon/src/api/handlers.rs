//! HTTP handlers for the daemon.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use companion_core::idp::{IdpClient, MemoryDirectory, ZitadelClient};
use companion_core::messaging::{FeishuMessenger, LogMessenger, Messenger};
use companion_core::store::{MemoryTokenStore, SqliteTokenStore, TokenStore};
use companion_core::{
    Callback, NotificationPayload, Reconciler, ReconcilerConfig, Secret, TokenIssuer,
    WebhookRelay, decode_callback,
};
use tracing::{debug, error, info, warn};

use super::error::{ApiError, ApiResult};
use super::types::{ChallengeResponse, EnsureTokenRequest, EnsureTokenResponse};
use crate::config::CompanionConfig;

/// State shared across HTTP handlers.
#[derive(Clone)]
pub struct ApiState {
    pub reconciler: Reconciler,
    pub issuer: TokenIssuer,
    pub relay: WebhookRelay,
    /// Expected Feishu callback verification token, if any.
    pub verification_token: Option<Secret>,
}

impl ApiState {
    /// Create API state from already-built components.
    pub fn new(reconciler: Reconciler, issuer: TokenIssuer, relay: WebhookRelay) -> Self {
        Self {
            reconciler,
            issuer,
            relay,
            verification_token: None,
        }
    }

    pub fn with_verification_token(mut self, token: Option<Secret>) -> Self {
        self.verification_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Build adapters and components from configuration.
    ///
    /// Sections that are absent fall back to in-memory adapters.
    pub async fn from_config(config: &CompanionConfig) -> Result<Self> {
        let timeout = config.http.timeout();

        let idp: Arc<dyn IdpClient> = match &config.zitadel {
            Some(zitadel) => {
                info!(domain = %zitadel.domain, "using ZITADEL directory");
                Arc::new(
                    ZitadelClient::new(&zitadel.domain, zitadel.pat.clone(), timeout)
                        .context("Failed to create ZITADEL client")?,
                )
            }
            None => {
                warn!("no [zitadel] section, using an in-memory directory");
                Arc::new(MemoryDirectory::new())
            }
        };

        let messenger: Arc<dyn Messenger> = match &config.feishu {
            Some(feishu) => {
                info!(app_id = %feishu.app_id, base_url = %feishu.base_url, "using Feishu messenger");
                Arc::new(
                    FeishuMessenger::new(
                        &feishu.base_url,
                        feishu.app_id.clone(),
                        feishu.app_secret.clone(),
                        timeout,
                    )
                    .context("Failed to create Feishu messenger")?,
                )
            }
            None => {
                warn!("no [feishu] section, notifications will only be logged");
                Arc::new(LogMessenger::new("feishu"))
            }
        };

        let store: Arc<dyn TokenStore> = match &config.newapi.db_path {
            Some(path) => {
                info!(path = %path.display(), "using new-api database");
                Arc::new(
                    SqliteTokenStore::connect(path)
                        .await
                        .with_context(|| format!("Failed to open new-api database {:?}", path))?,
                )
            }
            None => {
                warn!("no newapi.db_path, using an in-memory token store");
                Arc::new(MemoryTokenStore::new())
            }
        };

        let reconciler = Reconciler::new(
            idp,
            ReconcilerConfig {
                idp_link_id: config
                    .zitadel
                    .as_ref()
                    .and_then(|z| z.feishu_idp_id.clone())
                    .filter(|id| !id.is_empty()),
            },
        );
        let issuer = TokenIssuer::new(store);
        let relay = WebhookRelay::from_routes(messenger, &config.newapi.webhooks);
        info!(routes = relay.routes().len(), "webhook routes loaded");

        let verification_token = config
            .feishu
            .as_ref()
            .and_then(|f| f.verification_token.clone());

        Ok(Self::new(reconciler, issuer, relay).with_verification_token(verification_token))
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("reconciler", &self.reconciler)
            .field("relay", &self.relay)
            .field("verification_token", &self.verification_token)
            .finish_non_exhaustive()
    }
}

/// Remote address of the caller.
///
/// Prefers `X-Real-IP`, then the first `X-Forwarded-For` entry, then the
/// peer address of the connection.
#[derive(Debug, Clone)]
pub struct CallerAddr(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CallerAddr {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let addr = header("x-real-ip")
            .or_else(|| {
                header("x-forwarded-for")
                    .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            })
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self(addr))
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// `POST /ensure_token`
pub async fn ensure_token(
    State(state): State<ApiState>,
    body: Result<Json<EnsureTokenRequest>, JsonRejection>,
) -> ApiResult<Json<EnsureTokenResponse>> {
    let request = json_body(body)?;
    debug!(subject = %request.oidc_user_id, token_name = %request.token_name, "ensure token");

    let issued = state
        .issuer
        .ensure_token(&request.oidc_user_id, &request.token_name, &request.token_group)
        .await?;

    Ok(Json(EnsureTokenResponse {
        token_id: issued.token_id,
        token: issued.token.into_inner(),
    }))
}

/// `POST /notification/{source}`
pub async fn notification(
    State(state): State<ApiState>,
    Path(source): Path<String>,
    CallerAddr(caller): CallerAddr,
    body: Result<Json<NotificationPayload>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let payload = json_body(body)?;

    state
        .relay
        .handle_notification(&source, &caller, &payload)
        .await?;

    Ok(StatusCode::OK)
}

/// `POST /feishu/events`
pub async fn feishu_events(State(state): State<ApiState>, body: Bytes) -> ApiResult<Response> {
    let callback = decode_callback(&body)?;
    callback.verify(state.verification_token.as_ref().map(Secret::expose))?;

    match callback {
        Callback::UrlVerification { challenge, .. } => {
            info!("answering Feishu URL verification");
            Ok(Json(ChallengeResponse { challenge }).into_response())
        }
        Callback::Ignored { event_type, .. } => {
            debug!(event_type = %event_type, "ignoring Feishu event");
            Ok(StatusCode::OK.into_response())
        }
        Callback::Lifecycle { event, .. } => match state.reconciler.handle(&event).await {
            Ok(outcome) => Ok(Json(outcome).into_response()),
            Err(e) if e.is_retryable() => Err(e.into()),
            Err(e) => {
                error!(
                    kind = %event.kind,
                    event_id = event.event_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "lifecycle event failed permanently, acknowledging"
                );
                Ok(StatusCode::OK.into_response())
            }
        },
    }
}
