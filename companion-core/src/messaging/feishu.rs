//! Feishu/Lark IM implementation of [`Messenger`].
//!
//! Messages are sent as the app (tenant) identity. The tenant access token is
//! cached and refreshed shortly before it expires.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::{Messenger, MessagingError};
use crate::secret::Secret;

/// Default API origin for Feishu (China). Lark uses `https://open.larksuite.com`.
pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn";

/// Refresh the tenant token this long before it expires.
const TOKEN_EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Response codes meaning the tenant token was rejected.
const INVALID_TOKEN_CODES: [i64; 2] = [99991661, 99991663];

#[derive(Clone)]
struct CachedToken {
    value: Secret,
    expires_at: DateTime<Utc>,
}

/// Feishu-backed messenger.
pub struct FeishuMessenger {
    base_url: Url,
    app_id: String,
    app_secret: Secret,
    http: Client,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Serialize)]
struct TenantTokenRequest<'a> {
    app_id: &'a str,
    app_secret: &'a str,
}

#[derive(Deserialize)]
struct TenantTokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
    #[serde(default)]
    expire: i64,
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    receive_id: &'a str,
    msg_type: &'static str,
    content: String,
}

#[derive(Serialize)]
struct TextContent<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: String,
}

impl FeishuMessenger {
    /// Create a messenger for the given app credentials.
    pub fn new(
        base_url: &str,
        app_id: impl Into<String>,
        app_secret: Secret,
        timeout: std::time::Duration,
    ) -> Result<Self, MessagingError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("auth-companion/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MessagingError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Self::with_http_client(base_url, app_id, app_secret, http)
    }

    /// Create a messenger with a pre-built `reqwest::Client`.
    pub fn with_http_client(
        base_url: &str,
        app_id: impl Into<String>,
        app_secret: Secret,
        http: Client,
    ) -> Result<Self, MessagingError> {
        let mut base_url = Url::parse(base_url).map_err(|e| MessagingError::Config {
            message: format!("invalid Feishu base URL {:?}: {}", base_url, e),
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            app_id: app_id.into(),
            app_secret,
            http,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, MessagingError> {
        self.base_url.join(path).map_err(|e| MessagingError::Config {
            message: format!("invalid request path {}: {}", path, e),
        })
    }

    /// Return a valid tenant access token, fetching a new one if needed.
    ///
    /// The cache lock is held while fetching so concurrent senders share one
    /// refresh.
    async fn tenant_token(&self) -> Result<Secret, MessagingError> {
        let mut cached = self.token.lock().await;
        let buffer = Duration::minutes(TOKEN_EXPIRY_BUFFER_MINUTES);

        if let Some(token) = cached.as_ref() {
            if token.expires_at - buffer > Utc::now() {
                return Ok(token.value.clone());
            }
            debug!("Feishu tenant token expires soon, refreshing");
        }

        let url = self.endpoint("open-apis/auth/v3/tenant_access_token/internal")?;
        let response: TenantTokenResponse = read_json(
            self.http
                .post(url)
                .json(&TenantTokenRequest {
                    app_id: &self.app_id,
                    app_secret: self.app_secret.expose(),
                })
                .send()
                .await,
        )
        .await?;

        let value = match (response.code, response.tenant_access_token) {
            (0, Some(value)) => Secret::new(value),
            (code, _) => {
                return Err(MessagingError::Auth {
                    message: format!("tenant token request failed with code {}: {}", code, response.msg),
                });
            }
        };

        let token = CachedToken {
            value: value.clone(),
            expires_at: Utc::now() + Duration::seconds(response.expire),
        };
        info!(expires_at = %token.expires_at, "obtained Feishu tenant access token");
        *cached = Some(token);

        Ok(value)
    }

    async fn invalidate_token(&self) {
        self.token.lock().await.take();
    }
}

async fn read_json<T: DeserializeOwned>(
    sent: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, MessagingError> {
    let response = sent.map_err(|e| MessagingError::Transport {
        message: e.to_string(),
    })?;
    let bytes = response.bytes().await.map_err(|e| MessagingError::Transport {
        message: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| MessagingError::Decode {
        message: format!("{}: {}", e, String::from_utf8_lossy(&bytes)),
    })
}

impl std::fmt::Debug for FeishuMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeishuMessenger")
            .field("base_url", &self.base_url.as_str())
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret)
            .finish()
    }
}

#[async_trait]
impl Messenger for FeishuMessenger {
    fn actor(&self) -> &str {
        "feishu"
    }

    async fn send_text(
        &self,
        receive_id_type: &str,
        receive_id: &str,
        text: &str,
    ) -> Result<(), MessagingError> {
        let token = self.tenant_token().await?;

        let content = serde_json::to_string(&TextContent { text }).map_err(|e| {
            MessagingError::Decode {
                message: e.to_string(),
            }
        })?;
        let mut url = self.endpoint("open-apis/im/v1/messages")?;
        url.query_pairs_mut()
            .append_pair("receive_id_type", receive_id_type);

        let sent = self
            .http
            .post(url)
            .bearer_auth(token.expose())
            .json(&CreateMessageRequest {
                receive_id,
                msg_type: "text",
                content,
            })
            .send()
            .await;

        let log_id = sent
            .as_ref()
            .ok()
            .and_then(|r| r.headers().get("x-tt-logid"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let response: ApiResponse = read_json(sent).await?;

        if response.code != 0 {
            if INVALID_TOKEN_CODES.contains(&response.code) {
                warn!(code = response.code, "Feishu rejected the tenant token, dropping cache");
                self.invalidate_token().await;
            }
            return Err(MessagingError::Api {
                code: response.code,
                message: response.msg,
                log_id,
            });
        }

        info!(receive_id_type, receive_id, "Feishu message sent");
        Ok(())
    }
}
