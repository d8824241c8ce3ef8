//! HTTP client for the companion daemon.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use companion_core::NotificationPayload;
use companion_daemon::{EnsureTokenRequest, EnsureTokenResponse, ErrorResponse};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// Default daemon address.
pub const DEFAULT_URL: &str = "http://localhost:1323";

/// Client for the daemon's HTTP API.
pub struct DaemonClient {
    http: Client,
    base_url: Url,
}

impl DaemonClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("companion-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid daemon URL {:?}", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid endpoint path {:?}", path))
    }

    /// Check that the daemon answers.
    pub async fn health(&self) -> Result<()> {
        let url = self.endpoint("health")?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to reach daemon at {}", url))?;

        if !response.status().is_success() {
            bail!("Daemon unhealthy: HTTP {}", response.status());
        }
        Ok(())
    }

    /// Ensure a gateway token exists for `subject`.
    pub async fn ensure_token(
        &self,
        subject: &str,
        token_name: &str,
        token_group: &str,
    ) -> Result<EnsureTokenResponse> {
        let request = EnsureTokenRequest {
            oidc_user_id: subject.to_string(),
            token_name: token_name.to_string(),
            token_group: token_group.to_string(),
        };
        let url = self.endpoint("open-webui/ensure_token")?;
        debug!(%url, subject, token_name, "ensuring token");

        let response = self
            .http
            .post(url.clone())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach daemon at {}", url))?;

        parse_json(response).await
    }

    /// Post a notification as if it came from gateway source `source`.
    pub async fn notify(&self, source: &str, payload: &NotificationPayload) -> Result<()> {
        let url = self.endpoint(&format!("newapi/notification/{}", source))?;
        debug!(%url, "posting notification");

        let response = self
            .http
            .post(url.clone())
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach daemon at {}", url))?;

        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(error) => bail!("{} ({}): {}", error.error, error.status, error.message),
        Err(_) => bail!("Daemon returned HTTP {}: {}", status, body),
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_status(response).await?;
    response
        .json()
        .await
        .context("Failed to decode daemon response")
}
