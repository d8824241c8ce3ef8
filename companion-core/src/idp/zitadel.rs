//! ZITADEL REST implementation of [`IdpClient`].
//!
//! Users are managed through the v2 user service; metadata goes through the
//! v1 management API because the v2 service only accepts metadata on create.
//! Every request authenticates with a personal access token.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, Method};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{
    HumanProfile, HumanUserUpdate, IdpClient, IdpError, IdpUserRecord, MetadataEntry,
    NewHumanUser, UserState,
};
use crate::model::IdpUserId;
use crate::secret::Secret;

/// ZITADEL-backed directory client.
#[derive(Clone)]
pub struct ZitadelClient {
    base_url: Url,
    pat: Secret,
    http: Client,
}

impl ZitadelClient {
    /// Create a client for the instance at `domain`.
    ///
    /// `domain` may be a bare host (`acme.zitadel.cloud`, HTTPS assumed) or a
    /// full base URL.
    pub fn new(domain: &str, pat: Secret, timeout: Duration) -> Result<Self, IdpError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("auth-companion/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IdpError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Self::with_http_client(domain, pat, http)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_http_client(
        domain: &str,
        pat: Secret,
        http: Client,
    ) -> Result<Self, IdpError> {
        let raw = if domain.contains("://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        };
        let mut base_url = Url::parse(&raw).map_err(|e| IdpError::Config {
            message: format!("invalid ZITADEL domain {:?}: {}", domain, e),
        })?;
        // Request paths are joined relative to the base, keeping any prefix.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            pat,
            http,
        })
    }

    async fn call<B, R>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<R, IdpError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.base_url.join(path).map_err(|e| IdpError::Config {
            message: format!("invalid request path {}: {}", path, e),
        })?;
        debug!(operation, %url, "calling ZITADEL");

        let response = self
            .http
            .request(method, url)
            .bearer_auth(self.pat.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| IdpError::Transport {
                operation,
                message: e.to_string(),
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| IdpError::Transport {
            operation,
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(IdpError::Api {
                operation,
                status: status.as_u16(),
                message: error_message(&bytes),
            });
        }

        // Some endpoints answer with an empty body
        let bytes: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
        serde_json::from_slice(bytes).map_err(|e| IdpError::Decode {
            operation,
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for ZitadelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZitadelClient")
            .field("base_url", &self.base_url.as_str())
            .field("pat", &self.pat)
            .finish()
    }
}

fn error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
        }) => message,
        _ => String::from_utf8_lossy(body).into_owned(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListUsersRequest<'a> {
    queries: [SearchQuery<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery<'a> {
    login_name_query: LoginNameQuery<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginNameQuery<'a> {
    login_name: &'a str,
    method: &'static str,
}

#[derive(Deserialize)]
struct ListUsersResponse {
    #[serde(default)]
    result: Vec<WireUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUser {
    user_id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    preferred_login_name: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    human: Option<WireHuman>,
}

#[derive(Deserialize)]
struct WireHuman {
    #[serde(default)]
    profile: Option<WireProfile>,
    #[serde(default)]
    phone: Option<WirePhone>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProfile {
    given_name: Option<String>,
    family_name: Option<String>,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct WirePhone {
    phone: Option<String>,
}

impl From<WireUser> for IdpUserRecord {
    fn from(user: WireUser) -> Self {
        let login_name = if user.username.is_empty() {
            user.preferred_login_name.unwrap_or_default()
        } else {
            user.username
        };
        let state = match user.state.as_deref() {
            Some("USER_STATE_ACTIVE") => UserState::Active,
            Some("USER_STATE_INACTIVE") => UserState::Inactive,
            _ => UserState::Other,
        };
        let (profile, phone) = match user.human {
            Some(human) => (human.profile, human.phone.and_then(|p| p.phone)),
            None => (None, None),
        };
        let (given_name, family_name, display_name) = match profile {
            Some(p) => (p.given_name, p.family_name, p.display_name),
            None => (None, None, None),
        };

        Self {
            user_id: IdpUserId::new(user.user_id),
            login_name,
            display_name,
            given_name,
            family_name,
            phone: phone.filter(|p| !p.is_empty()),
            state,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireProfileOut<'a> {
    given_name: &'a str,
    family_name: &'a str,
    display_name: &'a str,
}

impl<'a> From<&'a HumanProfile> for WireProfileOut<'a> {
    fn from(p: &'a HumanProfile) -> Self {
        Self {
            given_name: &p.given_name,
            family_name: &p.family_name,
            display_name: &p.display_name,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEmail<'a> {
    email: &'a str,
    is_verified: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePhoneOut<'a> {
    phone: &'a str,
    is_verified: bool,
}

#[derive(Serialize)]
struct WireMetadata {
    key: String,
    value: String,
}

impl From<&MetadataEntry> for WireMetadata {
    fn from(entry: &MetadataEntry) -> Self {
        Self {
            key: entry.key.clone(),
            value: STANDARD.encode(&entry.value),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireIdpLink<'a> {
    idp_id: &'a str,
    user_id: &'a str,
    user_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddHumanUserRequest<'a> {
    username: &'a str,
    profile: WireProfileOut<'a>,
    email: WireEmail<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<WirePhoneOut<'a>>,
    metadata: Vec<WireMetadata>,
    idp_links: Vec<WireIdpLink<'a>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddHumanUserResponse {
    user_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateHumanUserRequest<'a> {
    username: &'a str,
    profile: WireProfileOut<'a>,
    email: WireEmail<'a>,
}

#[derive(Serialize)]
struct BulkSetMetadataRequest {
    metadata: Vec<WireMetadata>,
}

#[derive(Serialize)]
struct Empty {}

#[async_trait]
impl IdpClient for ZitadelClient {
    async fn list_users_by_email(&self, email: &str) -> Result<Vec<IdpUserRecord>, IdpError> {
        let request = ListUsersRequest {
            queries: [SearchQuery {
                login_name_query: LoginNameQuery {
                    login_name: email,
                    method: "TEXT_QUERY_METHOD_EQUALS",
                },
            }],
        };
        let response: ListUsersResponse = self
            .call("list_users", Method::POST, "v2/users", &request)
            .await?;

        Ok(response.result.into_iter().map(IdpUserRecord::from).collect())
    }

    async fn add_user(&self, user: &NewHumanUser) -> Result<IdpUserId, IdpError> {
        let request = AddHumanUserRequest {
            username: &user.username,
            profile: (&user.profile).into(),
            email: WireEmail {
                email: &user.email,
                is_verified: true,
            },
            phone: user.phone.as_deref().map(|phone| WirePhoneOut {
                phone,
                is_verified: true,
            }),
            metadata: user.metadata.iter().map(WireMetadata::from).collect(),
            idp_links: user
                .idp_links
                .iter()
                .map(|l| WireIdpLink {
                    idp_id: &l.idp_id,
                    user_id: &l.user_id,
                    user_name: &l.user_name,
                })
                .collect(),
        };
        let response: AddHumanUserResponse = self
            .call("add_user", Method::POST, "v2/users/human", &request)
            .await
            .map_err(|e| match e {
                IdpError::Api { status: 409, .. } => IdpError::Conflict {
                    login_name: user.username.clone(),
                },
                e => e,
            })?;

        Ok(IdpUserId::new(response.user_id))
    }

    async fn update_user(
        &self,
        user_id: &IdpUserId,
        update: &HumanUserUpdate,
    ) -> Result<IdpUserId, IdpError> {
        let request = UpdateHumanUserRequest {
            username: &update.username,
            profile: (&update.profile).into(),
            email: WireEmail {
                email: &update.email,
                is_verified: true,
            },
        };
        let path = format!("v2/users/human/{}", user_id);
        let _: IgnoredAny = self
            .call("update_user", Method::PUT, &path, &request)
            .await
            .map_err(|e| match e {
                IdpError::Api { status: 404, .. } => IdpError::UserNotFound {
                    user_id: user_id.to_string(),
                },
                e => e,
            })?;

        Ok(user_id.clone())
    }

    async fn set_metadata(
        &self,
        user_id: &IdpUserId,
        entries: &[MetadataEntry],
    ) -> Result<(), IdpError> {
        let request = BulkSetMetadataRequest {
            metadata: entries.iter().map(WireMetadata::from).collect(),
        };
        let path = format!("management/v1/users/{}/metadata/_bulk", user_id);
        let _: IgnoredAny = self
            .call("set_metadata", Method::POST, &path, &request)
            .await?;
        Ok(())
    }

    async fn deactivate_user(&self, user_id: &IdpUserId) -> Result<(), IdpError> {
        let path = format!("v2/users/{}/deactivate", user_id);
        let _: IgnoredAny = self
            .call("deactivate_user", Method::POST, &path, &Empty {})
            .await?;
        Ok(())
    }

    async fn reactivate_user(&self, user_id: &IdpUserId) -> Result<(), IdpError> {
        let path = format!("v2/users/{}/reactivate", user_id);
        let _: IgnoredAny = self
            .call("reactivate_user", Method::POST, &path, &Empty {})
            .await?;
        Ok(())
    }
}
