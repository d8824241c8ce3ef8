//! API request/response types for the daemon HTTP interface.

use serde::{Deserialize, Serialize};

/// Request to ensure a gateway token exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureTokenRequest {
    /// External subject ID of the gateway user (its OIDC subject).
    pub oidc_user_id: String,
    /// Token name, unique per user.
    pub token_name: String,
    /// Group assigned when the token is created.
    #[serde(default = "default_token_group")]
    pub token_group: String,
}

fn default_token_group() -> String {
    "default".to_string()
}

/// Response containing the ensured token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureTokenResponse {
    pub token_id: i64,
    /// The token, including its `sk-` prefix.
    pub token: String,
}

/// Answer to a Feishu URL verification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

/// JSON error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}
