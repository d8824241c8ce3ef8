//! Companion Daemon Library
//!
//! This library exposes the daemon's HTTP API and configuration for testing
//! and for the CLI.

pub mod api;
pub mod config;

pub use api::{
    ApiError, ApiState, ChallengeResponse, EnsureTokenRequest, EnsureTokenResponse,
    ErrorResponse, ServerHandle, router, start_server,
};
pub use config::{CompanionConfig, load_config, load_config_from};
