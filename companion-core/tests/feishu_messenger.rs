//! Integration tests for the Feishu messenger against a mock server.
//!
//! These tests verify that the FeishuMessenger:
//! - Obtains and caches the tenant access token
//! - Sends text messages in the documented wire format
//! - Surfaces API errors with the request log id
//! - Drops the cached token when Feishu rejects it

#![cfg(feature = "feishu")]

use std::time::Duration;

use companion_core::messaging::{FeishuMessenger, Messenger, MessagingError};
use companion_core::Secret;
use serde_json::json;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

async fn mount_tenant_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/open-apis/auth/v3/tenant_access_token/internal"))
        .and(body_json(json!({"app_id": "cli_test", "app_secret": "app-secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "tenant_access_token": "t-abc",
            "expire": 7200
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn messenger(server: &MockServer) -> FeishuMessenger {
    FeishuMessenger::new(
        &server.uri(),
        "cli_test",
        Secret::new("app-secret"),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_send_text_wire_format_and_token_cache() {
    let server = MockServer::start().await;
    mount_tenant_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/open-apis/im/v1/messages"))
        .and(query_param("receive_id_type", "open_id"))
        .and(header("authorization", "Bearer t-abc"))
        .and(body_json(json!({
            "receive_id": "ou_123",
            "msg_type": "text",
            "content": "{\"text\":\"hello\\nworld\"}"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "success",
            "data": {"message_id": "om_1"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let messenger = messenger(&server);
    assert_eq!(messenger.actor(), "feishu");
    messenger.send_text("open_id", "ou_123", "hello\nworld").await.unwrap();
    messenger.send_text("open_id", "ou_123", "hello\nworld").await.unwrap();
}

#[tokio::test]
async fn test_api_error_carries_log_id() {
    let server = MockServer::start().await;
    mount_tenant_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/open-apis/im/v1/messages"))
        .respond_with(
            ResponseTemplate::new(400)
                .insert_header("x-tt-logid", "202401010000")
                .set_body_json(json!({"code": 230001, "msg": "invalid receive_id"})),
        )
        .mount(&server)
        .await;

    let err = messenger(&server)
        .send_text("chat_id", "oc_bad", "hi")
        .await
        .unwrap_err();

    match err {
        MessagingError::Api {
            code,
            message,
            log_id,
        } => {
            assert_eq!(code, 230001);
            assert_eq!(message, "invalid receive_id");
            assert_eq!(log_id.as_deref(), Some("202401010000"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_tenant_token_failure_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open-apis/auth/v3/tenant_access_token/internal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 10003,
            "msg": "invalid param"
        })))
        .mount(&server)
        .await;

    let err = messenger(&server)
        .send_text("open_id", "ou_123", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::Auth { .. }));
}

#[tokio::test]
async fn test_rejected_token_is_refetched() {
    let server = MockServer::start().await;
    mount_tenant_token(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/open-apis/im/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 99991663,
            "msg": "Invalid access token for authorization."
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/open-apis/im/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0, "msg": "success"})))
        .mount(&server)
        .await;

    let messenger = messenger(&server);
    let first = messenger.send_text("open_id", "ou_123", "hi").await;
    assert!(matches!(first, Err(MessagingError::Api { code: 99991663, .. })));
    messenger.send_text("open_id", "ou_123", "hi").await.unwrap();
}

#[tokio::test]
async fn test_garbage_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open-apis/auth/v3/tenant_access_token/internal"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = messenger(&server)
        .send_text("open_id", "ou_123", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::Decode { .. }));
}
