//! Token login against a mock homeserver.

#![cfg(feature = "http-login")]

use qrlogin_interactive::{HttpLoginTokenExchanger, LoginError, LoginTokenExchanger};
use serde_json::json;
use std::time::Duration;
use url::Url;
use wiremock::{
    matchers::{body_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn exchanger() -> HttpLoginTokenExchanger {
    HttpLoginTokenExchanger::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_exchange_returns_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/login"))
        .and(body_json(json!({
            "type": "m.login.token",
            "token": "login-token-1",
            "initial_device_display_name": "Laptop"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "@alice:example.org",
            "access_token": "syt_access_token",
            "device_id": "NEWDEVICE"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let homeserver = Url::parse(&server.uri()).unwrap();
    let credentials = exchanger()
        .exchange(&homeserver, "login-token-1", Some("Laptop"))
        .await
        .unwrap();

    assert_eq!(credentials.user_id(), "@alice:example.org");
    assert_eq!(credentials.device_id(), "NEWDEVICE");
    assert_eq!(credentials.access_token(), "syt_access_token");
    assert_eq!(credentials.homeserver(), &homeserver);
}

#[tokio::test]
async fn test_display_name_omitted_when_unset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/login"))
        .and(body_json(json!({"type": "m.login.token", "token": "t"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "@alice:example.org",
            "access_token": "syt_access_token",
            "device_id": "NEWDEVICE"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let homeserver = Url::parse(&server.uri()).unwrap();
    exchanger().exchange(&homeserver, "t", None).await.unwrap();
}

#[tokio::test]
async fn test_rejected_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errcode": "M_FORBIDDEN",
            "error": "Invalid login token"
        })))
        .mount(&server)
        .await;

    let homeserver = Url::parse(&server.uri()).unwrap();
    let err = exchanger()
        .exchange(&homeserver, "expired", None)
        .await
        .unwrap_err();

    match err {
        LoginError::TokenExchange(message) => assert!(message.contains("M_FORBIDDEN")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user_id": "@alice:example.org"})))
        .mount(&server)
        .await;

    let homeserver = Url::parse(&server.uri()).unwrap();
    let err = exchanger()
        .exchange(&homeserver, "t", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LoginError::TokenExchange(_)));
}
