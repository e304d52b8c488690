use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dispatchbox::graph::{
    Credential, CredentialValidator, DeliveryClient, DeliveryOutcome, GraphClient, HttpConfig,
};

fn client_for(server: &MockServer) -> GraphClient {
    GraphClient::new(HttpConfig {
        base_url: server.uri(),
        validate_timeout: Duration::from_millis(500),
        deliver_timeout: Duration::from_millis(500),
        ..HttpConfig::default()
    })
    .unwrap()
}

fn graph_error(code: i64, message: &str) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "type": "OAuthException",
            "code": code
        }
    })
}

#[tokio::test]
async fn validate_returns_identity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v19.0/me"))
        .and(query_param("fields", "id,name"))
        .and(query_param("access_token", "token-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42", "name": "Alice"})))
        .expect(1)
        .mount(&server)
        .await;

    let identity = client_for(&server)
        .validate(&Credential::new("token-a"))
        .await
        .unwrap();

    assert_eq!(identity.id, "42");
    assert_eq!(identity.name, "Alice");
}

#[tokio::test]
async fn validate_reports_graph_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v19.0/me"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(graph_error(190, "Invalid OAuth access token")),
        )
        .mount(&server)
        .await;

    let failure = client_for(&server)
        .validate(&Credential::new("bad"))
        .await
        .unwrap_err();

    assert!(failure.reason.contains("Invalid OAuth access token"));
    assert!(failure.reason.contains("190"));
}

#[tokio::test]
async fn validate_times_out_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v19.0/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "42", "name": "Alice"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let failure = client_for(&server)
        .validate(&Credential::new("slow"))
        .await
        .unwrap_err();

    assert!(failure.reason.starts_with("network error"));
}

#[tokio::test]
async fn deliver_posts_form_and_returns_comment_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/123_456/comments"))
        .and(body_string_contains("message=hello+there"))
        .and(body_string_contains("access_token=token-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "123_456_789"})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&server)
        .deliver(&Credential::new("token-a"), "123_456", "hello there")
        .await;

    assert_eq!(
        outcome,
        DeliveryOutcome::Delivered {
            comment_id: "123_456_789".to_string()
        }
    );
}

#[tokio::test]
async fn deliver_classifies_error_codes() {
    let cases = [
        (190, "Session has expired"),
        (10, "Application does not have permission"),
        (200, "Permissions error"),
        (368, "Temporarily blocked for policies violations"),
    ];

    for (code, message) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v19.0/post-1/comments"))
            .respond_with(ResponseTemplate::new(400).set_body_json(graph_error(code, message)))
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .deliver(&Credential::new("token-a"), "post-1", "hi")
            .await;

        match code {
            190 => assert!(matches!(outcome, DeliveryOutcome::CredentialExpired { .. })),
            10 | 200 => assert!(matches!(outcome, DeliveryOutcome::PermissionDenied { .. })),
            _ => assert_eq!(outcome, DeliveryOutcome::other(message)),
        }
    }
}

#[tokio::test]
async fn deliver_connection_refused_is_network_failure() {
    // Unpooled, so the port is closed once dropped
    let server = MockServer::builder().start().await;
    let client = client_for(&server);
    drop(server);

    let outcome = client
        .deliver(&Credential::new("token-a"), "post-1", "hi")
        .await;

    match outcome {
        DeliveryOutcome::OtherFailure { reason } => assert!(reason.starts_with("network error")),
        other => panic!("expected network failure, got {other:?}"),
    }
}

#[tokio::test]
async fn deliver_without_comment_id_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v19.0/post-1/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let outcome = client_for(&server)
        .deliver(&Credential::new("token-a"), "post-1", "hi")
        .await;

    assert!(matches!(outcome, DeliveryOutcome::OtherFailure { .. }));
    assert!(!outcome.is_delivered());
}
