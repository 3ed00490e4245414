//! End-to-end flows against a mock platform.
//!
//! These tests wire the production adapters (reqwest transport, file token
//! storage, system clock) through `CosmosPlatform` and drive them against a
//! wiremock server.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use cosmos_application::store::selectors;
use cosmos_domain::{Credentials, DatasetQuery, ErrorKind, PlatformSettings, SessionPhase};
use cosmos_infrastructure::CosmosPlatform;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::{TempDir, tempdir};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer, dir: &TempDir) -> PlatformSettings {
    let mut settings = PlatformSettings::default();
    settings.api.base_url = server.uri();
    settings.api.request_timeout_ms = 5_000;
    settings.resilience.retry_base_delay_ms = 10;
    settings.storage.directory = Some(dir.path().to_path_buf());
    settings
}

fn grant_body(token: &str) -> serde_json::Value {
    json!({
        "user": {
            "id": "u-1",
            "email": "ada@example.com",
            "role": "RESEARCHER",
            "permissions": [],
            "mfaEnabled": false
        },
        "token": token,
        "refreshToken": "refresh-1",
        "expiresIn": 3600
    })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_body("access-1")))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_load_and_logout_with_failing_server() {
    let server = MockServer::start().await;
    let dir = tempdir().expect("Failed to create temp directory");
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/datasets"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "ds-1", "name": "clips", "status": "ready"}],
            "total": 1,
            "page": 1,
            "pageSize": 20
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let platform = CosmosPlatform::new(settings(&server, &dir)).unwrap();
    let running = platform.start();
    let effects = platform.effects();

    let phase = effects
        .login(&Credentials::new("ada@example.com", "pw"))
        .await
        .unwrap();
    assert_eq!(phase, SessionPhase::Authenticated);
    assert!(dir.path().join("cosmos_auth_token.json").exists());

    let page = effects.load_datasets(&DatasetQuery::default()).await;
    assert!(page.is_success());
    assert_eq!(platform.store().snapshot().datasets.items.len(), 1);

    effects.logout().await;
    assert_eq!(platform.session().phase(), SessionPhase::Unauthenticated);
    assert!(!platform.session().validate_token("access-1"));
    assert!(!dir.path().join("cosmos_auth_token.json").exists());
    assert!(!platform.store().select(selectors::is_authenticated));

    platform.shutdown(running).await;
}

#[tokio::test]
async fn test_session_survives_restart() {
    let server = MockServer::start().await;
    let dir = tempdir().expect("Failed to create temp directory");
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_body("access-1")["user"].clone()))
        .expect(1)
        .mount(&server)
        .await;

    let first = CosmosPlatform::new(settings(&server, &dir)).unwrap();
    let running = first.start();
    first
        .effects()
        .login(&Credentials::new("ada@example.com", "pw"))
        .await
        .unwrap();
    first.shutdown(running).await;

    let second = CosmosPlatform::new(settings(&server, &dir)).unwrap();
    let running = second.start();
    assert!(second.session().restore().await.unwrap());
    assert_eq!(second.session().phase(), SessionPhase::Authenticated);
    assert_eq!(second.session().access_token().as_deref(), Some("access-1"));
    second.shutdown(running).await;
}

#[tokio::test]
async fn test_mfa_login() {
    let server = MockServer::start().await;
    let dir = tempdir().expect("Failed to create temp directory");
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"mfaRequired": true, "mfaToken": "challenge-1"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/mfa/verify"))
        .and(body_json(json!({"mfaToken": "challenge-1", "code": "123456"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_body("access-2")))
        .expect(1)
        .mount(&server)
        .await;

    let platform = CosmosPlatform::new(settings(&server, &dir)).unwrap();
    let effects = platform.effects();

    let phase = effects
        .login(&Credentials::new("ada@example.com", "pw"))
        .await
        .unwrap();
    assert_eq!(phase, SessionPhase::MfaPending);
    assert!(platform.store().select(selectors::is_mfa_pending));
    assert!(!dir.path().join("cosmos_auth_token.json").exists());

    let error = effects.verify_mfa("12ab56").await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::Validation);

    effects.verify_mfa("123456").await.unwrap();
    assert_eq!(platform.session().phase(), SessionPhase::Authenticated);
    assert_eq!(platform.session().access_token().as_deref(), Some("access-2"));
}

#[tokio::test]
async fn test_sixth_failed_login_is_rate_limited_locally() {
    let server = MockServer::start().await;
    let dir = tempdir().expect("Failed to create temp directory");
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "invalid credentials"})),
        )
        .expect(5)
        .mount(&server)
        .await;

    let platform = CosmosPlatform::new(settings(&server, &dir)).unwrap();
    let credentials = Credentials::new("ada@example.com", "wrong");

    for _ in 0..5 {
        let error = platform.effects().login(&credentials).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Auth);
    }
    let error = platform.effects().login(&credentials).await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::RateLimited);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    let dir = tempdir().expect("Failed to create temp directory");
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m-1", "name": "cosmos-predict", "type": "diffusion", "selected": true}
        ])))
        .mount(&server)
        .await;

    let platform = CosmosPlatform::new(settings(&server, &dir)).unwrap();
    let response = platform.effects().load_models(None).await;

    assert!(response.success);
    assert_eq!(response.error, None);
    assert_eq!(response.metadata.attempts, 3);
    assert_eq!(response.data.unwrap().len(), 1);
}

#[tokio::test]
async fn test_open_breaker_fails_fast() {
    let server = MockServer::start().await;
    let dir = tempdir().expect("Failed to create temp directory");
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let mut settings = settings(&server, &dir);
    settings.resilience.failure_threshold = 2;
    settings.resilience.max_attempts = 1;
    let platform = CosmosPlatform::new(settings).unwrap();

    for _ in 0..2 {
        let response = platform.effects().load_models(None).await;
        assert_eq!(response.error.unwrap().kind, ErrorKind::Server);
    }

    let response = platform.effects().load_models(None).await;
    assert_eq!(response.error.unwrap().kind, ErrorKind::CircuitOpen);
    assert_eq!(response.metadata.attempts, 0);
}
