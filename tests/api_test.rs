use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, Utc};
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use jti_registry::api::middleware::{auth::require_unrevoked, state::AppState};
use jti_registry::registry::{
    MemoryRevocationStore, RegistryConfig, RevocationRegistry, VerifiedCredential,
};

const ADMIN_KEY: &str = "test-admin-key";

async fn setup() -> (Arc<MemoryRevocationStore>, AppState) {
    let store = Arc::new(MemoryRevocationStore::new());
    let registry = Arc::new(RevocationRegistry::new(store.clone(), RegistryConfig::default()).await);
    let state = AppState {
        registry,
        admin_api_key: Secret::new(ADMIN_KEY.to_string()),
    };
    (store, state)
}

fn admin_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-admin-key", ADMIN_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-admin-key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_revoke_then_status() {
    let (_store, state) = setup().await;
    let app = jti_registry::api::app(state);
    let expires_at = Utc::now() + Duration::hours(1);

    let response = app
        .clone()
        .oneshot(admin_post(
            "/tokens/revoke",
            json!({ "jti": "tok-1", "subject": "user@example.com", "expires_at": expires_at }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(admin_get("/tokens/tok-1/revoked"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["jti"], "tok-1");
    assert_eq!(body["revoked"], true);

    let response = app.oneshot(admin_get("/tokens/tok-2/revoked")).await.unwrap();
    assert_eq!(json_body(response).await["revoked"], false);
}

#[tokio::test]
async fn test_admin_key_is_required() {
    let (_store, state) = setup().await;
    let app = jti_registry::api::app(state);

    let missing = Request::builder()
        .uri("/tokens/tok-1/revoked")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(missing).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/tokens/tok-1/revoked")
        .header("x-admin-key", "nope")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_revoke_surfaces_store_outage() {
    let (store, state) = setup().await;
    let registry = state.registry.clone();
    let app = jti_registry::api::app(state);
    store.set_failing(true);

    let response = app
        .oneshot(admin_post(
            "/tokens/revoke",
            json!({
                "jti": "tok-1",
                "subject": "user@example.com",
                "expires_at": Utc::now() + Duration::hours(1),
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(registry.cached_tokens().await, 0);
}

#[tokio::test]
async fn test_revoke_validates_input() {
    let (_store, state) = setup().await;
    let app = jti_registry::api::app(state);
    let expires_at = Utc::now() + Duration::hours(1);

    let response = app
        .clone()
        .oneshot(admin_post(
            "/tokens/revoke",
            json!({ "jti": "", "subject": "user@example.com", "expires_at": expires_at }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(admin_post(
            "/tokens/revoke",
            json!({ "jti": "tok-1", "subject": " ", "expires_at": expires_at }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(admin_post(
            "/tokens/revoke",
            json!({ "jti": "subject:abc", "subject": "alice@example.com", "expires_at": expires_at }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_revoke_subject_returns_revocation_id() {
    let (store, state) = setup().await;
    let app = jti_registry::api::app(state);

    let response = app
        .oneshot(admin_post(
            "/subjects/revoke",
            json!({ "subject": "user@example.com", "expires_at": Utc::now() + Duration::days(7) }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let revocation_id = body["revocation_id"].as_str().unwrap();
    assert!(revocation_id.starts_with("subject:user@example.com:"));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_health_reports_store_and_cache() {
    let (store, state) = setup().await;
    state
        .registry
        .revoke("tok-1", "user@example.com", Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    let app = jti_registry::api::app(state);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["fallback_policy"], "fail_open");
    assert_eq!(body["cache"]["revoked_tokens"], 1);

    store.set_failing(true);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

/// Stands in for the signature/claims layer: trusts test headers
async fn insert_test_credential(mut request: Request, next: Next) -> Response {
    {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    if let (Some(jti), Some(subject), Some(issued_at)) =
        (header("x-test-jti"), header("x-test-sub"), header("x-test-iat"))
    {
        if let Ok(issued_at) = issued_at.parse::<DateTime<Utc>>() {
            request.extensions_mut().insert(VerifiedCredential {
                jti,
                subject,
                issued_at,
            });
        }
    }
    }

    next.run(request).await
}

fn protected_app(state: AppState) -> Router {
    Router::new()
        .route("/me", get(|| async { "ok" }))
        .layer(middleware::from_fn_with_state(state.clone(), require_unrevoked))
        .layer(middleware::from_fn(insert_test_credential))
        .with_state(state)
}

fn credential_request(jti: &str, subject: &str, issued_at: DateTime<Utc>) -> Request<Body> {
    Request::builder()
        .uri("/me")
        .header("x-test-jti", jti)
        .header("x-test-sub", subject)
        .header("x-test-iat", issued_at.to_rfc3339())
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_require_unrevoked_gate() {
    let (_store, state) = setup().await;
    let registry = state.registry.clone();
    let app = protected_app(state);
    let issued_at = Utc::now() - Duration::minutes(10);

    let response = app
        .clone()
        .oneshot(credential_request("tok-1", "user@example.com", issued_at))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    registry
        .revoke("tok-1", "user@example.com", Utc::now() + Duration::hours(1))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(credential_request("tok-1", "user@example.com", issued_at))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_require_unrevoked_applies_subject_cutoff() {
    let (_store, state) = setup().await;
    let registry = state.registry.clone();
    let app = protected_app(state);
    let issued_at = Utc::now() - Duration::minutes(10);

    registry
        .revoke_all_for_subject("user@example.com", Utc::now() + Duration::days(7))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(credential_request("tok-2", "user@example.com", issued_at))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(credential_request(
            "tok-3",
            "user@example.com",
            Utc::now() + Duration::seconds(1),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
