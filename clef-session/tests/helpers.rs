//! Integration test helpers
//!
//! Spins up a mock identity endpoint per test and points a session manager
//! at it with a throwaway storage directory. The mock knows one valid user
//! (alice/secret, token `tok123`) and exposes knobs for the failure modes
//! the session layer has to handle.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clef_session::{SessionConfig, SessionManager};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;

// Make sure tracing is initialized only once across the test binary
static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

/// Knobs and counters for the mock identity endpoint
#[derive(Default)]
pub struct IdentityState {
    /// Number of POST /auth/login requests seen
    pub login_calls: AtomicUsize,
    /// When set, every authorized route answers 401
    pub revoked: AtomicBool,
    /// When set, login rejections carry a plain-text body with no `detail`
    pub plain_errors: AtomicBool,
    /// When set, login answers take 300ms
    pub slow_login: AtomicBool,
    /// Authorization header of the last /ping request; None until a request
    /// arrived, Some(None) when one arrived without the header
    pub last_ping_auth: Mutex<Option<Option<String>>>,
    /// Authorization header of the last /auth/login request
    pub last_login_auth: Mutex<Option<Option<String>>>,
    /// Body of the last /auth/register request
    pub last_register_body: Mutex<Option<Value>>,
}

/// A mock identity endpoint bound to a random local port
pub struct TestIdentity {
    pub address: String,
    pub state: Arc<IdentityState>,
}

/// A session manager pointed at a mock endpoint, with its storage directory
pub struct TestSession {
    pub manager: SessionManager,
    pub identity: TestIdentity,
    pub storage: TempDir,
}

/// Spawn the mock identity endpoint
pub async fn spawn_identity() -> TestIdentity {
    LazyLock::force(&TRACING);

    let state = Arc::new(IdentityState::default());

    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/me", get(me))
        .route("/api/ping", get(ping))
        .route("/api/verification/send-verification", post(send_verification))
        .route("/api/verification/verify-email", post(verify_email))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    TestIdentity {
        address: format!("http://127.0.0.1:{}/api", addr.port()),
        state,
    }
}

/// Spawn a mock endpoint plus a manager with a throwaway storage directory
pub async fn spawn_session() -> TestSession {
    let identity = spawn_identity().await;
    let storage = TempDir::new().unwrap();

    let manager = SessionManager::new(test_config(&identity, storage.path()))
        .await
        .unwrap();

    TestSession {
        manager,
        identity,
        storage,
    }
}

/// Manager configuration for the given endpoint and storage directory
pub fn test_config(identity: &TestIdentity, storage_dir: &std::path::Path) -> SessionConfig {
    SessionConfig::default()
        .with_base_url(identity.address.clone())
        .with_storage_dir(storage_dir)
        .with_timeout(5)
}

fn auth_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

async fn login(
    State(state): State<Arc<IdentityState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_login_auth.lock().unwrap() = Some(auth_header(&headers));

    if state.slow_login.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;
    }

    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    if username.to_lowercase() == "alice" && password == "secret" {
        return (
            StatusCode::OK,
            Json(json!({
                "access_token": "tok123",
                "token_type": "bearer",
                "username": username.to_lowercase(),
            })),
        )
            .into_response();
    }

    if state.plain_errors.load(Ordering::SeqCst) {
        return (StatusCode::UNAUTHORIZED, "nope").into_response();
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Invalid credentials"})),
    )
        .into_response()
}

async fn register(
    State(state): State<Arc<IdentityState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    *state.last_register_body.lock().unwrap() = Some(body.clone());

    if body["username"].as_str() == Some("taken") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Username already registered"})),
        );
    }

    (StatusCode::CREATED, Json(json!({"id": 7})))
}

async fn me(
    State(state): State<Arc<IdentityState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let authorized = auth_header(&headers).as_deref() == Some("Bearer tok123");

    if state.revoked.load(Ordering::SeqCst) || !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Could not validate credentials"})),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "id": 1,
            "username": "alice",
            "email": "alice@example.com",
        })),
    )
}

async fn ping(
    State(state): State<Arc<IdentityState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    *state.last_ping_auth.lock().unwrap() = Some(auth_header(&headers));

    if state.revoked.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Could not validate credentials"})),
        );
    }

    (StatusCode::OK, Json(json!({"status": "ok"})))
}

async fn send_verification(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["email"].as_str().unwrap_or_default().contains('@') {
        (
            StatusCode::OK,
            Json(json!({
                "message": "Verification code sent",
                "expires_in_minutes": 10,
            })),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Invalid email address"})),
        )
    }
}

async fn verify_email(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["verification_code"].as_str() == Some("424242") {
        (
            StatusCode::OK,
            Json(json!({"message": "Email verified", "verified": true})),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Invalid verification code"})),
        )
    }
}
