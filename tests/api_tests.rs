//! Webhook surface tests
//!
//! Drives the router directly with the form payloads Slack sends.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use volley::chat::{Directory, Messenger, Notice};
use volley::engine::{Engine, EngineConfig};
use volley::error::DirectoryError;
use volley::scheduler::Scheduler;
use volley::store::Store;
use volley::{server, AppState};

struct EmptyDirectory;

#[async_trait]
impl Directory for EmptyDirectory {
    async fn resolve_group(&self, _: &str) -> Result<BTreeSet<String>, DirectoryError> {
        Ok(BTreeSet::new())
    }

    async fn channel_members(&self, _: &str) -> Result<BTreeSet<String>, DirectoryError> {
        Ok(BTreeSet::new())
    }

    async fn is_active(&self, _: &str) -> Result<bool, DirectoryError> {
        Ok(false)
    }
}

#[derive(Default)]
struct RecordingMessenger {
    privates: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_private(&self, _: &str, user_id: &str, notice: Notice) {
        self.privates
            .lock()
            .unwrap()
            .push((user_id.to_string(), notice.text));
    }

    async fn send_public(&self, _: &str, _: Notice) {}
}

async fn test_app() -> (axum::Router, Arc<RecordingMessenger>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY NOT NULL,
            requester TEXT NOT NULL,
            channel TEXT NOT NULL,
            raw_text TEXT NOT NULL,
            task_text TEXT NOT NULL,
            user_refs TEXT NOT NULL DEFAULT '[]',
            group_refs TEXT NOT NULL DEFAULT '[]',
            broadcast INTEGER NOT NULL DEFAULT 0,
            timed_out TEXT NOT NULL DEFAULT '[]',
            rejected TEXT NOT NULL DEFAULT '[]',
            pending TEXT,
            created_at DATETIME NOT NULL,
            expires_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create requests table");

    let store = Store::new(pool, Duration::from_secs(60));
    let messenger = Arc::new(RecordingMessenger::default());
    let engine = Engine::new(
        store,
        Arc::new(EmptyDirectory),
        messenger.clone(),
        Scheduler::new(Duration::from_secs(3600)),
        EngineConfig::default(),
    );

    (server::router(AppState::new(engine, "secret")), messenger)
}

fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn test_command_with_wrong_token_is_unauthorized() {
    let (app, _) = test_app().await;

    let response = app
        .oneshot(form_request(
            "/command",
            "token=wrong&text=hello&user_id=U0&channel_id=C1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_command_with_missing_fields_apologizes() {
    let (app, _) = test_app().await;

    let response = app
        .oneshot(form_request("/command", "token=secret&user_id=U0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("malformed"));
}

#[tokio::test]
async fn test_command_dispatches_to_engine() {
    let (app, messenger) = test_app().await;

    let response = app
        .oneshot(form_request(
            "/command",
            "token=secret&text=hello+there&user_id=U0&channel_id=C1",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The empty directory leaves the pool too small; the spawned engine
    // task tells the requester so
    tokio::time::sleep(Duration::from_millis(100)).await;
    let privates = messenger.privates.lock().unwrap().clone();
    assert_eq!(privates.len(), 1);
    assert_eq!(privates[0].0, "U0");
}

#[tokio::test]
async fn test_interaction_with_wrong_token_is_unauthorized() {
    let (app, _) = test_app().await;

    let payload = serde_json::json!({
        "token": "wrong",
        "callback_id": format!("{}:U0", Uuid::new_v4()),
        "user": {"id": "U1"},
        "channel": {"id": "C1"},
        "actions": [{"name": "yes"}]
    });
    let response = app
        .oneshot(form_request("/interaction", &format!("payload={}", payload)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_interaction_without_payload_is_bad_request() {
    let (app, _) = test_app().await;

    let response = app
        .oneshot(form_request("/interaction", "foo=bar"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_interaction_with_malformed_callback_is_bad_request() {
    let (app, _) = test_app().await;

    let payload = serde_json::json!({
        "token": "secret",
        "callback_id": "no-separator",
        "user": {"id": "U1"},
        "channel": {"id": "C1"},
        "actions": [{"name": "no"}]
    });
    let response = app
        .oneshot(form_request("/interaction", &format!("payload={}", payload)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_interaction_on_expired_request_notifies_both_parties() {
    let (app, messenger) = test_app().await;

    let payload = serde_json::json!({
        "token": "secret",
        "callback_id": format!("{}:U0", Uuid::new_v4()),
        "user": {"id": "U1"},
        "channel": {"id": "C1"},
        "actions": [{"name": "yes"}]
    });
    let response = app
        .oneshot(form_request("/interaction", &format!("payload={}", payload)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The id is unknown, so the spawned handler walks the expired path
    tokio::time::sleep(Duration::from_millis(100)).await;
    let privates = messenger.privates.lock().unwrap().clone();
    let recipients: Vec<&str> = privates.iter().map(|(user, _)| user.as_str()).collect();
    assert!(recipients.contains(&"U0"));
    assert!(recipients.contains(&"U1"));
}
