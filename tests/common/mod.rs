//! Shared helpers for the integration tests.
//!
//! Each test file is its own crate, so not every helper is used everywhere.

#![allow(dead_code)]

use axum::{
    Router,
    body::{self, Body},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt; // for `oneshot`

use taskboard::api::{AppState, create_router};
use taskboard::config::Config;
use taskboard::db::Database;

/// Router over a private in-memory database
pub fn test_app(config: Config) -> Router {
    let db = Database::open_in_memory().expect("in-memory database");
    create_router(AppState::new(db, config))
}

pub fn default_app() -> Router {
    test_app(Config::default())
}

/// Send one request and decode the JSON response (Null for empty bodies)
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Register and log in; returns (user id, session token)
pub async fn signup(app: &Router, email: &str) -> (i64, String) {
    let (status, _) = send(
        app,
        "POST",
        "/api/register",
        None,
        Some(json!({"email": email, "password": "pw123", "nome": "A", "cognome": "B"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, user) = send(
        app,
        "POST",
        "/api/login",
        None,
        Some(json!({"email": email, "password": "pw123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    (
        user["idUtente"].as_i64().unwrap(),
        user["token"].as_str().unwrap().to_string(),
    )
}

/// Create a task due on `due`; returns the created JSON
pub async fn create_task(app: &Router, token: &str, name: &str, due: &str) -> Value {
    let (status, task) = send(
        app,
        "POST",
        "/api/tasks",
        Some(token),
        Some(json!({"nome_task": name, "data_fine": due})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{task}");
    task
}
