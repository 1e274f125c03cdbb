//! Backend worker endpoints: `/home`, `/heartbeat`, `/id`.
//!
//! Served over HTTP by the `worker` binary and [`crate::supervisor::LocalSupervisor`],
//! and answered directly by [`crate::supervisor::InMemorySupervisor`].

use crate::core::UpstreamResponse;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;

pub fn home_body(server_id: &str) -> Value {
    json!({
        "message": format!("Hello from Server: {}", server_id),
        "status": "successful"
    })
}

pub fn id_body(server_id: &str) -> Value {
    json!({ "server_id": server_id })
}

/// Answers `path` the way a worker tagged `server_id` would over HTTP.
pub fn respond(server_id: &str, path: &str) -> UpstreamResponse {
    match path.trim_start_matches('/') {
        "home" => UpstreamResponse::new(200, home_body(server_id).to_string()),
        "heartbeat" => UpstreamResponse::new(200, ""),
        "id" => UpstreamResponse::new(200, id_body(server_id).to_string()),
        _ => UpstreamResponse::new(404, "Not Found"),
    }
}

pub fn build_worker_router(server_id: impl Into<String>) -> Router {
    let server_id: Arc<str> = Arc::from(server_id.into());
    Router::new()
        .route("/home", get(home))
        .route("/heartbeat", get(heartbeat))
        .route("/id", get(id))
        .with_state(server_id)
}

async fn home(State(server_id): State<Arc<str>>) -> Json<Value> {
    Json(home_body(&server_id))
}

async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

async fn id(State(server_id): State<Arc<str>>) -> Json<Value> {
    Json(id_body(&server_id))
}
