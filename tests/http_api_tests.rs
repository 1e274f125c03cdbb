use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use hashring_router::{
    InMemorySupervisor, LoadBalancer, RouterConfig,
    web::{AppState, build_router},
    worker::build_worker_router,
};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn app_with_pool(initial: usize) -> axum::Router {
    let config = RouterConfig::default()
        .readiness_timeout(Duration::from_millis(200))
        .heartbeat_interval(Duration::from_millis(10))
        .request_timeout(Duration::from_millis(200));
    let balancer = LoadBalancer::new(&config, Arc::new(InMemorySupervisor::new())).unwrap();
    if initial > 0 {
        balancer.scaling().bootstrap(initial).await.unwrap();
    }
    build_router(AppState::from(&balancer))
}

async fn read_body(response: axum::response::Response) -> (StatusCode, String) {
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");
    (status, String::from_utf8(body.to_vec()).expect("body should be utf-8"))
}

async fn send_json(
    app: &axum::Router,
    method: Method,
    uri: &str,
    payload: Value,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("response expected");
    let (status, body) = read_body(response).await;
    let json = serde_json::from_str::<Value>(&body).expect("body should be valid JSON");
    (status, json)
}

async fn send_get(app: &axum::Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("response expected");
    read_body(response).await
}

#[tokio::test]
async fn rep_lists_initial_pool() {
    let app = app_with_pool(3).await;

    let (status, body) = send_get(&app, "/rep").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        body,
        json!({
            "message": {"N": 3, "replicas": ["Server1", "Server2", "Server3"]},
            "status": "successful"
        })
    );
}

#[tokio::test]
async fn add_then_remove_replicas() {
    let app = app_with_pool(3).await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/add",
        json!({"n": 2, "hostnames": ["S5"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "successful");
    assert_eq!(body["message"]["N"], 5);
    let replicas = body["message"]["replicas"].as_array().unwrap();
    assert!(replicas.contains(&json!("S5")));
    assert!(body["message"].get("failed").is_none());

    let (status, body) = send_json(
        &app,
        Method::DELETE,
        "/rm",
        json!({"n": 2, "hostnames": ["Server1"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"]["N"], 3);
    let replicas = body["message"]["replicas"].as_array().unwrap();
    assert!(!replicas.contains(&json!("Server1")));
}

#[tokio::test]
async fn add_with_too_many_hostnames_is_rejected() {
    let app = app_with_pool(3).await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/add",
        json!({"n": 1, "hostnames": ["a", "b"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failure");
    assert_eq!(
        body["message"],
        "<Error> Length of hostname list is more than newly added instances"
    );
}

#[tokio::test]
async fn remove_with_too_many_hostnames_is_rejected() {
    let app = app_with_pool(3).await;

    let (status, body) = send_json(
        &app,
        Method::DELETE,
        "/rm",
        json!({"n": 0, "hostnames": ["Server1"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "<Error> Length of hostname list is more than removable instances"
    );
}

#[tokio::test]
async fn add_beyond_ring_capacity_is_rejected() {
    let app = app_with_pool(3).await;

    let (status, body) = send_json(&app, Method::POST, "/add", json!({"n": 2_000_000})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failure");

    let (_, rep) = send_get(&app, "/rep").await;
    let rep: Value = serde_json::from_str(&rep).unwrap();
    assert_eq!(rep["message"]["N"], 3);
}

#[tokio::test]
async fn remove_beyond_pool_size_is_rejected() {
    let app = app_with_pool(3).await;

    let (status, body) = send_json(&app, Method::DELETE, "/rm", json!({"n": 5})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failure");

    let (_, rep) = send_get(&app, "/rep").await;
    let rep: Value = serde_json::from_str(&rep).unwrap();
    assert_eq!(rep["message"]["N"], 3);
}

#[tokio::test]
async fn malformed_scale_body_is_rejected() {
    let app = app_with_pool(1).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/add")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let (status, body) = read_body(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "failure");
}

#[tokio::test]
async fn home_is_forwarded_to_a_replica() {
    let app = app_with_pool(3).await;

    let (status, body) = send_get(&app, "/home").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "successful");
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .starts_with("Hello from Server: ")
    );
}

#[tokio::test]
async fn unknown_endpoint_is_bad_request() {
    let app = app_with_pool(3).await;

    let (status, body) = send_get(&app, "/other").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        body,
        json!({
            "message": "<Error> '/other' endpoint does not exist in server replicas",
            "status": "failure"
        })
    );
}

#[tokio::test]
async fn empty_pool_is_bad_request() {
    let app = app_with_pool(0).await;

    let (status, body) = send_get(&app, "/home").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        body["message"],
        "<Error> No available server to handle request"
    );
}

#[tokio::test]
async fn worker_router_serves_backend_endpoints() {
    let worker = build_worker_router("7");

    let (status, body) = send_get(&worker, "/home").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["message"], "Hello from Server: 7");

    let (status, body) = send_get(&worker, "/heartbeat").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let (status, body) = send_get(&worker, "/id").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body, json!({"server_id": "7"}));
}
