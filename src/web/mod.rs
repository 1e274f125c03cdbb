//! Control-plane and routing endpoints.
//!
//! - `GET /rep` lists the replica pool.
//! - `POST /add` and `DELETE /rm` scale it.
//! - `GET /<path>` is routed to a replica through the ring.

use crate::LoadBalancer;
use crate::cluster::ReplicaSet;
use crate::core::RouterError;
use crate::router::RequestRouter;
use crate::scaling::{ProvisionFailure, ScaleOutcome, ScalingController};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RequestRouter>,
    pub scaling: Arc<ScalingController>,
}

impl AppState {
    pub fn new(router: Arc<RequestRouter>, scaling: Arc<ScalingController>) -> Self {
        Self { router, scaling }
    }
}

impl From<&LoadBalancer> for AppState {
    fn from(balancer: &LoadBalancer) -> Self {
        Self::new(
            Arc::clone(balancer.router()),
            Arc::clone(balancer.scaling()),
        )
    }
}

/// Body of `POST /add` and `DELETE /rm`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScaleRequest {
    #[serde(default)]
    pub n: usize,
    #[serde(default)]
    pub hostnames: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub message: T,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ScaleMessage {
    #[serde(flatten)]
    pub replicas: ReplicaSet,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<ProvisionFailure>,
}

impl From<ScaleOutcome> for ApiResponse<ScaleMessage> {
    fn from(outcome: ScaleOutcome) -> Self {
        let status = if outcome.is_complete() {
            "successful"
        } else {
            "partial"
        };
        Self {
            message: ScaleMessage {
                replicas: outcome.replicas,
                failed: outcome.failed,
            },
            status,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Router(RouterError),
    /// The replica answered, but not with success, for `path`.
    MissingEndpoint { path: String },
    Input(String),
}

impl From<RouterError> for WebError {
    fn from(err: RouterError) -> Self {
        WebError::Router(err)
    }
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        WebError::Input(rejection.body_text())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebError::Input(msg) | WebError::Router(RouterError::InvalidRequest(msg)) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            WebError::Router(
                err @ (RouterError::InsufficientReplicas { .. }
                | RouterError::InsufficientCapacity { .. }),
            ) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            WebError::Router(RouterError::NoAvailableServer(_) | RouterError::EmptyRing) => (
                StatusCode::BAD_REQUEST,
                "No available server to handle request".to_string(),
            ),
            WebError::MissingEndpoint { path } => (
                StatusCode::BAD_REQUEST,
                format!("'/{}' endpoint does not exist in server replicas", path),
            ),
            WebError::Router(err) => {
                error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error: {}", err),
                )
            }
        };

        let body = Json(ApiResponse {
            message: format!("<Error> {}", message),
            status: "failure",
        });
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/rep", get(list_replicas))
        .route("/add", post(add_replicas))
        .route("/rm", delete(remove_replicas))
        .route("/*path", get(forward))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_replicas(State(state): State<AppState>) -> Json<ApiResponse<ReplicaSet>> {
    Json(ApiResponse {
        message: state.scaling.replica_set().await,
        status: "successful",
    })
}

async fn add_replicas(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ScaleRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ScaleMessage>>> {
    let Json(request) = payload?;
    let outcome = state.scaling.scale_add(request.n, request.hostnames).await?;
    Ok(Json(outcome.into()))
}

async fn remove_replicas(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ScaleRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ScaleMessage>>> {
    let Json(request) = payload?;
    let outcome = state
        .scaling
        .scale_remove(request.n, request.hostnames)
        .await?;
    Ok(Json(outcome.into()))
}

async fn forward(State(state): State<AppState>, Path(path): Path<String>) -> Result<Response> {
    match state.router.route(&path).await {
        Ok(routed) => Ok((StatusCode::OK, routed.response.body).into_response()),
        Err(RouterError::Upstream {
            status: Some(_), ..
        }) => Err(WebError::MissingEndpoint { path }),
        Err(err) => Err(err.into()),
    }
}
