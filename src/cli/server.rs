//! HTTP server mode for invoking the pipeline

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{Error, ErrorKind, Result};
use crate::pipeline::{Pipeline, RunResult};
use crate::trigger::{landed_archives, parse_notification};

/// App state shared across handlers
#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
}

/// Request body for the invoke endpoint
#[derive(Debug, Deserialize)]
struct InvokeRequest {
    /// Archive file name under the landing directory
    key: String,
}

/// Response body for the events endpoint
#[derive(Debug, Serialize)]
struct EventsResponse {
    results: Vec<RunResult>,
}

/// Response wrapper
#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

fn status_of(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn error_response(err: &Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        kind => status_of(kind.status_code()),
    };
    (status, Json(ApiResponse::<()>::error(err.to_string()))).into_response()
}

/// Build the application router
pub fn router(pipeline: Pipeline) -> Router {
    let state = AppState { pipeline };

    // Build CORS layer - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/invoke", post(invoke))
        .route("/events", post(events))
        .route("/jobs/:job_id/bookmark", get(get_bookmark))
        .route("/jobs/:job_id/runs", get(list_runs))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Start the HTTP server
pub async fn serve(pipeline: Pipeline, port: u16) -> Result<()> {
    let app = router(pipeline);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::config(format!("Failed to bind to port {port}: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::config(format!("Server error: {e}")))?;

    Ok(())
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Transform a single archive; the HTTP status mirrors the result's status code
async fn invoke(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InvokeRequest>,
) -> Response {
    let result = state.pipeline.run(&request.key).await;
    (status_of(result.status_code), Json(result)).into_response()
}

/// Transform every archive announced by a notification document
async fn events(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let notification = match parse_notification(&body) {
        Ok(notification) => notification,
        Err(e) => return error_response(&e),
    };
    let file_names: Vec<String> =
        landed_archives(&notification, state.pipeline.fetcher().landing_dir())
            .into_iter()
            .map(|a| a.file_name)
            .collect();
    let results = state.pipeline.run_all(&file_names).await;
    Json(EventsResponse { results }).into_response()
}

async fn get_bookmark(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    match state.pipeline.bookmarks().get_bookmark(&job_id).await {
        Ok(bookmark) => Json(ApiResponse::success(bookmark)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn list_runs(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> Response {
    match state.pipeline.bookmarks().list_runs(&job_id).await {
        Ok(runs) => Json(ApiResponse::success(runs)).into_response(),
        Err(e) => error_response(&e),
    }
}
