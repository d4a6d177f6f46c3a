//! HTTP server for the layer ingestion API.
//!
//! Provides endpoints for:
//! - `POST /` - Form-encoded operation dispatch (the upload portal posts
//!   `op=download` or `op=delete-s3-file-layers`)
//! - `GET /status` - Get active/recent pipeline runs
//! - `GET /health` - Health check

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use axum::{
    extract::{Extension, Form},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

use ingestion::{IngestionRequest, LayerPipeline};

use crate::access::{self, DownloadFields};

// ============================================================================
// Shared State
// ============================================================================

pub struct ServerState {
    /// Core ingestion pipeline
    pub pipeline: LayerPipeline,
    /// Broadcasts shutdown to in-flight transfers
    pub shutdown: broadcast::Sender<()>,
    /// Serializes pipeline runs; they share the staging tree
    pub run_gate: Mutex<()>,
    /// Tracking for active/completed runs
    pub tracker: RunTracker,
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Form fields posted by the upload portal.
#[derive(Debug, Deserialize)]
pub struct OpForm {
    #[serde(default)]
    pub op: Option<String>,
    #[serde(rename = "fileLayer", default)]
    pub file_layer: Option<String>,
    #[serde(rename = "fileType", default)]
    pub file_type: Option<String>,
    #[serde(rename = "projectName", default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Response body for all portal operations.
#[derive(Debug, Serialize)]
pub struct OpResponse {
    pub success: bool,
    pub message: String,
}

/// Response for /status endpoint.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub active: Vec<ActiveRun>,
    pub recent: Vec<CompletedRun>,
    pub total_completed: usize,
}

// ============================================================================
// Run Tracking
// ============================================================================

/// Tracking for pipeline runs.
pub struct RunTracker {
    active: Mutex<HashMap<String, ActiveRun>>,
    completed: Mutex<VecDeque<CompletedRun>>,
    max_completed: usize,
}

/// An active pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRun {
    pub id: String,
    pub op: String,
    pub layer: Option<String>,
    pub project_id: Option<i64>,
    pub started_at: DateTime<Utc>,
}

/// A completed pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedRun {
    pub id: String,
    pub op: String,
    pub layer: Option<String>,
    pub project_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub files_processed: usize,
    pub error_message: Option<String>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            completed: Mutex::new(VecDeque::new()),
            max_completed: 100,
        }
    }

    pub async fn start(&self, id: &str, op: &str, request: Option<&IngestionRequest>) {
        let run = ActiveRun {
            id: id.to_string(),
            op: op.to_string(),
            layer: request.map(|r| format!("{} {}", r.file_type, r.object_key)),
            project_id: request.map(|r| r.project.project_id_number),
            started_at: Utc::now(),
        };
        self.active.lock().await.insert(id.to_string(), run);
    }

    pub async fn complete(
        &self,
        id: &str,
        success: bool,
        files_processed: usize,
        error_message: Option<String>,
    ) {
        let mut active = self.active.lock().await;
        if let Some(run) = active.remove(id) {
            let completed_at = Utc::now();
            let duration_ms = (completed_at - run.started_at).num_milliseconds() as u64;

            let completed = CompletedRun {
                id: run.id,
                op: run.op,
                layer: run.layer,
                project_id: run.project_id,
                started_at: run.started_at,
                completed_at,
                duration_ms,
                success,
                files_processed,
                error_message,
            };

            let mut completed_list = self.completed.lock().await;
            completed_list.push_front(completed);

            // Keep only recent entries
            while completed_list.len() > self.max_completed {
                completed_list.pop_back();
            }
        }
    }

    pub async fn get_status(&self) -> StatusResponse {
        let active = self.active.lock().await;
        let completed = self.completed.lock().await;

        StatusResponse {
            active: active.values().cloned().collect(),
            recent: completed.iter().take(20).cloned().collect(),
            total_completed: completed.len(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST / - Operation dispatch
async fn op_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Form(form): Form<OpForm>,
) -> Response {
    match form.op.as_deref() {
        Some("download") => download_op(state, form).await,
        Some("delete-s3-file-layers") => purge_op(state).await,
        _ => op_response(StatusCode::BAD_REQUEST, false, "Invalid request."),
    }
}

async fn download_op(state: Arc<ServerState>, form: OpForm) -> Response {
    let Ok(_running) = state.run_gate.try_lock() else {
        return op_response(
            StatusCode::TOO_MANY_REQUESTS,
            false,
            "Another file layer operation is in progress.",
        );
    };

    let fields = DownloadFields {
        file_layer: form.file_layer,
        file_type: form.file_type,
        project_name: form.project_name,
        email: form.email,
    };

    let request = match access::resolve_download_request(state.pipeline.catalog(), &fields).await {
        Ok(request) => request,
        Err(e) => {
            info!(status = e.status, message = %e.message, "Rejected download request");
            return op_response(status_code(e.status), false, &e.message);
        }
    };

    let id = Uuid::new_v4().to_string();
    info!(
        id = %id,
        file_type = %request.file_type,
        key = %request.object_key,
        project = %request.project.project_name,
        "Received download request"
    );

    state.tracker.start(&id, "download", Some(&request)).await;

    let mut shutdown = state.shutdown.subscribe();
    match state.pipeline.ingest(&request, &mut shutdown).await {
        Ok(report) => {
            state
                .tracker
                .complete(&id, true, report.files_staged, None)
                .await;

            op_response(StatusCode::OK, true, "All files downloaded successfully.")
        }
        Err(e) => {
            error!(id = %id, error = %e, "Download failed");

            state
                .tracker
                .complete(&id, false, 0, Some(e.to_string()))
                .await;

            op_response(status_code(e.http_status()), false, &e.to_string())
        }
    }
}

async fn purge_op(state: Arc<ServerState>) -> Response {
    let Ok(_running) = state.run_gate.try_lock() else {
        return op_response(
            StatusCode::TOO_MANY_REQUESTS,
            false,
            "Another file layer operation is in progress.",
        );
    };

    let id = Uuid::new_v4().to_string();
    info!(id = %id, "Received purge request");

    state.tracker.start(&id, "delete-s3-file-layers", None).await;

    match state.pipeline.purge_remote_layers().await {
        Ok(report) => {
            info!(
                id = %id,
                files_deleted = report.files_deleted,
                data_pool_rows = report.catalog_rows.data_pool,
                "Purge complete"
            );

            state
                .tracker
                .complete(&id, true, report.files_deleted, None)
                .await;

            op_response(StatusCode::OK, true, "Deleted successfully.")
        }
        Err(e) => {
            error!(id = %id, error = %e, "Purge failed");

            state
                .tracker
                .complete(&id, false, 0, Some(e.to_string()))
                .await;

            op_response(status_code(e.http_status()), false, &e.to_string())
        }
    }
}

/// GET /status - Get pipeline run status
async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let status = state.tracker.get_status().await;
    Json(status)
}

/// GET /health - Health check
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "layer-api"
    }))
}

/// Any non-POST verb on the operation endpoint
async fn invalid_method_handler() -> Response {
    op_response(
        StatusCode::METHOD_NOT_ALLOWED,
        false,
        "Invalid request method.",
    )
}

// ============================================================================
// Helpers
// ============================================================================

fn op_response(status: StatusCode, success: bool, message: &str) -> Response {
    (
        status,
        Json(OpResponse {
            success,
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Router
// ============================================================================

/// Build the HTTP router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(op_handler).fallback(invalid_method_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(Extension(state))
}

/// Start the HTTP server.
pub async fn run_server(
    state: Arc<ServerState>,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(port = port, "Starting layer API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
        })
        .await?;

    Ok(())
}
