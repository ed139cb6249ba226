//! Axum-based HTTP server for the execution service.

use axum::{
    extract::{DefaultBodyLimit, Json, MatchedPath, Multipart, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use code_runner_core::{
    config::{ServerConfig, UploadConfig},
    types::{ExecutionId, ExecutionResult, InlineSubmission, ProjectSubmission},
    Error, Result,
};
use code_runner_sandbox::ExecutionService;

use crate::upload::receive_project;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Enable CORS.
    pub enable_cors: bool,
    /// Enable request tracing.
    pub enable_tracing: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for GatewayConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            enable_cors: server.enable_cors,
            enable_tracing: server.enable_tracing,
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub service: ExecutionService,
    /// Parent directory for uploaded projects.
    pub upload_root: PathBuf,
}

use metrics_exporter_prometheus::PrometheusHandle;

/// Gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<AppState>,
    max_upload_bytes: usize,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: GatewayConfig, service: ExecutionService, uploads: &UploadConfig) -> Self {
        Self {
            config,
            state: Arc::new(AppState {
                service,
                upload_root: PathBuf::from(&uploads.root_dir),
            }),
            max_upload_bytes: uploads.max_upload_bytes,
            metrics_handle: None,
        }
    }

    /// Set metrics handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/execute", post(execute_handler))
            .route(
                "/execute-with-files",
                post(execute_with_files_handler)
                    .layer(DefaultBodyLimit::max(self.max_upload_bytes)),
            )
            .route("/status/:execution_id", get(status_handler))
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(self.state.clone());

        if let Some(handle) = &self.metrics_handle {
            let handle = handle.clone();
            router = router.route("/metrics", get(move || async move { handle.render() }));
        }

        if self.config.enable_cors {
            router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
        }

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Run the server.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::gateway(format!("Failed to bind: {}", e)))?;

        tracing::info!(addr = %addr, "Code runner listening");

        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| Error::gateway(format!("Server error: {}", e)))?;

        Ok(())
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Service description returned by `GET /`.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Whether the Docker daemon answered.
    pub docker: bool,
}

/// Returned for every accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub execution_id: ExecutionId,
    pub message: String,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

/// Maps service errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            Error::InvalidRequest(_) | Error::SecurityViolation(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST")
            }
            Error::ExecutionNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn root_handler() -> impl IntoResponse {
    Json(ServiceInfo {
        service: "code-runner".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            "GET /health".to_string(),
            "POST /execute".to_string(),
            "POST /execute-with-files".to_string(),
            "GET /status/:execution_id".to_string(),
            "GET /metrics".to_string(),
        ],
    })
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docker: state.service.is_available().await,
    })
}

/// Inline submission handler.
async fn execute_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InlineSubmission>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    tracing::info!(code_len = payload.code.len(), "Received inline submission");

    let execution_id = state.service.submit_inline(payload).await?;

    Ok(Json(SubmissionResponse {
        execution_id,
        message: "Code submitted for execution".to_string(),
    }))
}

/// Multipart project submission handler.
async fn execute_with_files_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let upload = receive_project(&state.upload_root, multipart).await?;

    tracing::info!(
        path = %upload.dir.display(),
        entry_file = %upload.entry_file,
        "Received project submission"
    );

    let submission = ProjectSubmission {
        project_path: upload.dir.clone(),
        entry_file: upload.entry_file,
        timeout: upload.timeout,
    };

    match state.service.submit_project(submission).await {
        Ok(execution_id) => Ok(Json(SubmissionResponse {
            execution_id,
            message: "Project submitted for execution".to_string(),
        })),
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&upload.dir).await {
                tracing::warn!(path = %upload.dir.display(), error = %cleanup, "Failed to remove rejected upload");
            }
            Err(e.into())
        }
    }
}

/// Status query handler.
async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(execution_id): Path<String>,
) -> std::result::Result<Json<ExecutionResult>, ApiError> {
    let result = state
        .service
        .status(&ExecutionId::from_string(execution_id))
        .await?;
    Ok(Json(result))
}

/// Records request count and latency per matched route.
async fn track_metrics(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    code_runner_governance::track_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}
