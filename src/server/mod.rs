//! Tool server: the external request/response protocol for LLM agents.
//!
//! Every request is scoped to exactly one project by the URL path
//! (`/mcp/<projectId>`); the envelope is `{ tool, params }` in, `{ result }`
//! or `{ error: { code, message } }` out. Responses are discrete JSON, no
//! streaming, no authentication (local bind only).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::constants::{
    DEFAULT_SEARCH_K, MAX_SEARCH_K, RETRIEVAL_TIMEOUT_SECS, STATUS_EVENT_INTERVAL_SECS,
};
use crate::error::SemIndexError;
use crate::events::UiEvent;
use crate::service::ProjectService;

/// Request envelope.
#[derive(Debug, Deserialize)]
struct ToolRequest {
    tool: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    k: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OutlineParams {
    path: String,
    #[serde(default)]
    depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeSourceParams {
    id: String,
    #[serde(default)]
    collapse_body: bool,
}

/// Shared server state: the service plus telemetry counters.
pub struct ServerState {
    service: Arc<ProjectService>,
    started: Instant,
    total_requests: AtomicU64,
    total_response_micros: AtomicU64,
    active_connections: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl ServerState {
    pub fn new(service: Arc<ProjectService>) -> Arc<Self> {
        Arc::new(Self {
            service,
            started: Instant::now(),
            total_requests: AtomicU64::new(0),
            total_response_micros: AtomicU64::new(0),
            active_connections: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        })
    }

    fn record(&self, elapsed: Duration, error: Option<&SemIndexError>) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if let Some(error) = error {
            *self.last_error.lock().unwrap() = Some(error.to_string());
        }
    }

    fn status_event(&self) -> UiEvent {
        let requests = self.total_requests.load(Ordering::Relaxed);
        let avg_ms = if requests == 0 {
            0.0
        } else {
            self.total_response_micros.load(Ordering::Relaxed) as f64 / requests as f64 / 1000.0
        };
        UiEvent::ServerStatus {
            is_running: true,
            uptime_seconds: self.started.elapsed().as_secs(),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_requests: requests,
            avg_response_time_ms: avg_ms,
            last_error: self.last_error.lock().unwrap().clone(),
        }
    }
}

/// Build the router for the tool protocol.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/mcp/:project_id", post(handle_tool))
        .route("/mcp", post(missing_project))
        .route("/mcp/", post(missing_project))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn missing_project() -> Response {
    error_response(&SemIndexError::ProjectRequired)
}

fn error_response(error: &SemIndexError) -> Response {
    let status = match error {
        SemIndexError::ProjectNotFound(_) | SemIndexError::NotFound(_) => StatusCode::NOT_FOUND,
        SemIndexError::ProjectRequired
        | SemIndexError::InvalidQuery(_)
        | SemIndexError::InvalidPath(_)
        | SemIndexError::PathOutsideRoot(_) => StatusCode::BAD_REQUEST,
        SemIndexError::ResourceLimitExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = json!({
        "error": {
            "code": error.code(),
            "message": error.to_string(),
        }
    });
    (status, Json(body)).into_response()
}

async fn handle_tool(
    State(state): State<Arc<ServerState>>,
    AxumPath(project_id): AxumPath<String>,
    Json(request): Json<ToolRequest>,
) -> Response {
    state.active_connections.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();

    let result = tokio::time::timeout(
        Duration::from_secs(RETRIEVAL_TIMEOUT_SECS),
        dispatch(&state, &project_id, request),
    )
    .await
    .unwrap_or_else(|_| {
        Err(SemIndexError::Other(
            "request exceeded the retrieval time budget".to_string(),
        ))
    });

    state.active_connections.fetch_sub(1, Ordering::Relaxed);
    match result {
        Ok(value) => {
            state.record(started.elapsed(), None);
            Json(json!({ "result": value })).into_response()
        }
        Err(error) => {
            // Never leak internals; the taxonomy code plus a readable
            // message is the whole surface.
            warn!(project = %project_id, tool_error = %error, "tool request failed");
            state.record(started.elapsed(), Some(&error));
            error_response(&error)
        }
    }
}

async fn dispatch(
    state: &Arc<ServerState>,
    project_id: &str,
    request: ToolRequest,
) -> Result<Value, SemIndexError> {
    if project_id.trim().is_empty() {
        return Err(SemIndexError::ProjectRequired);
    }
    let service = &state.service;

    let value = match request.tool.as_str() {
        "search" => {
            let params: SearchParams = parse_params(request.params)?;
            let k = params
                .k
                .unwrap_or(DEFAULT_SEARCH_K as i64)
                .clamp(1, MAX_SEARCH_K as i64);
            let response = service.search(project_id, &params.query, k)?;
            json!({
                "results": response.results,
                "totalResults": response.total_results,
                "queryTimeMs": response.query_time_ms,
            })
        }
        "outline" => {
            let params: OutlineParams = parse_params(request.params)?;
            let mut outline = service.get_file_outline(project_id, &params.path)?;
            if let Some(depth) = params.depth {
                for node in &mut outline {
                    node.truncate_depth(depth.max(1));
                }
            }
            json!({ "outline": outline })
        }
        "nodeSource" => {
            let params: NodeSourceParams = parse_params(request.params)?;
            let source = service.node_source(project_id, &params.id, params.collapse_body)?;
            serde_json::to_value(source)
                .map_err(|e| SemIndexError::Other(format!("serialize response: {e}")))?
        }
        "status" => {
            let stats = service.store_for(project_id)?.get_stats()?;
            let progress = service.get_progress(project_id);
            json!({ "stats": stats, "progress": progress })
        }
        other => {
            return Err(SemIndexError::InvalidQuery(format!(
                "unknown tool '{other}'"
            )))
        }
    };

    enforce_response_cap(service, project_id, &value)?;
    Ok(value)
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, SemIndexError> {
    serde_json::from_value(params)
        .map_err(|e| SemIndexError::InvalidQuery(format!("bad params: {e}")))
}

/// Reject responses larger than the project's configured byte cap.
fn enforce_response_cap(
    service: &ProjectService,
    project_id: &str,
    value: &Value,
) -> Result<(), SemIndexError> {
    let limit = service
        .store_for(project_id)
        .and_then(|s| s.load_project_metadata())
        .map(|p| p.config.max_response_bytes)
        .unwrap_or(crate::constants::DEFAULT_MAX_RESPONSE_BYTES);
    let size = serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0);
    if size > limit {
        return Err(SemIndexError::ResourceLimitExceeded { limit });
    }
    Ok(())
}

/// Run the tool server until the cancellation token fires. Also drives the
/// periodic status telemetry events.
pub async fn serve(
    service: Arc<ProjectService>,
    addr: std::net::SocketAddr,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let state = ServerState::new(service.clone());
    let app = router(state.clone());

    // Periodic status telemetry, fire-and-forget to the UI bus
    let telemetry_state = state.clone();
    let telemetry_cancel = cancel.clone();
    let events = service.events().clone();
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(STATUS_EVENT_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    events.emit(telemetry_state.status_event());
                }
                _ = telemetry_cancel.cancelled() => break,
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "🚀 tool server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    info!("✅ tool server shut down");
    Ok(())
}
