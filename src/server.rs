//! HTTP transport.
//!
//! Routes:
//! - `GET /health`: liveness
//! - `GET /analyze`: Mermaid source of the graph
//! - `POST /analyze`: run an analysis and return the report
//! - `POST /analyze-stream`: run an analysis as server-sent events

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::core::{GraphError, Pipeline, StreamMessage};
use crate::domain::AnalyzedSegment;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub report: String,
    pub details: Vec<AnalyzedSegment>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// A failed analysis as an HTTP response
#[derive(Debug)]
pub struct ApiError(GraphError);

impl From<GraphError> for ApiError {
    fn from(e: GraphError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GraphError::InputTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GraphError::Compile(_) | GraphError::Stalled { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_GATEWAY,
        };
        warn!(status = %status, error = %self.0, "Analysis request failed");

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/analyze", get(graph_diagram).post(analyze))
        .route("/analyze-stream", axum::routing::post(analyze_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `address` and serve until the process stops
pub async fn serve(pipeline: Pipeline, address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!(address, "Listening");

    axum::serve(listener, build_router(AppState::new(pipeline)))
        .await
        .context("Server error")
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn graph_diagram(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.pipeline.graph().to_mermaid(),
    )
}

async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let execution = state.pipeline.run(request.content).await?;

    Ok(Json(AnalyzeResponse {
        report: execution.state.report,
        details: execution.state.details,
    }))
}

async fn analyze_stream(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    state.pipeline.check_input(&request.content)?;

    let events = state
        .pipeline
        .stream(request.content)
        .map(|message| Ok(to_sse_event(&message)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse_event(message: &StreamMessage) -> Event {
    Event::default()
        .event(message.event_name())
        .data(message.payload().to_string())
}
