//! Web API Server
//!
//! Exposes the hybrid sentiment router over HTTP.
//!
//! ## Endpoints
//!
//! - `GET  /`: Service description and endpoint list
//! - `GET  /health`: Health check with component names and counters
//! - `GET  /info`: Class set, routing thresholds and limits
//! - `POST /analyze`: Analyse one text
//! - `POST /batch_analyze`: Analyse a bounded batch of texts
//! - `GET  /metrics`: Prometheus metrics

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::{BatchCoordinator, BatchReport};
use crate::config::ServerConfig;
use crate::orchestrator::AnalysisResult;
use crate::predictor::SentimentLabel;
use crate::SentimentError;

// ============================================================================
// Types
// ============================================================================

/// Accepted values of `force_model`.
const FORCE_MODEL_VALUES: [&str; 2] = ["fast", "accurate"];

/// JSON body for `POST /analyze`.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Text to classify.
    pub text: String,
    /// `"fast"` or `"accurate"`. Validated, but routing stays automatic.
    #[serde(default)]
    pub force_model: Option<String>,
}

/// JSON body for `POST /batch_analyze`.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAnalyzeRequest {
    /// Texts to classify, at most `batch.max_batch_size`.
    pub texts: Vec<String>,
    /// `"fast"` or `"accurate"`. Validated, but routing stays automatic.
    #[serde(default)]
    pub force_model: Option<String>,
}

/// Shared application state available to all handlers.
struct AppState {
    coordinator: Arc<BatchCoordinator>,
}

// ============================================================================
// Server
// ============================================================================

/// Build the router with all endpoints and middleware.
///
/// # Panics
///
/// This function never panics.
pub fn router(coordinator: Arc<BatchCoordinator>, max_request_size: usize) -> Router {
    let state = Arc::new(AppState { coordinator });

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .route("/analyze", post(analyze_handler))
        .route("/batch_analyze", post(batch_analyze_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn_with_state(
            max_request_size,
            body_size_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web API server.
///
/// Binds to `config.host:config.port` and serves until the process exits.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
///
/// # Panics
///
/// This function never panics.
pub async fn start_server(
    config: ServerConfig,
    coordinator: Arc<BatchCoordinator>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.host, config.port);

    info!("Starting web API server on http://{}", addr);

    let app = router(coordinator, config.max_request_size);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Web API ready on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Middleware
// ============================================================================

/// Adds a unique `X-Request-ID` header to every response.
///
/// If the client sends an `X-Request-ID` header, it is preserved; otherwise
/// a new UUID v4 is generated.
///
/// # Panics
///
/// This function never panics.
async fn request_id_middleware(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Rejects requests whose `Content-Length` exceeds `max_size` with 413.
///
/// # Panics
///
/// This function never panics.
async fn body_size_middleware(
    State(max_size): State<usize>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(content_length) = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if content_length > max_size {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(serde_json::json!({"error": "Request body too large"})),
            )
                .into_response();
        }
    }

    next.run(req).await
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /`: Service description.
async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Hybrid sentiment analysis service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "analyze": "POST /analyze",
            "batch_analyze": "POST /batch_analyze",
            "health": "GET /health",
            "info": "GET /info",
            "metrics": "GET /metrics",
        },
    }))
}

/// `GET /health`: Health check.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let orchestrator = state.coordinator.orchestrator();
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "components": {
            "fast_model": orchestrator.fast_name(),
            "accurate_model": orchestrator.accurate_name(),
            "router": "rule_chain",
        },
        "metrics": crate::metrics::get_metrics_summary(),
    }))
}

/// `GET /info`: Class set, routing thresholds and limits.
async fn info_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let orchestrator = state.coordinator.orchestrator();
    let routing = orchestrator.policy().config();
    Json(serde_json::json!({
        "classes": SentimentLabel::ALL,
        "routing": {
            "description": "Fast model by default; escalate to the accurate model on nuance \
                            vocabulary, excessive length, low fast confidence or high complexity",
            "rules": ["EMPTY_TEXT", "PATTERN_MATCH", "TOO_LONG", "LOW_CONFIDENCE", "HIGH_COMPLEXITY"],
            "min_fast_confidence": routing.min_fast_confidence,
            "max_fast_length": routing.max_fast_length,
            "high_complexity_threshold": routing.high_complexity_threshold,
        },
        "limits": {
            "max_text_length": orchestrator.max_text_length(),
            "max_batch_size": state.coordinator.config().max_batch_size,
        },
    }))
}

/// `POST /analyze`: Analyse one text.
///
/// Returns 400 for an empty text or unknown `force_model`, 422 if the
/// analysis fails, otherwise the [`AnalysisResult`].
async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResult>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Text must not be empty".to_string()));
    }
    check_force_model(req.force_model.as_deref())?;

    let result = state.coordinator.orchestrator().analyze(&req.text).await;
    if !result.success {
        let message = result.error.unwrap_or_else(|| "Analysis failed".to_string());
        warn!(error = %message, "Analysis failed");
        return Err(AppError::Unprocessable(message));
    }

    Ok(Json(result))
}

/// `POST /batch_analyze`: Analyse a bounded batch.
///
/// Returns 400 if the batch is rejected, otherwise `{results, statistics}`.
async fn batch_analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchAnalyzeRequest>,
) -> Result<Json<BatchReport>, AppError> {
    check_force_model(req.force_model.as_deref())?;

    let report = state.coordinator.analyze_batch(req.texts).await?;
    Ok(Json(report))
}

/// `GET /metrics`: Prometheus metrics endpoint.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

fn check_force_model(force_model: Option<&str>) -> Result<(), AppError> {
    match force_model {
        Some(model) if !FORCE_MODEL_VALUES.contains(&model) => Err(AppError::BadRequest(format!(
            "force_model must be 'fast' or 'accurate', got '{model}'"
        ))),
        _ => Ok(()),
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Handler errors mapped to HTTP responses.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug)]
enum AppError {
    /// The request is malformed or violates an input limit.
    BadRequest(String),
    /// The request was valid but the analysis failed.
    Unprocessable(String),
    /// Anything else.
    Internal(String),
}

impl From<SentimentError> for AppError {
    fn from(e: SentimentError) -> Self {
        match e {
            SentimentError::Validation(v) => Self::BadRequest(v.to_string()),
            SentimentError::Predictor { .. } | SentimentError::PredictorPanicked { .. } => {
                Self::Unprocessable(e.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AppError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            AppError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };

        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================
