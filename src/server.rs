//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/analyze` | Full pipeline on `{ "image": "<data URI>" }` |
//! | `POST` | `/tags` | Tag generation only |
//! | `POST` | `/summary/extended` | Summary from `{ "imageDescription": "..." }` |
//! | `POST` | `/validate` | Relevance validation of `{ "shortSummary", "isHistorical" }` |
//! | `GET`  | `/history` | Recent analyses, `?tag=<needle>&sort=newest\|oldest` |
//! | `DELETE` | `/history` | Clear the history log |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "analysis_incomplete", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `analysis_incomplete` (422),
//! `schema_mismatch` (502), `model_unavailable` (502), `internal` (500).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::analyze::{AnalysisOutcome, Analyzer};
use crate::config::Config;
use crate::error::{AnalysisError, CompletionError};
use crate::flows::extended_summary::generate_extended_summary;
use crate::flows::tags::generate_tags;
use crate::flows::validation::validate_relevance;
use crate::history::{suggest_tags, HistoryQuery};
use crate::image::ImageInput;
use crate::models::{AnalysisRecord, SummaryResult, ValidationResult};

#[derive(Clone)]
struct AppState {
    analyzer: Arc<Analyzer>,
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let analyzer = Arc::new(Analyzer::from_config(config)?);
    let app = router(analyzer);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "histify server listening");
    println!("Histify server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the API router around an analyzer.
pub fn router(analyzer: Arc<Analyzer>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/analyze", post(handle_analyze))
        .route("/tags", post(handle_tags))
        .route("/summary/extended", post(handle_extended_summary))
        .route("/validate", post(handle_validate))
        .route("/history", get(handle_history).delete(handle_clear_history))
        .layer(cors)
        .with_state(AppState { analyzer })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<CompletionError> for AppError {
    fn from(err: CompletionError) -> Self {
        let code = match err {
            CompletionError::SchemaValidation { .. } => "schema_mismatch",
            CompletionError::ModelInvocation { .. } => "model_unavailable",
        };
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code,
            message: err.to_string(),
        }
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        let notice = err.user_notice();
        match err {
            AnalysisError::Completion(e) => {
                let mut app = AppError::from(e);
                app.message = format!("{} ({})", notice, app.message);
                app
            }
            AnalysisError::EmptyTags => AppError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                code: "analysis_incomplete",
                message: notice.to_string(),
            },
            AnalysisError::InvalidImage(detail) => bad_request(format!("{} ({})", notice, detail)),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /analyze, POST /tags ============

#[derive(Deserialize)]
struct ImageRequest {
    /// `data:image/...;base64,...`
    image: String,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<ImageRequest>,
) -> Result<Json<AnalysisOutcome>, AppError> {
    let image = ImageInput::from_data_uri(&req.image)?;
    let outcome = state.analyzer.analyze(&image).await.map_err(|e| {
        warn!(error = %e, "analysis request failed");
        AppError::from(e)
    })?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
struct TagsResponse {
    tags: Vec<String>,
}

async fn handle_tags(
    State(state): State<AppState>,
    Json(req): Json<ImageRequest>,
) -> Result<Json<TagsResponse>, AppError> {
    let image = ImageInput::from_data_uri(&req.image)?;
    let tags = generate_tags(state.analyzer.backend(), &image).await?;
    Ok(Json(TagsResponse {
        tags: tags.into_vec(),
    }))
}

// ============ POST /summary/extended ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtendedSummaryRequest {
    image_description: String,
}

async fn handle_extended_summary(
    State(state): State<AppState>,
    Json(req): Json<ExtendedSummaryRequest>,
) -> Result<Json<SummaryResult>, AppError> {
    if req.image_description.trim().is_empty() {
        return Err(bad_request("imageDescription must not be empty"));
    }
    let summary = generate_extended_summary(state.analyzer.backend(), &req.image_description).await?;
    Ok(Json(summary))
}

// ============ POST /validate ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest {
    short_summary: String,
    is_historical: bool,
}

async fn handle_validate(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidationResult>, AppError> {
    let result =
        validate_relevance(state.analyzer.backend(), &req.short_summary, req.is_historical).await?;
    Ok(Json(result))
}

// ============ GET /history, DELETE /history ============

#[derive(Serialize)]
struct HistoryResponse {
    items: Vec<AnalysisRecord>,
    /// Tag suggestions for the current filter.
    tags: Vec<String>,
}

async fn handle_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let entries = state
        .analyzer
        .history()
        .entries()
        .await
        .map_err(|e| internal(e.to_string()))?;
    let tags = suggest_tags(&entries, query.tag.as_deref().unwrap_or(""));
    Ok(Json(HistoryResponse {
        items: query.apply(&entries),
        tags,
    }))
}

async fn handle_clear_history(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .analyzer
        .history()
        .clear()
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(serde_json::json!({ "cleared": true })))
}
