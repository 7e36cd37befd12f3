//! HTTP route handlers for the chat digest API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::digest::core::errors::DigestError;
use crate::digest::ingest::conversation::Conversation;
use crate::digest::summarization::pipeline::Submission;
use crate::digest::summarization::result::{SummaryResult, TaskLookup};

use super::state::AppState;

/// Body of the 404 answer for unknown task ids.
pub const SUMMARY_NOT_FOUND: &str = "Resumen no encontrado";

const HEALTH_PATH: &str = "/health";
const WEBHOOK_PATH: &str = "/webhook/messages";
const SUMMARY_PATH: &str = "/summary/{task_id}";

/// Method and path of every API route.
pub const ROUTES: [(&str, &str); 3] = [
    ("GET", HEALTH_PATH),
    ("POST", WEBHOOK_PATH),
    ("GET", SUMMARY_PATH),
];

/// Create the API router with all routes.
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_check))
        .route(WEBHOOK_PATH, post(submit_messages))
        .route(SUMMARY_PATH, get(get_summary))
        .with_state(state)
}

/// Error payload returned by every failing route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human readable reason.
    pub error: String,
}

/// Status code plus an `{error}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<DigestError> for ApiError {
    fn from(err: DigestError) -> Self {
        let status = match err {
            DigestError::InvalidConversation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Unreadable or mistyped payloads are client validation errors;
        // size and content-type rejections keep their own status.
        let status = match rejection {
            JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => rejection.status(),
        };
        Self::new(status, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-digest",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Accept a conversation and answer with its stored summary task.
///
/// The submission runs on its own task so a dropped connection does not
/// cancel it halfway.
async fn submit_messages(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Conversation>, JsonRejection>,
) -> Result<Json<Submission>, ApiError> {
    let Json(conversation) = payload?;

    let pipeline = Arc::clone(&state.pipeline);
    let submission = tokio::spawn(async move { pipeline.submit(conversation).await })
        .await
        .map_err(|e| {
            tracing::error!("Submission task failed: {e}");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "submission task failed")
        })??;

    Ok(Json(submission))
}

/// Return the stored result for a task id.
async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<SummaryResult>, ApiError> {
    match state.pipeline.retrieve(&task_id).await? {
        TaskLookup::Found(result) => Ok(Json(result)),
        TaskLookup::NotFound => Err(ApiError::new(StatusCode::NOT_FOUND, SUMMARY_NOT_FOUND)),
    }
}
