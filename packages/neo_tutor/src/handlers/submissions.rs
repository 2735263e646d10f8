use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::{ApiError, api_error};
use crate::AppState;
use crate::handlers::feedback::{EMPTY_CODE_REPLY, FEEDBACK_ERROR_REPLY};
use crate::store::Submission;

const NOT_FOUND: &str = "Submission not found";
pub const EVALUATION_COMPLETE: &str = "Evaluation complete and results saved.";

#[derive(Debug, Deserialize)]
pub struct CreateSubmission {
    pub assignment_id: u64,
}

fn parse_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|_| api_error(StatusCode::NOT_FOUND, NOT_FOUND))
}

pub async fn create_submission_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateSubmission>,
) -> Json<Submission> {
    let submission = state.store.create(req.assignment_id).await;
    info!(
        "Created submission {} for assignment {}",
        submission.id, submission.assignment_id
    );
    Json(submission)
}

pub async fn get_submission_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Submission>, ApiError> {
    let id = parse_id(&id)?;
    state
        .store
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, NOT_FOUND))
}

/// Finalize for review: the latest live snapshot becomes the final content.
/// Re-evaluating an evaluated submission runs the evaluation again.
pub async fn evaluate_submission_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    let content = state
        .store
        .begin_evaluation(id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, NOT_FOUND))?;

    let feedback = if content.trim().is_empty() {
        Ok(EMPTY_CODE_REPLY.to_string())
    } else {
        state
            .producer
            .feedback(&id.to_string(), &content)
            .await
            .map_err(|e| e.to_string())
    };

    match feedback {
        Ok(text) => {
            state.store.finish_evaluation(id, Ok(text.clone())).await;
            info!("Submission {} evaluated", id);
            Ok(Json(serde_json::json!({
                "status": "accepted",
                "message": EVALUATION_COMPLETE,
                "feedback": text,
            })))
        }
        Err(e) => {
            warn!("Evaluation of submission {} failed: {}", id, e);
            state.store.finish_evaluation(id, Err(e)).await;
            Err(api_error(StatusCode::BAD_GATEWAY, FEEDBACK_ERROR_REPLY))
        }
    }
}
