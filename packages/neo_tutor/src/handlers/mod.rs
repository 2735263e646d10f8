pub mod feedback;
pub mod health;
pub mod submissions;

pub use feedback::feedback_ws_handler;
pub use health::health_handler;
pub use submissions::{create_submission_handler, evaluate_submission_handler, get_submission_handler};

use axum::{Json, http::StatusCode};

/// Error body in the `{"detail": ...}` shape clients already parse.
pub(crate) type ApiError = (StatusCode, Json<serde_json::Value>);

pub(crate) fn api_error(status: StatusCode, detail: &str) -> ApiError {
    (status, Json(serde_json::json!({ "detail": detail })))
}
