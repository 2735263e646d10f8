//! Values that flow through a session: code snapshots out, feedback in,
//! and the terminal result of a submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full snapshot of the editor buffer. Each update replaces the previous one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUpdate {
    code: String,
}

impl CodeUpdate {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn into_code(self) -> String {
        self.code
    }
}

impl From<&str> for CodeUpdate {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for CodeUpdate {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

/// One unit of feedback text as received from the producer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl FeedbackMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Accepted,
    Rejected,
    Error,
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of one finalize exchange. Never mutated once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub status: SubmissionStatus,
    pub message: String,
    pub completed_at: DateTime<Utc>,
}

impl SubmissionResult {
    pub fn new(status: SubmissionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            completed_at: Utc::now(),
        }
    }

    pub fn accepted(message: impl Into<String>) -> Self {
        Self::new(SubmissionStatus::Accepted, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(SubmissionStatus::Rejected, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(SubmissionStatus::Error, message)
    }

    pub fn is_accepted(&self) -> bool {
        self.status == SubmissionStatus::Accepted
    }
}
