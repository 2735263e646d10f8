use std::time::Duration;

use tokio_tungstenite::tungstenite;

use crate::identity::SubmissionId;
use crate::state::ConnectionState;

/// Conditions a caller of the session API can observe as `Err`.
///
/// Transport failures never appear here: the supervisor turns them into
/// connection state transitions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// The edit channel is not open. Drop the update; the next edit supersedes it.
    #[error("edit channel for submission {submission_id} is not ready ({state})")]
    ChannelNotReady {
        submission_id: SubmissionId,
        state: ConnectionState,
    },

    /// A finalize exchange for this submission is already pending.
    #[error("submission {0} is already being finalized")]
    SubmissionInProgress(SubmissionId),
}

/// Failures of the edit channel transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("feedback server is unavailable")]
    Unavailable,

    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed by peer")]
    Closed,

    #[error(transparent)]
    WebSocket(tungstenite::Error),
}

impl TransportError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        match &err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed
            }
            tungstenite::Error::Io(io_err)
                if matches!(
                    io_err.kind(),
                    std::io::ErrorKind::ConnectionRefused
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                ) =>
            {
                Self::Unavailable
            }
            _ => Self::WebSocket(err),
        }
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        Self::from_tungstenite(err)
    }
}

/// Failures of the finalize exchange. The coordinator converts every variant
/// into a `SubmissionResult`.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("evaluation service did not respond within {0:?}")]
    Timeout(Duration),

    #[error("evaluation service is unreachable: {0}")]
    Network(String),

    #[error("evaluation service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("malformed evaluation response: {0}")]
    Decode(String),
}

impl EvaluationError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
