use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use tracing::{debug, info, warn};

use crate::AppState;

pub const EMPTY_CODE_REPLY: &str = "Start typing your pseudocode for feedback...";
pub const FEEDBACK_ERROR_REPLY: &str = "Error getting feedback from AI.";
pub const UNKNOWN_SUBMISSION_REPLY: &str = "Error: Submission not found.";

/// Live edit channel: every text frame is a full code snapshot, answered
/// with one feedback frame.
pub async fn feedback_ws_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_feedback_socket(socket, id, state))
}

async fn handle_feedback_socket(mut socket: WebSocket, id: String, state: AppState) {
    info!("Feedback channel opened for submission {}", id);
    let mut handled: u64 = 0;

    // Sequential: the next snapshot is read only after this one is answered.
    while let Some(frame) = socket.recv().await {
        let code = match frame {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Feedback channel for submission {} failed: {}", id, e);
                break;
            }
        };

        let reply = feedback_for(&state, &id, &code).await;
        handled += 1;
        if socket.send(Message::Text(reply.into())).await.is_err() {
            break;
        }
    }

    info!(
        "Feedback channel closed for submission {} after {} update(s)",
        id, handled
    );
}

pub(crate) async fn feedback_for(state: &AppState, id: &str, code: &str) -> String {
    let known = match id.parse::<u64>() {
        Ok(n) => state.store.record_code(n, code).await,
        Err(_) => false,
    };

    if code.trim().is_empty() {
        return EMPTY_CODE_REPLY.to_string();
    }
    if !known {
        debug!("Snapshot for unknown submission {}", id);
        return UNKNOWN_SUBMISSION_REPLY.to_string();
    }

    match state.producer.feedback(id, code).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Feedback for submission {} failed: {}", id, e);
            FEEDBACK_ERROR_REPLY.to_string()
        }
    }
}
