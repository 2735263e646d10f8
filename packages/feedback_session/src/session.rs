use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::identity::SubmissionId;
use crate::message::{CodeUpdate, FeedbackMessage, SubmissionResult};
use crate::relay::FeedbackRelay;
use crate::state::ConnectionState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Full-lifetime state of one submission's live editing.
///
/// Readers get it through [`crate::SessionSupervisor`]; every mutation of the
/// connection state goes through the supervisor.
pub struct Session {
    id: SubmissionId,
    state: watch::Sender<ConnectionState>,
    /// Present only while a channel is attached.
    outbound: Mutex<Option<mpsc::UnboundedSender<CodeUpdate>>>,
    code: Mutex<Option<CodeUpdate>>,
    relay: FeedbackRelay,
    submission: Mutex<Option<SubmissionResult>>,
    last_error: Mutex<Option<String>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    opened_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(id: SubmissionId, feedback_placeholder: &str) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            id,
            state,
            outbound: Mutex::new(None),
            code: Mutex::new(None),
            relay: FeedbackRelay::new(feedback_placeholder),
            submission: Mutex::new(None),
            last_error: Mutex::new(None),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SubmissionId {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state().accepts_updates()
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Latest feedback text, or the placeholder. Stale values survive disconnects.
    pub fn current_feedback(&self) -> String {
        self.relay.current_feedback()
    }

    pub fn latest_feedback(&self) -> Option<FeedbackMessage> {
        self.relay.latest()
    }

    pub fn subscribe_feedback(&self) -> watch::Receiver<Option<FeedbackMessage>> {
        self.relay.subscribe()
    }

    /// The last buffer that was accepted for sending.
    pub fn code(&self) -> Option<String> {
        lock(&self.code).as_ref().map(|c| c.code().to_string())
    }

    pub fn submission(&self) -> Option<SubmissionResult> {
        lock(&self.submission).clone()
    }

    /// Why the channel last failed, if it did.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    // ── supervisor-only ────────────────────────────────────────────────

    pub(crate) fn relay(&self) -> &FeedbackRelay {
        &self.relay
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue an update on the attached channel. Never suspends.
    pub(crate) fn send(&self, update: CodeUpdate) -> Result<(), SessionError> {
        let outbound = lock(&self.outbound);
        let state = self.state();
        let not_ready = || SessionError::ChannelNotReady {
            submission_id: self.id.clone(),
            state,
        };

        let tx = match outbound.as_ref() {
            Some(tx) if state.accepts_updates() => tx,
            _ => return Err(not_ready()),
        };
        tx.send(update.clone()).map_err(|_| not_ready())?;
        *lock(&self.code) = Some(update);
        Ok(())
    }

    /// Apply a transition if the state machine allows it. Returns whether
    /// the state changed.
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if !current.can_transition_to(next) {
                warn!(
                    "Ignoring illegal transition {} -> {} for submission {}",
                    current, next, self.id
                );
                return false;
            }
            debug!("Submission {}: {} -> {}", self.id, current, next);
            *current = next;
            true
        })
    }

    pub(crate) fn attach(&self, outbound: mpsc::UnboundedSender<CodeUpdate>) {
        *lock(&self.outbound) = Some(outbound);
    }

    pub(crate) fn detach(&self) {
        lock(&self.outbound).take();
    }

    pub(crate) fn record_error(&self, message: String) {
        *lock(&self.last_error) = Some(message);
    }

    pub(crate) fn record_submission(&self, result: SubmissionResult) {
        *lock(&self.submission) = Some(result);
    }

    pub(crate) fn set_task(&self, task: JoinHandle<()>) {
        *lock(&self.task) = Some(task);
    }

    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        lock(&self.task).take()
    }

    /// Move towards `Closed`, stop accepting updates and cancel the channel.
    /// Returns `false` when the session had already closed.
    pub(crate) fn begin_close(&self) -> bool {
        self.detach();
        self.cancel.cancel();
        if self.state().is_terminal() {
            return false;
        }
        if !self.transition(ConnectionState::Closing) {
            self.transition(ConnectionState::Closed);
        }
        true
    }

    /// Resolve once the initial handshake has either opened or failed.
    pub(crate) async fn wait_settled(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| s.is_settled()).await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(SubmissionId::from("7"), "waiting")
    }

    #[test]
    fn new_session_is_idle_with_placeholder() {
        let s = session();
        assert_eq!(s.state(), ConnectionState::Idle);
        assert_eq!(s.current_feedback(), "waiting");
        assert!(s.code().is_none());
        assert!(s.submission().is_none());
    }

    #[test]
    fn send_while_not_open_is_channel_not_ready() {
        let s = session();
        let (tx, _rx) = mpsc::unbounded_channel();
        s.attach(tx);
        s.transition(ConnectionState::Connecting);

        let err = s.send(CodeUpdate::from("x")).unwrap_err();
        assert_eq!(
            err,
            SessionError::ChannelNotReady {
                submission_id: SubmissionId::from("7"),
                state: ConnectionState::Connecting,
            }
        );
        assert_eq!(s.state(), ConnectionState::Connecting);
        assert!(s.code().is_none());
    }

    #[test]
    fn send_while_open_records_buffer() {
        let s = session();
        let (tx, mut rx) = mpsc::unbounded_channel();
        s.attach(tx);
        s.transition(ConnectionState::Connecting);
        s.transition(ConnectionState::Open);

        s.send(CodeUpdate::from("print(1)")).unwrap();
        assert_eq!(s.code().as_deref(), Some("print(1)"));
        assert_eq!(rx.try_recv().unwrap().code(), "print(1)");
    }

    #[test]
    fn send_after_channel_died_is_channel_not_ready() {
        let s = session();
        let (tx, rx) = mpsc::unbounded_channel();
        s.attach(tx);
        s.transition(ConnectionState::Connecting);
        s.transition(ConnectionState::Open);
        drop(rx);

        assert!(s.send(CodeUpdate::from("x")).is_err());
        assert!(s.code().is_none());
    }

    #[test]
    fn illegal_transition_is_ignored() {
        let s = session();
        assert!(!s.transition(ConnectionState::Open));
        assert_eq!(s.state(), ConnectionState::Idle);
    }

    #[test]
    fn begin_close_from_idle_goes_straight_to_closed() {
        let s = session();
        assert!(s.begin_close());
        assert_eq!(s.state(), ConnectionState::Closed);
        assert!(s.cancel_token().is_cancelled());
    }

    #[test]
    fn begin_close_from_open_passes_through_closing() {
        let s = session();
        s.transition(ConnectionState::Connecting);
        s.transition(ConnectionState::Open);
        assert!(s.begin_close());
        assert_eq!(s.state(), ConnectionState::Closing);
    }

    #[test]
    fn begin_close_on_closed_session_is_a_quiet_no_op() {
        let s = session();
        s.transition(ConnectionState::Connecting);
        s.transition(ConnectionState::Closed);
        let mut states = s.watch_state();
        states.borrow_and_update();

        assert!(!s.begin_close());
        assert_eq!(s.state(), ConnectionState::Closed);
        assert!(!states.has_changed().unwrap());
        assert!(s.cancel_token().is_cancelled());
    }
}
