//! Session supervisor: the keyed registry of live sessions and the only
//! component that drives their connection state.
//!
//! Each open session owns one background task that establishes the edit
//! channel, watches it for unexpected termination, reconnects according to
//! the [`ReconnectPolicy`], and winds it down when the session is closed.
//! Submission runs beside that task through the [`SubmissionCoordinator`] and
//! never touches the channel.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{ChannelExit, EditChannel};
use crate::config::{Endpoints, ReconnectPolicy, SessionConfig};
use crate::error::{SessionError, TransportError};
use crate::identity::SubmissionId;
use crate::message::{CodeUpdate, SubmissionResult};
use crate::session::Session;
use crate::state::ConnectionState;
use crate::submission::{EvaluationService, HttpEvaluationService, SubmissionCoordinator};
use crate::transport::{Connection, Connector, WsConnector};

type Registry = RwLock<HashMap<SubmissionId, Arc<Session>>>;

/// Supervisor wired to the WebSocket edit channel and the HTTP finalize call.
pub type LiveSupervisor = SessionSupervisor<WsConnector, HttpEvaluationService>;

pub struct SessionSupervisor<C, E> {
    sessions: Registry,
    connector: Arc<C>,
    coordinator: SubmissionCoordinator<E>,
    config: SessionConfig,
}

impl LiveSupervisor {
    pub fn connect_to(endpoints: Endpoints, config: SessionConfig) -> Self {
        Self::new(
            WsConnector::new(endpoints.clone()),
            HttpEvaluationService::new(endpoints),
            config,
        )
    }
}

impl<C: Connector, E: EvaluationService> SessionSupervisor<C, E> {
    pub fn new(connector: C, evaluator: E, config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connector: Arc::new(connector),
            coordinator: SubmissionCoordinator::new(evaluator, config.submit_timeout),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open (or join) the live session for a submission.
    ///
    /// Resolves once the channel is open or has failed. A failed handshake
    /// yields a `Closed` session rather than an error; calling again starts
    /// a fresh lifecycle.
    pub async fn open_session(&self, id: impl Into<SubmissionId>) -> Arc<Session> {
        let id = id.into();
        let (session, fresh) = {
            let mut sessions = write(&self.sessions);
            match sessions.get(&id) {
                Some(existing) if !existing.state().is_terminal() => (existing.clone(), false),
                _ => {
                    let session = Arc::new(Session::new(
                        id.clone(),
                        &self.config.feedback_placeholder,
                    ));
                    sessions.insert(id.clone(), session.clone());
                    (session, true)
                }
            }
        };

        if fresh {
            debug!("Opening session for submission {}", id);
            let task = tokio::spawn(supervise(
                session.clone(),
                self.connector.clone(),
                self.config.clone(),
            ));
            session.set_task(task);
        } else {
            debug!("Session for submission {} already exists, reusing it", id);
        }

        session.wait_settled().await;
        session
    }

    /// Tear down the session for a submission. Unknown ids are a no-op.
    ///
    /// Cancels queued and in-flight sends; a pending submission is not
    /// affected.
    pub async fn close_session(&self, id: &SubmissionId) {
        let Some(session) = write(&self.sessions).remove(id) else {
            debug!("No session for submission {}, nothing to close", id);
            return;
        };

        session.begin_close();
        if let Some(mut task) = session.take_task() {
            let wait = self.config.close_timeout.saturating_mul(2);
            if tokio::time::timeout(wait, &mut task).await.is_err() {
                warn!(
                    "Session task for submission {} did not stop within {:?}, aborting",
                    id, wait
                );
                task.abort();
            }
        }
        session.transition(ConnectionState::Closed);
        info!("Closed session for submission {}", id);
    }

    /// Push a code snapshot. Never suspends.
    ///
    /// Fails with [`SessionError::ChannelNotReady`] unless the session's
    /// channel is open; the update is then dropped.
    pub fn send(
        &self,
        id: &SubmissionId,
        update: impl Into<CodeUpdate>,
    ) -> Result<(), SessionError> {
        match self.session(id) {
            Some(session) => session.send(update.into()),
            None => Err(SessionError::ChannelNotReady {
                submission_id: id.clone(),
                state: ConnectionState::Closed,
            }),
        }
    }

    /// Latest feedback for a submission, or the placeholder.
    pub fn current_feedback(&self, id: &SubmissionId) -> String {
        match self.session(id) {
            Some(session) => session.current_feedback(),
            None => self.config.feedback_placeholder.clone(),
        }
    }

    /// Finalize a submission for review.
    ///
    /// Works whether or not a session is open and never closes one. The
    /// result is recorded on the session if it is still registered.
    pub async fn submit(&self, id: &SubmissionId) -> Result<SubmissionResult, SessionError> {
        let result = self.coordinator.submit(id).await?;
        if let Some(session) = self.session(id) {
            session.record_submission(result.clone());
        }
        Ok(result)
    }

    pub fn is_submitting(&self, id: &SubmissionId) -> bool {
        self.coordinator.is_pending(id)
    }

    pub fn session(&self, id: &SubmissionId) -> Option<Arc<Session>> {
        read(&self.sessions).get(id).cloned()
    }

    pub fn session_ids(&self) -> Vec<SubmissionId> {
        let mut ids: Vec<_> = read(&self.sessions).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close every registered session.
    pub async fn shutdown(&self) {
        for id in self.session_ids() {
            self.close_session(&id).await;
        }
    }
}

impl<C, E> Drop for SessionSupervisor<C, E> {
    fn drop(&mut self) {
        for session in read(&self.sessions).values() {
            session.cancel_token().cancel();
        }
    }
}

fn read(registry: &Registry) -> RwLockReadGuard<'_, HashMap<SubmissionId, Arc<Session>>> {
    registry.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(registry: &Registry) -> RwLockWriteGuard<'_, HashMap<SubmissionId, Arc<Session>>> {
    registry.write().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle task for one session.
async fn supervise<C: Connector>(session: Arc<Session>, connector: Arc<C>, config: SessionConfig) {
    let cancel = session.cancel_token();
    if cancel.is_cancelled() || !session.transition(ConnectionState::Connecting) {
        return;
    }

    let Some(mut connection) = connect_once(&*connector, &session, &config, &cancel).await else {
        session.transition(ConnectionState::Closed);
        return;
    };

    loop {
        let channel = EditChannel::start(
            session.id().clone(),
            connection,
            session.relay().clone(),
            cancel.child_token(),
            config.close_timeout,
        );
        session.attach(channel.sender());
        if !session.transition(ConnectionState::Open) {
            // closed while the handshake was finishing
            session.detach();
            cancel.cancel();
            channel.finished().await;
            break;
        }
        info!("Edit channel open for submission {}", session.id());

        let exit = channel.finished().await;
        session.detach();

        let err = match exit {
            ChannelExit::Cancelled => break,
            ChannelExit::Terminated(_) if cancel.is_cancelled() => break,
            ChannelExit::Terminated(err) => err,
        };
        warn!(
            "Edit channel for submission {} terminated: {}",
            session.id(),
            err
        );
        session.record_error(err.to_string());

        if !config.reconnect.is_enabled() {
            session.transition(ConnectionState::Closed);
            return;
        }
        session.transition(ConnectionState::Reconnecting);
        match reconnect(&*connector, &session, &config, &cancel).await {
            Some(next) => connection = next,
            None => {
                session.transition(ConnectionState::Closed);
                return;
            }
        }
    }

    session.transition(ConnectionState::Closed);
}

async fn connect_once<C: Connector>(
    connector: &C,
    session: &Session,
    config: &SessionConfig,
    cancel: &CancellationToken,
) -> Option<Connection> {
    let attempt = tokio::time::timeout(config.connect_timeout, connector.connect(session.id()));
    let result = tokio::select! {
        _ = cancel.cancelled() => return None,
        res = attempt => res,
    };

    let err = match result {
        Ok(Ok(connection)) => return Some(connection),
        Ok(Err(e)) => e,
        Err(_) => TransportError::Timeout(config.connect_timeout),
    };
    warn!(
        "Could not connect edit channel for submission {}: {}",
        session.id(),
        err
    );
    session.record_error(err.to_string());
    None
}

async fn reconnect<C: Connector>(
    connector: &C,
    session: &Session,
    config: &SessionConfig,
    cancel: &CancellationToken,
) -> Option<Connection> {
    let ReconnectPolicy { max_attempts, .. } = config.reconnect;
    for attempt in 1..=max_attempts {
        let delay = config.reconnect.backoff(attempt);
        debug!(
            "Reconnecting submission {} (attempt {}/{}) in {:?}",
            session.id(),
            attempt,
            max_attempts,
            delay
        );
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
        if let Some(connection) = connect_once(connector, session, config, cancel).await {
            return Some(connection);
        }
        if cancel.is_cancelled() {
            return None;
        }
    }
    warn!(
        "Giving up on submission {} after {} reconnect attempt(s)",
        session.id(),
        max_attempts
    );
    None
}
