//! In-process stand-ins for the feedback server and the evaluation service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::SinkExt;
use futures::channel::mpsc as fmpsc;
use tokio::sync::mpsc;

use crate::error::{EvaluationError, TransportError};
use crate::identity::SubmissionId;
use crate::message::SubmissionResult;
use crate::submission::EvaluationService;
use crate::transport::{Connection, Connector};

/// The server's half of one fake connection.
pub(crate) struct ServerEnd {
    pub id: SubmissionId,
    /// Code payloads sent by the client, in order.
    pub received: fmpsc::UnboundedReceiver<String>,
    /// Push feedback (or a transport failure) to the client. Drop to hang up.
    pub feedback: fmpsc::UnboundedSender<Result<String, TransportError>>,
}

impl ServerEnd {
    pub fn reply(&self, text: &str) {
        self.feedback
            .unbounded_send(Ok(text.to_string()))
            .expect("client end dropped");
    }
}

#[derive(Default)]
struct ConnectorState {
    attempts: usize,
    failures_queued: usize,
    delay: Option<Duration>,
}

#[derive(Clone)]
pub(crate) struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
    ends_tx: mpsc::UnboundedSender<ServerEnd>,
}

impl FakeConnector {
    /// Returns the connector and a receiver yielding the server end of
    /// every successful connection.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (ends_tx, ends_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(ConnectorState::default())),
            ends_tx,
        };
        (connector, ends_rx)
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = Some(delay);
        self
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().failures_queued = n;
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }
}

impl Connector for FakeConnector {
    async fn connect(&self, id: &SubmissionId) -> Result<Connection, TransportError> {
        let (delay, fail) = {
            let mut state = self.state.lock().unwrap();
            state.attempts += 1;
            let fail = state.failures_queued > 0;
            if fail {
                state.failures_queued -= 1;
            }
            (state.delay, fail)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(TransportError::Unavailable);
        }

        let (out_tx, out_rx) = fmpsc::unbounded::<String>();
        let (in_tx, in_rx) = fmpsc::unbounded::<Result<String, TransportError>>();
        let _ = self.ends_tx.send(ServerEnd {
            id: id.clone(),
            received: out_rx,
            feedback: in_tx,
        });

        Ok(Connection {
            sink: Box::pin(out_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(in_rx),
        })
    }
}

type Reply = Arc<dyn Fn() -> Result<SubmissionResult, EvaluationError> + Send + Sync>;

/// Scripted evaluation service that counts exchanges.
#[derive(Clone)]
pub(crate) struct FakeEvaluator {
    reply: Reply,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<VecDeque<SubmissionId>>>,
}

impl FakeEvaluator {
    pub fn accepting() -> Self {
        Self::replying(|| Ok(SubmissionResult::accepted("Evaluation complete and results saved.")))
    }

    pub fn failing(status: u16, message: &'static str) -> Self {
        Self::replying(move || {
            Err(EvaluationError::Service {
                status,
                message: message.to_string(),
            })
        })
    }

    pub fn replying(
        reply: impl Fn() -> Result<SubmissionResult, EvaluationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Arc::new(reply),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SubmissionId> {
        self.seen.lock().unwrap().iter().cloned().collect()
    }
}

impl EvaluationService for FakeEvaluator {
    async fn finalize(&self, id: &SubmissionId) -> Result<SubmissionResult, EvaluationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push_back(id.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.reply)()
    }
}
