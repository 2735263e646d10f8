//! Submission coordinator: the one-shot finalize-for-review exchange.
//!
//! Independent of the edit channel. At most one exchange per submission is
//! in flight; every exchange ends in a [`SubmissionResult`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Endpoints;
use crate::error::{EvaluationError, SessionError};
use crate::identity::SubmissionId;
use crate::message::{SubmissionResult, SubmissionStatus};

/// The evaluation service behind the finalize contract.
pub trait EvaluationService: Send + Sync + 'static {
    fn finalize(
        &self,
        id: &SubmissionId,
    ) -> impl Future<Output = Result<SubmissionResult, EvaluationError>> + Send;
}

/// Body of a finalize response. Servers send at least a message; FastAPI
/// style errors carry it as `detail`. `status` is free text and only the
/// three known outcomes are honored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinalizeResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl FinalizeResponse {
    pub fn text(&self) -> Option<&str> {
        self.message.as_deref().or(self.detail.as_deref())
    }

    /// The outcome the body asks for, if it names one we know.
    pub fn outcome(&self) -> Option<SubmissionStatus> {
        match self.status.as_deref()?.trim().to_ascii_lowercase().as_str() {
            "accepted" => Some(SubmissionStatus::Accepted),
            "rejected" => Some(SubmissionStatus::Rejected),
            "error" => Some(SubmissionStatus::Error),
            _ => None,
        }
    }
}

/// `POST {http_base}/api/{submission_id}/evaluate` with no body.
///
/// 2xx is accepted unless the body says otherwise, 4xx is a rejection, and
/// anything else is a service failure.
#[derive(Clone, Debug)]
pub struct HttpEvaluationService {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpEvaluationService {
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints)
    }

    pub fn with_client(client: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }
}

impl EvaluationService for HttpEvaluationService {
    async fn finalize(&self, id: &SubmissionId) -> Result<SubmissionResult, EvaluationError> {
        let url = self.endpoints.evaluate_url(id);
        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(EvaluationError::from_reqwest)?;

        let status = resp.status();
        let body = resp.text().await.map_err(EvaluationError::from_reqwest)?;
        let parsed = serde_json::from_str::<FinalizeResponse>(&body).ok();
        let message = parsed
            .as_ref()
            .and_then(FinalizeResponse::text)
            .map(str::to_owned)
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    status.to_string()
                } else {
                    trimmed.to_string()
                }
            });

        if status.is_success() {
            let parsed = parsed.ok_or_else(|| {
                EvaluationError::Decode(format!("expected a JSON object, got {:?}", body))
            })?;
            let outcome = parsed.outcome().unwrap_or(SubmissionStatus::Accepted);
            Ok(SubmissionResult::new(outcome, message))
        } else if status.is_client_error() {
            Ok(SubmissionResult::rejected(message))
        } else {
            Err(EvaluationError::Service {
                status: status.as_u16(),
                message,
            })
        }
    }
}

type InFlight = Arc<Mutex<HashSet<SubmissionId>>>;

/// Removes the submission from the in-flight set when the exchange ends,
/// including when the submitting future is dropped.
struct InFlightGuard {
    in_flight: InFlight,
    id: SubmissionId,
}

impl InFlightGuard {
    fn acquire(in_flight: &InFlight, id: &SubmissionId) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone());
        inserted.then(|| Self {
            in_flight: in_flight.clone(),
            id: id.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

pub struct SubmissionCoordinator<E> {
    service: Arc<E>,
    timeout: Duration,
    in_flight: InFlight,
}

impl<E: EvaluationService> SubmissionCoordinator<E> {
    pub fn new(service: E, timeout: Duration) -> Self {
        Self {
            service: Arc::new(service),
            timeout,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run one finalize exchange.
    ///
    /// `Err` only for [`SessionError::SubmissionInProgress`]; failures of the
    /// exchange itself come back as a result with status `error`.
    pub async fn submit(&self, id: &SubmissionId) -> Result<SubmissionResult, SessionError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, id)
            .ok_or_else(|| SessionError::SubmissionInProgress(id.clone()))?;

        info!("Submitting {} for final review", id);
        let result = match tokio::time::timeout(self.timeout, self.service.finalize(id)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!("Submission {} failed: {}", id, e);
                SubmissionResult::error(e.to_string())
            }
            Err(_) => {
                let e = EvaluationError::Timeout(self.timeout);
                warn!("Submission {} failed: {}", id, e);
                SubmissionResult::error(e.to_string())
            }
        };
        info!("Submission {} finished: {}", id, result.status);
        Ok(result)
    }

    pub fn is_pending(&self, id: &SubmissionId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}
