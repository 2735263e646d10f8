//! Feedback producers behind the reference server.
//!
//! How feedback text is generated is opaque to the server: it hands over the
//! submission id and the full code snapshot and relays whatever comes back.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("feedback service timed out")]
    Timeout,

    #[error("feedback service is unreachable: {0}")]
    Network(String),

    #[error("feedback service returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

impl ProducerError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

pub trait FeedbackProducer: Send + Sync + 'static {
    fn feedback<'a>(
        &'a self,
        submission_id: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, Result<String, ProducerError>>;
}

/// Used when no upstream is configured: acknowledges the snapshot.
#[derive(Clone, Debug, Default)]
pub struct AcknowledgeProducer;

impl FeedbackProducer for AcknowledgeProducer {
    fn feedback<'a>(
        &'a self,
        _submission_id: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, Result<String, ProducerError>> {
        let lines = code.lines().filter(|l| !l.trim().is_empty()).count();
        Box::pin(async move {
            Ok(format!(
                "Received {} line(s) of pseudocode. No feedback service is configured.",
                lines
            ))
        })
    }
}

#[derive(Serialize)]
struct UpstreamRequest<'a> {
    submission_id: &'a str,
    code: &'a str,
}

#[derive(Deserialize)]
struct UpstreamResponse {
    feedback: String,
}

/// POSTs `{submission_id, code}` to an upstream service and reads `feedback`
/// from the JSON reply, or the raw body if it is not JSON.
#[derive(Clone, Debug)]
pub struct UpstreamProducer {
    client: reqwest::Client,
    url: String,
}

impl UpstreamProducer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build feedback HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl FeedbackProducer for UpstreamProducer {
    fn feedback<'a>(
        &'a self,
        submission_id: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, Result<String, ProducerError>> {
        Box::pin(async move {
            debug!("Requesting feedback for submission {}", submission_id);
            let resp = self
                .client
                .post(&self.url)
                .json(&UpstreamRequest {
                    submission_id,
                    code,
                })
                .send()
                .await
                .map_err(ProducerError::from_reqwest)?;

            let status = resp.status();
            let body = resp.text().await.map_err(ProducerError::from_reqwest)?;
            if !status.is_success() {
                return Err(ProducerError::Upstream {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(match serde_json::from_str::<UpstreamResponse>(&body) {
                Ok(parsed) => parsed.feedback,
                Err(_) => body.trim().to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/feedback", addr)
    }

    #[tokio::test]
    async fn acknowledge_counts_non_blank_lines() {
        let text = AcknowledgeProducer
            .feedback("1", "a = 1\n\nprint(a)\n")
            .await
            .unwrap();
        assert!(text.starts_with("Received 2 line(s)"));
    }

    #[tokio::test]
    async fn upstream_reads_feedback_field() {
        let app = Router::new().route(
            "/feedback",
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(serde_json::json!({
                    "feedback": format!("{} for {}", body["code"].as_str().unwrap(), body["submission_id"].as_str().unwrap())
                }))
            }),
        );
        let producer = UpstreamProducer::new(spawn(app).await, Duration::from_secs(5)).unwrap();
        let text = producer.feedback("7", "x = 1").await.unwrap();
        assert_eq!(text, "x = 1 for 7");
    }

    #[tokio::test]
    async fn upstream_plain_text_body_is_used_verbatim() {
        let app = Router::new().route("/feedback", post(|| async { "  Looks fine.\n" }));
        let producer = UpstreamProducer::new(spawn(app).await, Duration::from_secs(5)).unwrap();
        assert_eq!(producer.feedback("7", "x").await.unwrap(), "Looks fine.");
    }

    #[tokio::test]
    async fn upstream_error_status_is_an_error() {
        let app = Router::new().route(
            "/feedback",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let producer = UpstreamProducer::new(spawn(app).await, Duration::from_secs(5)).unwrap();
        let err = producer.feedback("7", "x").await.unwrap_err();
        assert!(matches!(err, ProducerError::Upstream { status: 503, .. }));
    }
}
