use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::AppState;
use crate::producer::{AcknowledgeProducer, FeedbackProducer, ProducerError};
use crate::store::SubmissionStore;

/// `AppState` with an empty store and the acknowledge-only producer.
pub fn test_app_state() -> AppState {
    test_app_state_with(AcknowledgeProducer)
}

pub fn test_app_state_with(producer: impl FeedbackProducer) -> AppState {
    AppState {
        store: Arc::new(SubmissionStore::new()),
        producer: Arc::new(producer),
    }
}

/// Serve the full router on an ephemeral loopback port.
pub async fn spawn_app(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = crate::build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

/// Answers `echo: {code}`.
pub struct EchoProducer;

impl FeedbackProducer for EchoProducer {
    fn feedback<'a>(
        &'a self,
        _submission_id: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, Result<String, ProducerError>> {
        Box::pin(async move { Ok(format!("echo: {}", code)) })
    }
}

pub struct FailingProducer;

impl FeedbackProducer for FailingProducer {
    fn feedback<'a>(
        &'a self,
        _submission_id: &'a str,
        _code: &'a str,
    ) -> BoxFuture<'a, Result<String, ProducerError>> {
        Box::pin(async {
            Err(ProducerError::Upstream {
                status: 500,
                body: "model offline".into(),
            })
        })
    }
}
