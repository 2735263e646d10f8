//! Feedback Session - live code-to-feedback session lifecycle
//!
//! A learner edits a submission; every edit pushes the full buffer over a
//! persistent edit channel and the server streams back feedback. When the
//! learner is done, a separate one-shot exchange finalizes the submission
//! for review. This crate owns that lifecycle: the connection state machine,
//! the keyed registry of open sessions, feedback relay and submission.
//!
//! # Example
//!
//! ```no_run
//! use feedback_session::{Endpoints, LiveSupervisor, SessionConfig, SubmissionId};
//!
//! #[tokio::main]
//! async fn main() {
//!     let endpoints = Endpoints::from_server_url("http://127.0.0.1:8000");
//!     let supervisor = LiveSupervisor::connect_to(endpoints, SessionConfig::default());
//!
//!     let id = SubmissionId::from("7");
//!     let session = supervisor.open_session(id.clone()).await;
//!     if !session.is_open() {
//!         eprintln!("could not connect: {:?}", session.last_error());
//!         return;
//!     }
//!
//!     supervisor.send(&id, "print(1)").unwrap();
//!
//!     let mut feedback = session.subscribe_feedback();
//!     feedback.changed().await.unwrap();
//!     println!("{}", supervisor.current_feedback(&id));
//!
//!     let result = supervisor.submit(&id).await.unwrap();
//!     println!("{}: {}", result.status, result.message);
//!
//!     supervisor.close_session(&id).await;
//! }
//! ```

mod channel;
pub mod config;
mod error;
mod identity;
mod message;
mod relay;
mod session;
mod state;
pub mod submission;
mod supervisor;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use config::{DEFAULT_PLACEHOLDER, Endpoints, ReconnectPolicy, SessionConfig};
pub use error::{EvaluationError, SessionError, TransportError};
pub use identity::SubmissionId;
pub use message::{CodeUpdate, FeedbackMessage, SubmissionResult, SubmissionStatus};
pub use relay::FeedbackRelay;
pub use session::Session;
pub use state::ConnectionState;
pub use submission::{
    EvaluationService, FinalizeResponse, HttpEvaluationService, SubmissionCoordinator,
};
pub use supervisor::{LiveSupervisor, SessionSupervisor};
pub use transport::{Connection, Connector, WsConnector};
