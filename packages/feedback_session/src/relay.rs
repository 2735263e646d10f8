//! Feedback relay: a last-write-wins cache of the newest feedback text.
//!
//! This is a presentation cache, not a log. Observers either poll
//! [`FeedbackRelay::current_feedback`] or await changes on a
//! [`FeedbackRelay::subscribe`] receiver.

use std::sync::Arc;

use tokio::sync::watch;

use crate::message::FeedbackMessage;

#[derive(Clone)]
pub struct FeedbackRelay {
    latest: Arc<watch::Sender<Option<FeedbackMessage>>>,
    placeholder: Arc<str>,
}

impl FeedbackRelay {
    pub fn new(placeholder: impl Into<Arc<str>>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            latest: Arc::new(latest),
            placeholder: placeholder.into(),
        }
    }

    /// Replace the current feedback unconditionally.
    pub fn on_message(&self, raw: impl Into<String>) {
        self.latest.send_replace(Some(FeedbackMessage::new(raw)));
    }

    /// The newest feedback text, or the placeholder if nothing has arrived.
    pub fn current_feedback(&self) -> String {
        match &*self.latest.borrow() {
            Some(msg) => msg.text.clone(),
            None => self.placeholder.to_string(),
        }
    }

    pub fn latest(&self) -> Option<FeedbackMessage> {
        self.latest.borrow().clone()
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<FeedbackMessage>> {
        self.latest.subscribe()
    }
}

impl std::fmt::Debug for FeedbackRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackRelay")
            .field("has_feedback", &self.latest.borrow().is_some())
            .finish()
    }
}
