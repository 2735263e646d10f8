use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::identity::SubmissionId;

/// Everything but RFC 3986 unreserved characters, so an id is always one path segment.
const ID_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Shown by the relay until the first feedback message arrives.
pub const DEFAULT_PLACEHOLDER: &str = "AI Feedback will appear here...";

/// Runtime tunables for the session core.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Upper bound on establishing the edit channel.
    pub connect_timeout: Duration,
    /// Upper bound on one finalize exchange.
    pub submit_timeout: Duration,
    /// How long `close_session` waits for the channel to wind down.
    pub close_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub feedback_placeholder: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(2),
            reconnect: ReconnectPolicy::default(),
            feedback_placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

/// What to do when an open channel drops unexpectedly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Zero disables reconnection: the session falls straight to `Closed`.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before the given attempt (1-based), doubling up to `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Where the two wire contracts live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    /// e.g. `ws://127.0.0.1:8000`
    pub ws_base: String,
    /// e.g. `http://127.0.0.1:8000`
    pub http_base: String,
}

impl Endpoints {
    /// Derive both bases from one server URL (`http` maps to `ws`, `https` to `wss`).
    pub fn from_server_url(url: &str) -> Self {
        let http_base = url.trim_end_matches('/').to_string();
        let ws_base = if let Some(rest) = http_base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = http_base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{http_base}")
        };
        let http_base = if http_base.contains("://") {
            http_base
        } else {
            format!("http://{http_base}")
        };
        Self { ws_base, http_base }
    }

    pub fn feedback_url(&self, id: &SubmissionId) -> String {
        format!("{}/ws/feedback/{}", self.ws_base, path_segment(id))
    }

    pub fn evaluate_url(&self, id: &SubmissionId) -> String {
        format!("{}/api/{}/evaluate", self.http_base, path_segment(id))
    }
}

fn path_segment(id: &SubmissionId) -> String {
    utf8_percent_encode(id.as_str(), ID_SEGMENT).to_string()
}
