//! Connection state machine for one session's edit channel.
//!
//! ```text
//! Idle ─▶ Connecting ─▶ Open ─▶ Closing ─▶ Closed
//!              │          │ ▲       ▲
//!              │          ▼ │       │
//!              │      Reconnecting ─┘
//!              └──────────────────────▶ Closed
//! ```
//!
//! `Closed` is terminal. Reopening a submission creates a new session that
//! starts again from `Idle`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Closed)
                | (Connecting, Open)
                | (Connecting, Closing)
                | (Connecting, Closed)
                | (Open, Reconnecting)
                | (Open, Closing)
                | (Open, Closed)
                | (Reconnecting, Open)
                | (Reconnecting, Closing)
                | (Reconnecting, Closed)
                | (Closing, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }

    /// Only an open channel accepts code updates.
    pub fn accepts_updates(self) -> bool {
        self == ConnectionState::Open
    }

    /// `open_session` waits until the state is past the initial handshake.
    pub fn is_settled(self) -> bool {
        !matches!(self, ConnectionState::Idle | ConnectionState::Connecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}
