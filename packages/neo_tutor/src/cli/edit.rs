//! `neo edit`: a line-oriented editor driving one live feedback session.

use std::sync::Arc;

use anyhow::Result;
use feedback_session::{
    ConnectionState, Endpoints, LiveSupervisor, SessionConfig, SessionError, SubmissionId,
    SubmissionResult,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::debug;

/// One line of input, either an editor command or text for the buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Submit,
    Clear,
    Show,
    Status,
    Quit,
    Unknown(String),
    Text(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(cmd) = trimmed.strip_prefix(':') else {
            return Self::Text(line.to_string());
        };
        match cmd {
            "submit" => Self::Submit,
            "clear" => Self::Clear,
            "show" => Self::Show,
            "status" => Self::Status,
            "quit" | "q" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// The local code buffer. Every change is sent whole.
#[derive(Debug, Default)]
pub struct Buffer {
    lines: Vec<String>,
}

impl Buffer {
    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

pub async fn edit_command(
    endpoints: Endpoints,
    config: SessionConfig,
    submission_id: SubmissionId,
) -> Result<()> {
    let server = endpoints.http_base.clone();
    let supervisor = Arc::new(LiveSupervisor::connect_to(endpoints, config));

    println!("[neo: connecting to {} for submission {}]", server, submission_id);
    let session = supervisor.open_session(submission_id.clone()).await;
    if !session.is_open() {
        anyhow::bail!(
            "Could not open edit channel for submission {}: {}",
            submission_id,
            session.last_error().unwrap_or_else(|| "unknown error".into())
        );
    }
    println!("[neo: connected, type code lines; :submit :clear :show :status :quit]");
    println!("{}", session.current_feedback());

    let watcher = tokio::spawn(watch_session(session.clone()));

    let mut buffer = Buffer::default();
    let mut submits = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Input::parse(&line) {
            Input::Text(text) => {
                buffer.push(text);
                push_buffer(&supervisor, &submission_id, &buffer);
            }
            Input::Clear => {
                buffer.clear();
                push_buffer(&supervisor, &submission_id, &buffer);
            }
            Input::Show => {
                println!("--- {} line(s) ---", buffer.len());
                println!("{}", buffer.text());
                println!("---");
            }
            Input::Status => {
                println!("[state: {}]", session.state());
                println!("[feedback: {}]", session.current_feedback());
                if let Some(err) = session.last_error() {
                    println!("[last error: {}]", err);
                }
                if let Some(result) = session.submission() {
                    println!("[last submission: {}]", describe(&result));
                }
            }
            Input::Submit => {
                // Runs beside editing; the session stays open.
                let supervisor = supervisor.clone();
                let id = submission_id.clone();
                submits.spawn(async move {
                    match supervisor.submit(&id).await {
                        Ok(result) => println!("[submission {}]", describe(&result)),
                        Err(e) => println!("[neo: {}]", e),
                    }
                });
            }
            Input::Quit => break,
            Input::Unknown(cmd) => println!("[neo: unknown command :{}]", cmd),
        }
        // reap finished submits so the set stays small
        while submits.try_join_next().is_some() {}
    }

    if !submits.is_empty() {
        println!("[neo: waiting for pending submission]");
    }
    drain_submits(&mut submits).await;

    supervisor.close_session(&submission_id).await;
    watcher.abort();
    println!("[neo: session closed]");
    Ok(())
}

fn push_buffer(supervisor: &LiveSupervisor, id: &SubmissionId, buffer: &Buffer) {
    match supervisor.send(id, buffer.text()) {
        Ok(()) => debug!("Sent {} line(s) for submission {}", buffer.len(), id),
        Err(e @ SessionError::ChannelNotReady { .. }) => println!("[not sent: {}]", e),
        Err(e) => println!("[neo: {}]", e),
    }
}

/// Wait for every background submit so its result is printed before exit.
async fn drain_submits(submits: &mut JoinSet<()>) -> usize {
    let mut finished = 0;
    while let Some(joined) = submits.join_next().await {
        if let Err(e) = joined {
            println!("[neo: submission task failed: {}]", e);
        }
        finished += 1;
    }
    finished
}

fn describe(result: &SubmissionResult) -> String {
    format!("{}: {}", result.status, result.message)
}

/// Print connection state changes and every new feedback value.
async fn watch_session(session: Arc<feedback_session::Session>) {
    let mut states = session.watch_state();
    let mut feedback = session.subscribe_feedback();
    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                println!("[state: {}]", state);
                if state == ConnectionState::Closed {
                    break;
                }
            }
            changed = feedback.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(msg) = feedback.borrow_and_update().as_ref() {
                    println!("{}", msg.text);
                }
            }
        }
    }
}
