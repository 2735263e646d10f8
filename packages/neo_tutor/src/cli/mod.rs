pub mod edit;

use anyhow::Result;
use feedback_session::Endpoints;
use serde::Deserialize;

pub use edit::edit_command;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server is unavailable")]
    Unavailable,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServerError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable
        } else {
            Self::Other(err.into())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatedSubmission {
    pub id: u64,
    pub assignment_id: u64,
    pub status: String,
}

/// `neo create <assignment_id>`: open a new submission and print its id.
pub async fn create_command(endpoints: &Endpoints, assignment_id: u64) -> Result<()> {
    match create_submission(endpoints, assignment_id).await {
        Ok(s) => {
            println!(
                "Created submission {} for assignment {} ({})",
                s.id, s.assignment_id, s.status
            );
            println!("Edit it with: neo edit {}", s.id);
            Ok(())
        }
        Err(ServerError::Unavailable) => {
            eprintln!("[neo: server at {} is not reachable]", endpoints.http_base);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn create_submission(
    endpoints: &Endpoints,
    assignment_id: u64,
) -> Result<CreatedSubmission, ServerError> {
    let url = format!("{}/api/submissions", endpoints.http_base);
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "assignment_id": assignment_id }))
        .send()
        .await
        .map_err(ServerError::from_reqwest)?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("Failed to create submission: {} {}", status, text).into());
    }

    resp.json().await.map_err(ServerError::from_reqwest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{spawn_app, test_app_state};

    #[tokio::test]
    async fn test_create_submission_against_server() {
        let state = test_app_state();
        let addr = spawn_app(state.clone()).await;
        let endpoints = Endpoints::from_server_url(&format!("http://{}", addr));

        let created = create_submission(&endpoints, 3).await.unwrap();
        assert_eq!(created.assignment_id, 3);
        assert_eq!(created.status, "in_progress");
        assert!(state.store.get(created.id).await.is_some());
    }

    #[tokio::test]
    async fn test_create_submission_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let endpoints = Endpoints::from_server_url(&format!("http://{}", addr));
        assert!(matches!(
            create_submission(&endpoints, 1).await,
            Err(ServerError::Unavailable)
        ));
    }
}
