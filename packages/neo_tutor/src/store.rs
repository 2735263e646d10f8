//! In-memory submission bookkeeping for the reference server.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    InProgress,
    Completed,
    Evaluated,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Submission {
    pub id: u64,
    pub assignment_id: u64,
    pub status: ReviewStatus,
    /// Last snapshot received over the edit channel.
    pub latest_code: Option<String>,
    /// Final content, fixed when the submission is evaluated.
    pub content: Option<String>,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    submissions: HashMap<u64, Submission>,
}

#[derive(Default)]
pub struct SubmissionStore {
    inner: RwLock<Inner>,
}

impl SubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, assignment_id: u64) -> Submission {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let submission = Submission {
            id: inner.next_id,
            assignment_id,
            status: ReviewStatus::InProgress,
            latest_code: None,
            content: None,
            feedback: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        inner.submissions.insert(submission.id, submission.clone());
        submission
    }

    pub async fn get(&self, id: u64) -> Option<Submission> {
        self.inner.read().await.submissions.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.submissions.len()
    }

    /// Returns false if the submission does not exist.
    pub async fn record_code(&self, id: u64, code: &str) -> bool {
        match self.inner.write().await.submissions.get_mut(&id) {
            Some(s) => {
                s.latest_code = Some(code.to_string());
                true
            }
            None => false,
        }
    }

    /// Fix the final content and mark the submission completed. Returns the
    /// content to evaluate.
    pub async fn begin_evaluation(&self, id: u64) -> Option<String> {
        let mut inner = self.inner.write().await;
        let s = inner.submissions.get_mut(&id)?;
        let content = s.latest_code.clone().unwrap_or_default();
        s.content = Some(content.clone());
        s.status = ReviewStatus::Completed;
        s.completed_at = Some(Utc::now());
        Some(content)
    }

    pub async fn finish_evaluation(&self, id: u64, feedback: Result<String, String>) {
        let mut inner = self.inner.write().await;
        let Some(s) = inner.submissions.get_mut(&id) else {
            return;
        };
        match feedback {
            Ok(text) => {
                s.status = ReviewStatus::Evaluated;
                s.feedback = Some(text);
            }
            Err(_) => s.status = ReviewStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_sequential_from_one() {
        let store = SubmissionStore::new();
        assert_eq!(store.create(3).await.id, 1);
        let second = store.create(3).await;
        assert_eq!(second.id, 2);
        assert_eq!(second.status, ReviewStatus::InProgress);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn record_code_only_for_known_submissions() {
        let store = SubmissionStore::new();
        let s = store.create(1).await;
        assert!(store.record_code(s.id, "x = 1").await);
        assert!(!store.record_code(99, "x = 1").await);
        assert_eq!(
            store.get(s.id).await.unwrap().latest_code.as_deref(),
            Some("x = 1")
        );
    }

    #[tokio::test]
    async fn evaluation_fixes_latest_code_as_content() {
        let store = SubmissionStore::new();
        let s = store.create(1).await;
        store.record_code(s.id, "draft 1").await;
        store.record_code(s.id, "draft 2").await;

        assert_eq!(store.begin_evaluation(s.id).await.as_deref(), Some("draft 2"));
        let mid = store.get(s.id).await.unwrap();
        assert_eq!(mid.status, ReviewStatus::Completed);
        assert!(mid.completed_at.is_some());

        store.finish_evaluation(s.id, Ok("well done".into())).await;
        let done = store.get(s.id).await.unwrap();
        assert_eq!(done.status, ReviewStatus::Evaluated);
        assert_eq!(done.content.as_deref(), Some("draft 2"));
        assert_eq!(done.feedback.as_deref(), Some("well done"));
    }

    #[tokio::test]
    async fn failed_evaluation_marks_error() {
        let store = SubmissionStore::new();
        let s = store.create(1).await;
        store.begin_evaluation(s.id).await;
        store.finish_evaluation(s.id, Err("upstream down".into())).await;
        assert_eq!(store.get(s.id).await.unwrap().status, ReviewStatus::Error);
    }

    #[tokio::test]
    async fn unknown_submission_cannot_be_evaluated() {
        let store = SubmissionStore::new();
        assert!(store.begin_evaluation(5).await.is_none());
    }
}
