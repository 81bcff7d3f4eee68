use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::{Quiz, SubmissionPayload, SubmittedAnswer};
use crate::services::answer_store::AnswerStore;

/// Sends a finished attempt to the backend. Called once per session; implementations
/// must not retry on their own.
#[async_trait]
pub trait ResultSubmitter: Send + Sync {
    async fn submit_result(&self, payload: &SubmissionPayload) -> Result<(), ApiError>;
}

/// One entry per quiz question in definition order; unanswered questions carry no keys.
pub fn build_payload(
    quiz: &Quiz,
    candidate_id: &str,
    elapsed_seconds: u64,
    answers: &AnswerStore,
) -> SubmissionPayload {
    SubmissionPayload {
        candidate_id: candidate_id.to_string(),
        quiz_id: quiz.id.clone(),
        elapsed_seconds,
        answers: quiz
            .questions
            .iter()
            .map(|q| SubmittedAnswer {
                question_id: q.id.clone(),
                selected_keys: answers.selected_keys(&q.id),
            })
            .collect(),
    }
}
