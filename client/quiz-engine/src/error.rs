use thiserror::Error;

use crate::models::{QuestionKind, SessionState};

/// Failures talking to the quiz backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint} not found")]
    NotFound { endpoint: String },

    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Whether repeating the same idempotent request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Request { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            ApiError::Status { status, .. } => *status >= 500 || *status == 429,
            ApiError::NotFound { .. } | ApiError::Decode { .. } | ApiError::Other(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid quiz id {0:?}")]
    InvalidQuizId(String),

    #[error("failed to load quiz {quiz_id}: {source}")]
    LoadFailed {
        quiz_id: String,
        #[source]
        source: ApiError,
    },

    #[error("candidate {candidate_id} has already completed quiz {quiz_id}")]
    AlreadyAttempted {
        quiz_id: String,
        candidate_id: String,
    },

    #[error("quiz {quiz_id} is malformed: {reason}")]
    InvalidQuiz { quiz_id: String, reason: String },

    #[error("cannot {operation} while session is {state}")]
    IllegalState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("question {0} is not part of this quiz")]
    UnknownQuestion(String),

    #[error("option {key} does not belong to question {question_id}")]
    UnknownOption { question_id: String, key: String },

    #[error("question {question_id} is {kind}, cannot {operation}")]
    KindMismatch {
        question_id: String,
        kind: QuestionKind,
        operation: &'static str,
    },
}

impl SessionError {
    /// Errors raised while loading block the attempt; the rest reject a single action.
    pub fn blocks_session(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidQuizId(_)
                | SessionError::LoadFailed { .. }
                | SessionError::AlreadyAttempted { .. }
                | SessionError::InvalidQuiz { .. }
        )
    }
}
