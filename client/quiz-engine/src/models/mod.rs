use std::fmt;

use serde::{Deserialize, Serialize};

pub mod answer;
pub mod quiz;
pub mod result;
pub mod timer;

pub use answer::Selection;
pub use quiz::{Question, QuestionKind, Quiz, QuizOption};
pub use result::{
    Classification, DataInconsistency, QuizResult, ScoreSheet, ScoredQuestion, SubmissionPayload,
    SubmitTrigger, SubmittedAnswer,
};
pub use timer::{TimeExpired, TimerEvent, TimerTick};

/// Lifecycle of one quiz attempt. `Submitted` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    Loading = 0,
    InProgress = 1,
    Submitting = 2,
    Submitted = 3,
    Error = 4,
}

impl SessionState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Loading,
            1 => SessionState::InProgress,
            2 => SessionState::Submitting,
            3 => SessionState::Submitted,
            _ => SessionState::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Loading => "loading",
            SessionState::InProgress => "in_progress",
            SessionState::Submitting => "submitting",
            SessionState::Submitted => "submitted",
            SessionState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Submitted | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the one-shot result transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum TransmissionStatus {
    NotStarted,
    Pending,
    Delivered,
    Failed(String),
}

impl TransmissionStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, TransmissionStatus::Delivered | TransmissionStatus::Failed(_))
    }
}

/// Everything a front end needs to follow a session without polling.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Tick { remaining_seconds: u64 },
    StateChanged(SessionState),
    Submitted(Box<QuizResult>),
    TransmissionDelivered,
    TransmissionFailed(String),
}
