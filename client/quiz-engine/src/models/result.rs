use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Correct,
    PartialCredit,
    Incorrect,
}

/// Problems in the quiz data that the scorer worked around instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataInconsistency {
    NoOptions,
    NoCorrectKeys,
    AmbiguousCorrectKeys,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredQuestion {
    pub question_id: String,
    pub awarded: f64,
    pub marks: f64,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inconsistency: Option<DataInconsistency>,
}

/// Scorer output: per-question scores in quiz definition order plus totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSheet {
    pub questions: Vec<ScoredQuestion>,
    pub total_awarded: f64,
    pub total_possible: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    TimerExpired,
}

impl SubmitTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitTrigger::Manual => "manual",
            SubmitTrigger::TimerExpired => "timer_expired",
        }
    }
}

impl fmt::Display for SubmitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locally computed outcome of one attempt. Built once, from the frozen answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub attempt_id: Uuid,
    pub quiz_id: String,
    pub candidate_id: String,
    pub total_awarded: f64,
    pub total_possible: f64,
    pub elapsed_seconds: u64,
    pub questions: Vec<ScoredQuestion>,
    pub trigger: SubmitTrigger,
    pub submitted_at: DateTime<Utc>,
}

impl QuizResult {
    pub fn percentage(&self) -> f64 {
        if self.total_possible > 0.0 {
            self.total_awarded / self.total_possible * 100.0
        } else {
            0.0
        }
    }
}

/// Body of the single result submission. The local score is deliberately not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub candidate_id: String,
    pub quiz_id: String,
    pub elapsed_seconds: u64,
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub selected_keys: Vec<String>,
}
