use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// A quiz as returned by the quiz endpoint. Read-only for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_unique_question_ids))]
pub struct Quiz {
    #[validate(length(min = 1))]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Time budget for one attempt, in whole seconds.
    #[validate(range(min = 1))]
    pub duration_seconds: u64,
    #[validate(nested)]
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Sum of every question's point value, answered or not.
    pub fn total_possible(&self) -> f64 {
        self.questions.iter().map(|q| q.marks).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_marks))]
pub struct Question {
    #[validate(length(min = 1))]
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub kind: QuestionKind,
    pub marks: f64,
    #[serde(default)]
    pub options: Vec<QuizOption>,
    #[serde(default)]
    pub correct_keys: Vec<String>,
}

impl Question {
    pub fn has_option(&self, key: &str) -> bool {
        self.options.iter().any(|o| o.key == key)
    }

    /// Correct keys that do not name any option. Non-empty means the backend sent
    /// an answer the candidate can never select.
    pub fn dangling_correct_keys(&self) -> Vec<&str> {
        self.correct_keys
            .iter()
            .filter(|k| !self.has_option(k))
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionKind {
    SingleChoice,
    MultipleChoice,
    TextBased,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "single_choice",
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::TextBased => "text_based",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable answer. `key` is a single letter, stable within its question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub key: String,
    pub text: String,
}

fn validate_marks(question: &Question) -> Result<(), ValidationError> {
    if !question.marks.is_finite() || question.marks < 0.0 {
        let mut err = ValidationError::new("marks_out_of_range");
        err.message = Some(format!("question {} has marks {}", question.id, question.marks).into());
        return Err(err);
    }
    Ok(())
}

fn validate_unique_question_ids(quiz: &Quiz) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for question in &quiz.questions {
        if !seen.insert(question.id.as_str()) {
            let mut err = ValidationError::new("duplicate_question_id");
            err.message = Some(format!("question id {} appears twice", question.id).into());
            return Err(err);
        }
    }
    Ok(())
}
