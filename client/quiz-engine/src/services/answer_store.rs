use std::collections::{BTreeSet, HashMap};

use crate::error::SessionError;
use crate::models::{Question, QuestionKind, Quiz, Selection, SessionState};

/// Candidate answers keyed by question id. Only ids from the owning quiz are accepted,
/// and nothing changes once the store is frozen.
#[derive(Debug, Clone)]
pub struct AnswerStore {
    kinds: HashMap<String, QuestionKind>,
    option_keys: HashMap<String, BTreeSet<String>>,
    answers: HashMap<String, Selection>,
    frozen: bool,
}

impl AnswerStore {
    pub fn for_quiz(quiz: &Quiz) -> Self {
        let kinds = quiz
            .questions
            .iter()
            .map(|q| (q.id.clone(), q.kind))
            .collect();
        let option_keys = quiz
            .questions
            .iter()
            .map(|q| (q.id.clone(), option_keys(q)))
            .collect();

        Self {
            kinds,
            option_keys,
            answers: HashMap::new(),
            frozen: false,
        }
    }

    /// Single-select (and free text): replaces any previous selection.
    pub fn set_answer(&mut self, question_id: &str, key: &str) -> Result<(), SessionError> {
        self.ensure_mutable()?;
        let kind = self.kind_of(question_id)?;
        match kind {
            QuestionKind::SingleChoice => self.ensure_option(question_id, key)?,
            QuestionKind::TextBased => {}
            QuestionKind::MultipleChoice => {
                return Err(SessionError::KindMismatch {
                    question_id: question_id.to_string(),
                    kind,
                    operation: "set a single answer",
                })
            }
        }

        self.answers
            .insert(question_id.to_string(), Selection::Single(key.to_string()));
        Ok(())
    }

    /// Multi-select: adds the key if absent, removes it if present.
    pub fn toggle_answer(&mut self, question_id: &str, key: &str) -> Result<(), SessionError> {
        self.ensure_mutable()?;
        let kind = self.kind_of(question_id)?;
        if kind != QuestionKind::MultipleChoice {
            return Err(SessionError::KindMismatch {
                question_id: question_id.to_string(),
                kind,
                operation: "toggle an option",
            });
        }
        self.ensure_option(question_id, key)?;

        let entry = self
            .answers
            .entry(question_id.to_string())
            .or_insert_with(|| Selection::Multiple(BTreeSet::new()));
        if let Selection::Multiple(keys) = entry {
            if !keys.remove(key) {
                keys.insert(key.to_string());
            }
        }
        Ok(())
    }

    pub fn get_answer(&self, question_id: &str) -> Option<&Selection> {
        self.answers.get(question_id).filter(|s| !s.is_empty())
    }

    /// Selected keys for scoring and submission; empty when unanswered.
    pub fn selected_keys(&self, question_id: &str) -> Vec<String> {
        self.get_answer(question_id)
            .map(Selection::keys)
            .unwrap_or_default()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|s| !s.is_empty()).count()
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self) -> Result<(), SessionError> {
        if self.frozen {
            return Err(SessionError::IllegalState {
                operation: "change answers",
                state: SessionState::Submitted,
            });
        }
        Ok(())
    }

    fn kind_of(&self, question_id: &str) -> Result<QuestionKind, SessionError> {
        self.kinds
            .get(question_id)
            .copied()
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))
    }

    fn ensure_option(&self, question_id: &str, key: &str) -> Result<(), SessionError> {
        let known = self
            .option_keys
            .get(question_id)
            .is_some_and(|keys| keys.contains(key));
        if !known {
            return Err(SessionError::UnknownOption {
                question_id: question_id.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

fn option_keys(question: &Question) -> BTreeSet<String> {
    question.options.iter().map(|o| o.key.clone()).collect()
}
