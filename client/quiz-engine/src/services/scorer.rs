//! Scoring of a frozen attempt.
//!
//! Single-choice and text questions are all-or-nothing. Multiple-choice questions earn
//! `correct_selected / |C| * marks` minus a penalty of `incorrect_selected / |C| * marks * 0.5`,
//! floored at zero. Malformed questions score zero and are flagged instead of aborting the
//! rest of the quiz.

use std::collections::BTreeSet;

use crate::models::{
    Classification, DataInconsistency, Question, QuestionKind, ScoreSheet, ScoredQuestion,
};
use crate::services::answer_store::AnswerStore;

const WRONG_SELECTION_PENALTY: f64 = 0.5;

/// Scores every question in `questions` order. Pure: same inputs, same sheet.
pub fn score(questions: &[Question], answers: &AnswerStore) -> ScoreSheet {
    let scored: Vec<ScoredQuestion> = questions
        .iter()
        .map(|question| score_question(question, &answers.selected_keys(&question.id)))
        .collect();

    let total_awarded = scored.iter().map(|s| s.awarded).sum();
    let total_possible = questions.iter().map(|q| q.marks).sum();

    ScoreSheet {
        questions: scored,
        total_awarded,
        total_possible,
    }
}

pub fn score_question(question: &Question, selected: &[String]) -> ScoredQuestion {
    let outcome = match question.kind {
        QuestionKind::SingleChoice | QuestionKind::TextBased => score_exact(question, selected),
        QuestionKind::MultipleChoice => score_multiple(question, selected),
    };

    match outcome {
        Ok((awarded, classification)) => ScoredQuestion {
            question_id: question.id.clone(),
            awarded,
            marks: question.marks,
            classification,
            inconsistency: None,
        },
        Err(inconsistency) => ScoredQuestion {
            question_id: question.id.clone(),
            awarded: 0.0,
            marks: question.marks,
            classification: Classification::Incorrect,
            inconsistency: Some(inconsistency),
        },
    }
}

fn score_exact(
    question: &Question,
    selected: &[String],
) -> Result<(f64, Classification), DataInconsistency> {
    // Free-text questions legitimately come without options.
    if question.kind == QuestionKind::SingleChoice && question.options.is_empty() {
        return Err(DataInconsistency::NoOptions);
    }
    let correct = match question.correct_keys.as_slice() {
        [] => return Err(DataInconsistency::NoCorrectKeys),
        [key] => key,
        _ => return Err(DataInconsistency::AmbiguousCorrectKeys),
    };

    match selected {
        [key] if key == correct => Ok((question.marks, Classification::Correct)),
        _ => Ok((0.0, Classification::Incorrect)),
    }
}

fn score_multiple(
    question: &Question,
    selected: &[String],
) -> Result<(f64, Classification), DataInconsistency> {
    if question.options.is_empty() {
        return Err(DataInconsistency::NoOptions);
    }
    let correct: BTreeSet<&str> = question.correct_keys.iter().map(String::as_str).collect();
    if correct.is_empty() {
        return Err(DataInconsistency::NoCorrectKeys);
    }
    let selected: BTreeSet<&str> = selected.iter().map(String::as_str).collect();

    if selected == correct {
        return Ok((question.marks, Classification::Correct));
    }

    let correct_len = correct.len() as f64;
    let correct_selected = selected.intersection(&correct).count() as f64;
    let incorrect_selected = selected.difference(&correct).count() as f64;

    let raw_partial = (correct_selected / correct_len) * question.marks;
    let penalty = (incorrect_selected / correct_len) * question.marks * WRONG_SELECTION_PENALTY;
    let awarded = (raw_partial - penalty).max(0.0);

    let classification = if awarded > 0.0 && awarded < question.marks {
        Classification::PartialCredit
    } else {
        Classification::Incorrect
    };
    Ok((awarded, classification))
}
