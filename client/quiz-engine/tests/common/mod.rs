#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quiz_engine::error::ApiError;
use quiz_engine::models::{Question, QuestionKind, Quiz, QuizOption, SubmissionPayload};
use quiz_engine::{QuizSession, QuizSource, ResultSubmitter, SessionSettings};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn options(keys: &[&str]) -> Vec<QuizOption> {
    keys.iter()
        .map(|key| QuizOption {
            key: key.to_string(),
            text: format!("option {}", key),
        })
        .collect()
}

pub fn question(id: &str, kind: QuestionKind, marks: f64, keys: &[&str], correct: &[&str]) -> Question {
    Question {
        id: id.to_string(),
        prompt: format!("Question {}", id),
        code_snippet: None,
        image_url: None,
        kind,
        marks,
        options: options(keys),
        correct_keys: correct.iter().map(|k| k.to_string()).collect(),
    }
}

/// Four questions, 10 points in total, one minute on the clock.
///
/// - `q1` single choice, 2 pts, correct `B`
/// - `q2` multiple choice, 4 pts, correct `{A, C}`
/// - `q3` free text, 1 pt, correct `42`
/// - `q4` multiple choice, 3 pts, correct `{B}`
pub fn sample_quiz() -> Quiz {
    Quiz {
        id: "quiz-1".to_string(),
        name: "Rust basics".to_string(),
        description: "Ownership, traits and the borrow checker".to_string(),
        duration_seconds: 60,
        questions: vec![
            question("q1", QuestionKind::SingleChoice, 2.0, &["A", "B", "C", "D"], &["B"]),
            question("q2", QuestionKind::MultipleChoice, 4.0, &["A", "B", "C", "D"], &["A", "C"]),
            question("q3", QuestionKind::TextBased, 1.0, &[], &["42"]),
            question("q4", QuestionKind::MultipleChoice, 3.0, &["A", "B", "C"], &["B"]),
        ],
    }
}

pub fn test_settings() -> SessionSettings {
    SessionSettings {
        tick_interval: Duration::from_secs(1),
        check_prior_attempt: true,
        shuffle_seed: Some(7),
    }
}

/// In-memory quiz backend.
pub struct FakeQuizSource {
    quiz: Option<Quiz>,
    attempted: bool,
    pub fetches: AtomicUsize,
    pub attempt_checks: AtomicUsize,
}

impl FakeQuizSource {
    pub fn serving(quiz: Quiz) -> Arc<Self> {
        Arc::new(Self {
            quiz: Some(quiz),
            attempted: false,
            fetches: AtomicUsize::new(0),
            attempt_checks: AtomicUsize::new(0),
        })
    }

    pub fn already_attempted(quiz: Quiz) -> Arc<Self> {
        Arc::new(Self {
            quiz: Some(quiz),
            attempted: true,
            fetches: AtomicUsize::new(0),
            attempt_checks: AtomicUsize::new(0),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            quiz: None,
            attempted: false,
            fetches: AtomicUsize::new(0),
            attempt_checks: AtomicUsize::new(0),
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuizSource for FakeQuizSource {
    async fn fetch_quiz(&self, quiz_id: &str) -> Result<Quiz, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.quiz {
            Some(quiz) if quiz.id == quiz_id => Ok(quiz.clone()),
            _ => Err(ApiError::NotFound {
                endpoint: format!("/quizzes/{}", quiz_id),
            }),
        }
    }

    async fn has_attempted(&self, _quiz_id: &str, _candidate_id: &str) -> Result<bool, ApiError> {
        self.attempt_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.attempted)
    }
}

/// Records every payload it is handed; optionally answers with a server error.
pub struct RecordingSubmitter {
    fail: bool,
    payloads: Mutex<Vec<SubmissionPayload>>,
}

impl RecordingSubmitter {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<SubmissionPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSubmitter for RecordingSubmitter {
    async fn submit_result(&self, payload: &SubmissionPayload) -> Result<(), ApiError> {
        self.payloads.lock().unwrap().push(payload.clone());
        if self.fail {
            return Err(ApiError::Status {
                endpoint: format!("/quizzes/{}/results", payload.quiz_id),
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        Ok(())
    }
}

pub fn new_session(
    source: Arc<FakeQuizSource>,
    submitter: Arc<RecordingSubmitter>,
    settings: SessionSettings,
) -> Arc<QuizSession> {
    QuizSession::new("quiz-1", "cand-1", source, submitter, settings)
}

/// Loads the sample quiz into a fresh session.
pub async fn started_session() -> (Arc<QuizSession>, Arc<RecordingSubmitter>) {
    init_tracing();
    let submitter = RecordingSubmitter::accepting();
    let session = new_session(
        FakeQuizSource::serving(sample_quiz()),
        submitter.clone(),
        test_settings(),
    );
    session.load().await.unwrap();
    (session, submitter)
}

pub async fn wait_for_transmission(session: &QuizSession) {
    let mut rx = session.watch_transmission();
    rx.wait_for(|status| status.is_settled()).await.unwrap();
}
