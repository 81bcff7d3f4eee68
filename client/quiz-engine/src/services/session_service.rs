use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::error::SessionError;
use crate::metrics::{
    record_score, DATA_INCONSISTENCIES_TOTAL, DUPLICATE_SUBMITS_IGNORED_TOTAL,
    RESULT_TRANSMISSIONS_TOTAL, SESSIONS_ACTIVE, SESSIONS_TOTAL, SUBMISSIONS_TOTAL,
};
use crate::models::{
    Question, Quiz, QuizResult, Selection, SessionEvent, SessionState, SubmissionPayload,
    SubmitTrigger, TimerEvent, TransmissionStatus,
};
use crate::services::answer_store::AnswerStore;
use crate::services::countdown_timer::CountdownTimer;
use crate::services::quiz_api::QuizSource;
use crate::services::randomizer::shuffled;
use crate::services::result_submitter::{build_payload, ResultSubmitter};
use crate::services::scorer;
use crate::utils::time::whole_seconds;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Wall time of one countdown second.
    pub tick_interval: Duration,
    pub check_prior_attempt: bool,
    /// Fixes the presentation order; random when `None`.
    pub shuffle_seed: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            check_prior_attempt: true,
            shuffle_seed: None,
        }
    }
}

/// Mutable state of a running attempt. Exists from `InProgress` onwards.
struct Attempt {
    quiz: Arc<Quiz>,
    order: Vec<Question>,
    cursor: usize,
    answers: AnswerStore,
    started_at: Instant,
    timer: Option<CountdownTimer>,
    pump: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    attempt: Option<Attempt>,
    result: Option<QuizResult>,
    error: Option<String>,
}

/// One timed attempt of one candidate at one quiz.
///
/// `Loading -> InProgress -> Submitting -> Submitted`, with `Error` reachable while
/// loading. The `InProgress -> Submitting` edge is a compare-and-set on the state, so
/// whichever of manual submit and timer expiry gets there first wins and the other is
/// a silent no-op. Answers are scored exactly once, from the store frozen at that edge.
pub struct QuizSession {
    attempt_id: Uuid,
    quiz_id: String,
    candidate_id: String,
    source: Arc<dyn QuizSource>,
    submitter: Arc<dyn ResultSubmitter>,
    settings: SessionSettings,
    state: AtomicU8,
    load_claimed: AtomicBool,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
    transmission: Arc<watch::Sender<TransmissionStatus>>,
}

impl QuizSession {
    pub fn new(
        quiz_id: impl Into<String>,
        candidate_id: impl Into<String>,
        source: Arc<dyn QuizSource>,
        submitter: Arc<dyn ResultSubmitter>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (transmission, _) = watch::channel(TransmissionStatus::NotStarted);

        Arc::new(Self {
            attempt_id: Uuid::new_v4(),
            quiz_id: quiz_id.into(),
            candidate_id: candidate_id.into(),
            source,
            submitter,
            settings,
            state: AtomicU8::new(SessionState::Loading as u8),
            load_claimed: AtomicBool::new(false),
            inner: Mutex::new(Inner::default()),
            events,
            transmission: Arc::new(transmission),
        })
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn quiz_id(&self) -> &str {
        &self.quiz_id
    }

    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Fetches the quiz and starts the attempt. Can only run once per session.
    pub async fn load(self: &Arc<Self>) -> Result<(), SessionError> {
        if self.load_claimed.swap(true, Ordering::SeqCst) {
            return Err(SessionError::IllegalState {
                operation: "load the quiz",
                state: self.state(),
            });
        }

        tracing::info!(
            "Loading quiz {} for candidate {} (attempt {})",
            self.quiz_id,
            self.candidate_id,
            self.attempt_id
        );

        match self.fetch_checked_quiz().await {
            Ok(quiz) => {
                self.begin(quiz);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn fetch_checked_quiz(&self) -> Result<Quiz, SessionError> {
        let quiz_id = self.quiz_id.trim();
        if quiz_id.is_empty() || quiz_id.contains('/') {
            return Err(SessionError::InvalidQuizId(self.quiz_id.clone()));
        }

        if self.settings.check_prior_attempt {
            let attempted = self
                .source
                .has_attempted(quiz_id, &self.candidate_id)
                .await
                .map_err(|source| SessionError::LoadFailed {
                    quiz_id: quiz_id.to_string(),
                    source,
                })?;
            if attempted {
                return Err(SessionError::AlreadyAttempted {
                    quiz_id: quiz_id.to_string(),
                    candidate_id: self.candidate_id.clone(),
                });
            }
        }

        let quiz = self
            .source
            .fetch_quiz(quiz_id)
            .await
            .map_err(|source| SessionError::LoadFailed {
                quiz_id: quiz_id.to_string(),
                source,
            })?;

        quiz.validate().map_err(|e| SessionError::InvalidQuiz {
            quiz_id: quiz_id.to_string(),
            reason: e.to_string(),
        })?;

        for question in &quiz.questions {
            let dangling = question.dangling_correct_keys();
            if !dangling.is_empty() {
                tracing::warn!(
                    "Quiz {} question {} lists correct keys {:?} that are not options",
                    quiz.id,
                    question.id,
                    dangling
                );
            }
        }

        Ok(quiz)
    }

    fn begin(self: &Arc<Self>, quiz: Quiz) {
        let order = match self.settings.shuffle_seed {
            Some(seed) => shuffled(&quiz.questions, &mut StdRng::seed_from_u64(seed)),
            None => shuffled(&quiz.questions, &mut rand::rng()),
        };
        let answers = AnswerStore::for_quiz(&quiz);
        let duration_seconds = quiz.duration_seconds;
        let question_count = quiz.questions.len();

        let mut inner = self.lock_inner();
        inner.attempt = Some(Attempt {
            quiz: Arc::new(quiz),
            order,
            cursor: 0,
            answers,
            started_at: Instant::now(),
            timer: None,
            pump: None,
        });
        self.set_state(SessionState::InProgress);

        // Started under the lock so an early expiry waits for the attempt to be complete.
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let timer = CountdownTimer::start(duration_seconds, self.settings.tick_interval, timer_tx);
        let pump = tokio::spawn(pump_timer_events(Arc::downgrade(self), timer_rx));
        if let Some(attempt) = inner.attempt.as_mut() {
            attempt.timer = Some(timer);
            attempt.pump = Some(pump);
        }
        drop(inner);

        SESSIONS_TOTAL.with_label_values(&["started"]).inc();
        SESSIONS_ACTIVE.inc();
        tracing::info!(
            "Attempt {} started: {} questions, {}s budget",
            self.attempt_id,
            question_count,
            duration_seconds
        );
    }

    fn fail(&self, err: &SessionError) {
        let outcome = match err {
            SessionError::AlreadyAttempted { .. } => "already_attempted",
            SessionError::InvalidQuiz { .. } | SessionError::InvalidQuizId(_) => "invalid_quiz",
            _ => "load_failed",
        };
        SESSIONS_TOTAL.with_label_values(&[outcome]).inc();
        tracing::error!("Attempt {} could not start: {}", self.attempt_id, err);

        let mut inner = self.lock_inner();
        inner.error = Some(err.to_string());
        self.set_state(SessionState::Error);
    }

    /// Candidate-initiated submit. `None` if the session already left `InProgress`.
    pub fn submit(&self) -> Option<QuizResult> {
        self.trigger_submit(SubmitTrigger::Manual)
    }

    /// The single guarded `InProgress -> Submitting -> Submitted` transition.
    fn trigger_submit(&self, trigger: SubmitTrigger) -> Option<QuizResult> {
        if let Err(current) = self.state.compare_exchange(
            SessionState::InProgress as u8,
            SessionState::Submitting as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            DUPLICATE_SUBMITS_IGNORED_TOTAL
                .with_label_values(&[trigger.as_str()])
                .inc();
            tracing::debug!(
                "Ignoring {} submit for attempt {}: session is {}",
                trigger,
                self.attempt_id,
                SessionState::from_u8(current)
            );
            return None;
        }

        SUBMISSIONS_TOTAL.with_label_values(&[trigger.as_str()]).inc();
        tracing::info!("Attempt {} submitting ({})", self.attempt_id, trigger);
        let _ = self
            .events
            .send(SessionEvent::StateChanged(SessionState::Submitting));

        let mut inner = self.lock_inner();
        let Some(attempt) = inner.attempt.as_mut() else {
            tracing::error!("Attempt {} has no answers to submit", self.attempt_id);
            inner.error = Some("session reached submit without a loaded quiz".to_string());
            self.set_state(SessionState::Error);
            return None;
        };

        if let Some(mut timer) = attempt.timer.take() {
            timer.cancel();
        }
        if let Some(pump) = attempt.pump.take() {
            pump.abort();
        }
        attempt.answers.freeze();

        let elapsed_seconds = whole_seconds(attempt.started_at.elapsed());
        let sheet = scorer::score(&attempt.quiz.questions, &attempt.answers);
        let payload = build_payload(
            &attempt.quiz,
            &self.candidate_id,
            elapsed_seconds,
            &attempt.answers,
        );

        let result = QuizResult {
            attempt_id: self.attempt_id,
            quiz_id: attempt.quiz.id.clone(),
            candidate_id: self.candidate_id.clone(),
            total_awarded: sheet.total_awarded,
            total_possible: sheet.total_possible,
            elapsed_seconds,
            questions: sheet.questions,
            trigger,
            submitted_at: Utc::now(),
        };
        inner.result = Some(result.clone());
        self.set_state(SessionState::Submitted);
        drop(inner);

        for scored in result.questions.iter().filter(|s| s.inconsistency.is_some()) {
            DATA_INCONSISTENCIES_TOTAL.inc();
            tracing::warn!(
                "Question {} scored as zero: {:?}",
                scored.question_id,
                scored.inconsistency
            );
        }
        record_score(result.total_awarded, result.total_possible);
        SESSIONS_TOTAL.with_label_values(&["submitted"]).inc();
        SESSIONS_ACTIVE.dec();
        tracing::info!(
            "Attempt {} scored {}/{} in {}s",
            self.attempt_id,
            result.total_awarded,
            result.total_possible,
            elapsed_seconds
        );

        let _ = self
            .events
            .send(SessionEvent::Submitted(Box::new(result.clone())));
        self.transmit(payload);

        Some(result)
    }

    /// Fire-and-forget: the session is already `Submitted` whatever happens here.
    fn transmit(&self, payload: SubmissionPayload) {
        self.transmission.send_replace(TransmissionStatus::Pending);

        let submitter = self.submitter.clone();
        let status = self.transmission.clone();
        let events = self.events.clone();
        let attempt_id = self.attempt_id;

        tokio::spawn(async move {
            match submitter.submit_result(&payload).await {
                Ok(()) => {
                    RESULT_TRANSMISSIONS_TOTAL
                        .with_label_values(&["delivered"])
                        .inc();
                    tracing::info!("Attempt {} result delivered", attempt_id);
                    status.send_replace(TransmissionStatus::Delivered);
                    let _ = events.send(SessionEvent::TransmissionDelivered);
                }
                Err(e) => {
                    RESULT_TRANSMISSIONS_TOTAL
                        .with_label_values(&["failed"])
                        .inc();
                    tracing::warn!("Attempt {} result not delivered: {}", attempt_id, e);
                    let reason = e.to_string();
                    status.send_replace(TransmissionStatus::Failed(reason.clone()));
                    let _ = events.send(SessionEvent::TransmissionFailed(reason));
                }
            }
        });
    }

    pub fn set_answer(&self, question_id: &str, key: &str) -> Result<(), SessionError> {
        self.with_attempt_mut("change answers", |attempt| {
            attempt.answers.set_answer(question_id, key)
        })
    }

    pub fn toggle_answer(&self, question_id: &str, key: &str) -> Result<(), SessionError> {
        self.with_attempt_mut("change answers", |attempt| {
            attempt.answers.toggle_answer(question_id, key)
        })
    }

    pub fn get_answer(&self, question_id: &str) -> Option<Selection> {
        let inner = self.lock_inner();
        inner
            .attempt
            .as_ref()
            .and_then(|a| a.answers.get_answer(question_id).cloned())
    }

    pub fn answered_count(&self) -> usize {
        let inner = self.lock_inner();
        inner
            .attempt
            .as_ref()
            .map_or(0, |a| a.answers.answered_count())
    }

    /// Moves the cursor. Returns `Ok(false)` for an out-of-range or unchanged index.
    pub fn go_to(&self, index: usize) -> Result<bool, SessionError> {
        self.with_attempt_mut("navigate", |attempt| {
            if index >= attempt.order.len() || index == attempt.cursor {
                return Ok(false);
            }
            attempt.cursor = index;
            Ok(true)
        })
    }

    pub fn next(&self) -> Result<bool, SessionError> {
        match self.current_index() {
            Some(index) => self.go_to(index + 1),
            None => self.go_to(0),
        }
    }

    pub fn previous(&self) -> Result<bool, SessionError> {
        match self.current_index() {
            Some(index) if index > 0 => self.go_to(index - 1),
            _ => self.go_to(usize::MAX),
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        let inner = self.lock_inner();
        inner.attempt.as_ref().map(|a| a.cursor)
    }

    pub fn question_count(&self) -> usize {
        let inner = self.lock_inner();
        inner.attempt.as_ref().map_or(0, |a| a.order.len())
    }

    pub fn current_question(&self) -> Option<Question> {
        let inner = self.lock_inner();
        inner
            .attempt
            .as_ref()
            .and_then(|a| a.order.get(a.cursor).cloned())
    }

    /// Questions in presentation order.
    pub fn questions(&self) -> Vec<Question> {
        let inner = self.lock_inner();
        inner
            .attempt
            .as_ref()
            .map(|a| a.order.clone())
            .unwrap_or_default()
    }

    pub fn quiz(&self) -> Option<Arc<Quiz>> {
        let inner = self.lock_inner();
        inner.attempt.as_ref().map(|a| a.quiz.clone())
    }

    /// `None` before the attempt starts and after the timer is cancelled.
    pub fn remaining_seconds(&self) -> Option<u64> {
        let inner = self.lock_inner();
        inner
            .attempt
            .as_ref()
            .and_then(|a| a.timer.as_ref())
            .map(CountdownTimer::remaining_seconds)
    }

    pub fn result(&self) -> Option<QuizResult> {
        self.lock_inner().result.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.lock_inner().error.clone()
    }

    pub fn transmission_status(&self) -> TransmissionStatus {
        self.transmission.borrow().clone()
    }

    pub fn watch_transmission(&self) -> watch::Receiver<TransmissionStatus> {
        self.transmission.subscribe()
    }

    fn with_attempt_mut<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Attempt) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut inner = self.lock_inner();
        let state = self.state();
        if state != SessionState::InProgress {
            return Err(SessionError::IllegalState { operation, state });
        }
        match inner.attempt.as_mut() {
            Some(attempt) => f(attempt),
            None => Err(SessionError::IllegalState { operation, state }),
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
        tracing::debug!("Attempt {} is now {}", self.attempt_id, state);
        let _ = self.events.send(SessionEvent::StateChanged(state));
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for QuizSession {
    fn drop(&mut self) {
        if self.state() == SessionState::InProgress {
            SESSIONS_ACTIVE.dec();
            tracing::warn!("Attempt {} dropped while in progress", self.attempt_id);
        }
    }
}

/// Forwards timer ticks to subscribers and turns expiry into a submit.
async fn pump_timer_events(
    session: Weak<QuizSession>,
    mut timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
) {
    while let Some(event) = timer_rx.recv().await {
        let Some(session) = session.upgrade() else {
            return;
        };
        match event {
            TimerEvent::TimerTick(tick) => {
                if session.state() == SessionState::InProgress {
                    let _ = session.events.send(SessionEvent::Tick {
                        remaining_seconds: tick.remaining_seconds,
                    });
                }
            }
            TimerEvent::TimeExpired(_) => {
                let _ = session.events.send(SessionEvent::Tick {
                    remaining_seconds: 0,
                });
                session.trigger_submit(SubmitTrigger::TimerExpired);
                return;
            }
        }
    }
}
