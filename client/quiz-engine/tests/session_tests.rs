mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    init_tracing, new_session, sample_quiz, started_session, test_settings,
    wait_for_transmission, FakeQuizSource, RecordingSubmitter,
};
use quiz_engine::error::{ApiError, SessionError};
use quiz_engine::models::{Quiz, SubmitTrigger};
use quiz_engine::{SessionEvent, SessionSettings, SessionState, TransmissionStatus};
use tokio::sync::{broadcast, Barrier};

fn timed_quiz(duration_seconds: u64) -> Quiz {
    Quiz {
        duration_seconds,
        ..sample_quiz()
    }
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn load_starts_the_attempt() {
    let (session, _) = started_session().await;

    assert_eq!(session.state(), SessionState::InProgress);
    assert_eq!(session.question_count(), 4);
    assert_eq!(session.current_index(), Some(0));
    assert_eq!(session.remaining_seconds(), Some(60));
    assert_eq!(session.answered_count(), 0);

    let mut ids: Vec<String> = session.questions().into_iter().map(|q| q.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["q1", "q2", "q3", "q4"]);

    // The quiz itself keeps definition order.
    let quiz = session.quiz().unwrap();
    assert_eq!(quiz.questions[0].id, "q1");
}

#[tokio::test(start_paused = true)]
async fn same_seed_gives_same_order() {
    init_tracing();
    let order = |session: &quiz_engine::QuizSession| -> Vec<String> {
        session.questions().into_iter().map(|q| q.id).collect()
    };

    let first = new_session(
        FakeQuizSource::serving(sample_quiz()),
        RecordingSubmitter::accepting(),
        test_settings(),
    );
    let second = new_session(
        FakeQuizSource::serving(sample_quiz()),
        RecordingSubmitter::accepting(),
        test_settings(),
    );
    first.load().await.unwrap();
    second.load().await.unwrap();

    assert_eq!(order(&first), order(&second));
}

#[tokio::test(start_paused = true)]
async fn malformed_quiz_id_fails_without_a_request() {
    init_tracing();
    for quiz_id in ["", "   ", "a/b"] {
        let source = FakeQuizSource::serving(sample_quiz());
        let session = quiz_engine::QuizSession::new(
            quiz_id,
            "cand-1",
            source.clone(),
            RecordingSubmitter::accepting(),
            test_settings(),
        );

        let err = session.load().await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidQuizId(_)));
        assert!(err.blocks_session());
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(source.fetch_count(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn missing_quiz_moves_to_error() {
    init_tracing();
    let session = new_session(
        FakeQuizSource::empty(),
        RecordingSubmitter::accepting(),
        test_settings(),
    );

    let err = session.load().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::LoadFailed {
            source: ApiError::NotFound { .. },
            ..
        }
    ));
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.error().is_some());
    assert!(session.questions().is_empty());
    assert!(session.submit().is_none());
}

#[tokio::test(start_paused = true)]
async fn prior_attempt_blocks_the_session() {
    init_tracing();
    let source = FakeQuizSource::already_attempted(sample_quiz());
    let session = new_session(source.clone(), RecordingSubmitter::accepting(), test_settings());

    let err = session.load().await.unwrap_err();

    assert!(matches!(err, SessionError::AlreadyAttempted { .. }));
    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn prior_attempt_check_can_be_disabled() {
    init_tracing();
    let source = FakeQuizSource::already_attempted(sample_quiz());
    let settings = SessionSettings {
        check_prior_attempt: false,
        ..test_settings()
    };
    let session = new_session(source.clone(), RecordingSubmitter::accepting(), settings);

    session.load().await.unwrap();

    assert_eq!(session.state(), SessionState::InProgress);
    assert_eq!(
        source
            .attempt_checks
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn quiz_with_duplicate_question_ids_is_rejected() {
    init_tracing();
    let mut quiz = sample_quiz();
    quiz.questions[1].id = "q1".to_string();
    let session = new_session(
        FakeQuizSource::serving(quiz),
        RecordingSubmitter::accepting(),
        test_settings(),
    );

    let err = session.load().await.unwrap_err();

    assert!(matches!(err, SessionError::InvalidQuiz { .. }));
    assert_eq!(session.state(), SessionState::Error);
}

#[tokio::test(start_paused = true)]
async fn load_runs_only_once() {
    let (session, _) = started_session().await;

    let err = session.load().await.unwrap_err();
    assert!(matches!(err, SessionError::IllegalState { .. }));
    assert_eq!(session.state(), SessionState::InProgress);
}

#[tokio::test(start_paused = true)]
async fn answering_before_load_is_an_illegal_state() {
    init_tracing();
    let session = new_session(
        FakeQuizSource::serving(sample_quiz()),
        RecordingSubmitter::accepting(),
        test_settings(),
    );

    let err = session.set_answer("q1", "B").unwrap_err();
    assert!(matches!(
        err,
        SessionError::IllegalState {
            state: SessionState::Loading,
            ..
        }
    ));
    assert!(session.submit().is_none());
    assert_eq!(session.state(), SessionState::Loading);
}

#[tokio::test(start_paused = true)]
async fn navigation_stays_in_bounds() {
    let (session, _) = started_session().await;

    assert!(!session.previous().unwrap());
    assert_eq!(session.current_index(), Some(0));

    assert!(session.next().unwrap());
    assert!(session.next().unwrap());
    assert!(session.next().unwrap());
    assert_eq!(session.current_index(), Some(3));
    assert!(!session.next().unwrap());

    assert!(!session.go_to(4).unwrap());
    assert!(!session.go_to(3).unwrap());
    assert!(session.go_to(1).unwrap());
    assert_eq!(session.current_index(), Some(1));

    let shown = session.current_question().unwrap();
    assert_eq!(shown.id, session.questions()[1].id);
}

#[tokio::test(start_paused = true)]
async fn answers_follow_the_question_kind() {
    let (session, _) = started_session().await;

    session.set_answer("q1", "A").unwrap();
    session.set_answer("q1", "B").unwrap();
    session.toggle_answer("q2", "A").unwrap();
    session.toggle_answer("q2", "D").unwrap();
    session.toggle_answer("q2", "D").unwrap();

    assert_eq!(session.get_answer("q1").unwrap().keys(), vec!["B".to_string()]);
    assert_eq!(session.get_answer("q2").unwrap().keys(), vec!["A".to_string()]);
    assert_eq!(session.answered_count(), 2);

    assert!(matches!(
        session.set_answer("q1", "Z"),
        Err(SessionError::UnknownOption { .. })
    ));
    assert!(matches!(
        session.set_answer("q2", "A"),
        Err(SessionError::KindMismatch { .. })
    ));
    assert!(matches!(
        session.set_answer("nope", "A"),
        Err(SessionError::UnknownQuestion(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn manual_submit_scores_and_transmits_once() {
    let (session, submitter) = started_session().await;
    let mut events = session.subscribe();

    session.set_answer("q1", "B").unwrap();
    session.toggle_answer("q2", "A").unwrap();
    session.toggle_answer("q2", "C").unwrap();
    session.set_answer("q3", "42").unwrap();

    let result = session.submit().unwrap();

    assert_eq!(result.trigger, SubmitTrigger::Manual);
    assert_eq!(result.total_awarded, 7.0);
    assert_eq!(result.total_possible, 10.0);
    assert_eq!(result.elapsed_seconds, 0);
    assert_eq!(result.attempt_id, session.attempt_id());
    assert_eq!(session.state(), SessionState::Submitted);
    assert_eq!(session.result(), Some(result.clone()));
    assert_eq!(session.remaining_seconds(), None);

    wait_for_transmission(&session).await;
    assert_eq!(session.transmission_status(), TransmissionStatus::Delivered);
    assert_eq!(submitter.calls(), 1);

    let payload = &submitter.payloads()[0];
    assert_eq!(payload.quiz_id, "quiz-1");
    assert_eq!(payload.candidate_id, "cand-1");
    let ids: Vec<&str> = payload.answers.iter().map(|a| a.question_id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2", "q3", "q4"]);
    assert_eq!(
        payload.answers[1].selected_keys,
        vec!["A".to_string(), "C".to_string()]
    );
    assert!(payload.answers[3].selected_keys.is_empty());

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::StateChanged(SessionState::Submitted))));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Submitted(r) if r.total_awarded == 7.0)));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::TransmissionDelivered)));
}

#[tokio::test(start_paused = true)]
async fn submitted_session_is_read_only() {
    let (session, submitter) = started_session().await;
    session.set_answer("q1", "B").unwrap();
    let first = session.submit().unwrap();

    assert!(matches!(
        session.set_answer("q1", "A"),
        Err(SessionError::IllegalState {
            state: SessionState::Submitted,
            ..
        })
    ));
    assert!(session.toggle_answer("q2", "A").is_err());
    assert!(session.go_to(2).is_err());
    assert!(session.submit().is_none());

    // The original deadline passing changes nothing either.
    tokio::time::sleep(Duration::from_secs(90)).await;

    // Answers read back as they were frozen.
    assert_eq!(session.get_answer("q1").unwrap().keys(), vec!["B".to_string()]);
    assert_eq!(session.result(), Some(first));
    assert_eq!(session.state(), SessionState::Submitted);

    wait_for_transmission(&session).await;
    assert_eq!(submitter.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn timer_expiry_submits_automatically() {
    init_tracing();
    let submitter = RecordingSubmitter::accepting();
    let session = new_session(
        FakeQuizSource::serving(timed_quiz(3)),
        submitter.clone(),
        test_settings(),
    );
    let mut events = session.subscribe();
    session.load().await.unwrap();
    session.set_answer("q1", "B").unwrap();

    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(session.state(), SessionState::Submitted);
    let result = session.result().unwrap();
    assert_eq!(result.trigger, SubmitTrigger::TimerExpired);
    assert_eq!(result.elapsed_seconds, 3);
    assert_eq!(result.total_awarded, 2.0);

    wait_for_transmission(&session).await;
    assert_eq!(submitter.calls(), 1);

    let remaining: Vec<u64> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Tick { remaining_seconds } => Some(remaining_seconds),
            _ => None,
        })
        .collect();
    assert!(remaining.starts_with(&[2, 1, 0]));
    assert!(remaining.iter().all(|r| *r <= 2));
}

#[tokio::test(start_paused = true)]
async fn manual_submit_stops_the_countdown() {
    init_tracing();
    let submitter = RecordingSubmitter::accepting();
    let session = new_session(
        FakeQuizSource::serving(timed_quiz(3)),
        submitter.clone(),
        test_settings(),
    );
    session.load().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let mut events = session.subscribe();
    let result = session.submit().unwrap();
    assert_eq!(result.elapsed_seconds, 1);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(session.result().unwrap().trigger, SubmitTrigger::Manual);
    assert_eq!(submitter.calls(), 1);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::Tick { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_produce_one_result() {
    let (session, submitter) = started_session().await;
    session.set_answer("q1", "B").unwrap();

    let racers = 16;
    let barrier = Arc::new(Barrier::new(racers));
    let mut handles = Vec::new();
    for _ in 0..racers {
        let session = session.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            session.submit()
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(result) = handle.await.unwrap() {
            winners.push(result);
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(session.result(), Some(winners[0].clone()));
    assert_eq!(session.state(), SessionState::Submitted);

    wait_for_transmission(&session).await;
    assert_eq!(submitter.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn manual_submit_at_the_deadline_races_expiry_once() {
    init_tracing();
    for submit_at_ms in [2_999, 3_000, 3_001] {
        let submitter = RecordingSubmitter::accepting();
        let session = new_session(
            FakeQuizSource::serving(timed_quiz(3)),
            submitter.clone(),
            test_settings(),
        );
        session.load().await.unwrap();
        session.set_answer("q1", "B").unwrap();

        tokio::time::sleep(Duration::from_millis(submit_at_ms)).await;
        let manual = session.submit();
        tokio::time::sleep(Duration::from_secs(5)).await;
        wait_for_transmission(&session).await;

        let result = session.result().unwrap();
        match &manual {
            Some(manual) => {
                assert_eq!(manual.trigger, SubmitTrigger::Manual);
                assert_eq!(&result, manual);
            }
            None => assert_eq!(result.trigger, SubmitTrigger::TimerExpired),
        }
        match submit_at_ms {
            2_999 => assert_eq!(result.trigger, SubmitTrigger::Manual),
            3_001 => assert_eq!(result.trigger, SubmitTrigger::TimerExpired),
            _ => {}
        }
        assert_eq!(result.total_awarded, 2.0);
        assert_eq!(session.state(), SessionState::Submitted);
        assert_eq!(submitter.calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn failed_transmission_keeps_the_result() {
    init_tracing();
    let submitter = RecordingSubmitter::failing();
    let session = new_session(
        FakeQuizSource::serving(sample_quiz()),
        submitter.clone(),
        test_settings(),
    );
    session.load().await.unwrap();
    let mut events = session.subscribe();
    session.set_answer("q1", "B").unwrap();

    let result = session.submit().unwrap();
    wait_for_transmission(&session).await;

    assert_eq!(session.state(), SessionState::Submitted);
    assert_eq!(session.result(), Some(result));
    assert!(matches!(
        session.transmission_status(),
        TransmissionStatus::Failed(ref reason) if reason.contains("503")
    ));
    assert_eq!(submitter.calls(), 1);
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::TransmissionFailed(_))));

    // Not retried later either.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(submitter.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn unanswered_attempt_scores_zero() {
    let (session, submitter) = started_session().await;

    let result = session.submit().unwrap();

    assert_eq!(result.total_awarded, 0.0);
    assert_eq!(result.total_possible, 10.0);
    assert_eq!(result.percentage(), 0.0);
    wait_for_transmission(&session).await;
    assert!(submitter.payloads()[0]
        .answers
        .iter()
        .all(|a| a.selected_keys.is_empty()));
}
