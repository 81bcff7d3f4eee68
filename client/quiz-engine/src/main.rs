use std::sync::Arc;

use anyhow::{anyhow, Context};
use quiz_engine::{
    config::Config,
    console::{self, HELP},
    metrics,
    models::{SessionEvent, SubmitTrigger},
    HttpQuizApi, QuizSession, SessionState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quiz_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load().context("Failed to load configuration")?;

    let mut args = std::env::args().skip(1);
    let quiz_id = args
        .next()
        .ok_or_else(|| anyhow!("usage: quiz-engine <quiz-id> [candidate-id]"))?;
    let candidate_id = args
        .next()
        .or_else(|| config.candidate_id.clone())
        .ok_or_else(|| anyhow!("candidate id missing: pass it or set QUIZ__CANDIDATE_ID"))?;

    let api = Arc::new(HttpQuizApi::new(&config.api).context("Failed to build API client")?);
    let session = QuizSession::new(
        quiz_id,
        candidate_id,
        api.clone(),
        api,
        config.session_settings(),
    );
    let mut events = session.subscribe();

    if let Err(e) = session.load().await {
        println!("Cannot start this quiz: {}", e);
        println!("Go back and try again later.");
        return Ok(());
    }

    if let Some(quiz) = session.quiz() {
        println!("{}", quiz.name);
        if !quiz.description.is_empty() {
            println!("{}", quiz.description);
        }
    }
    println!("{}\n", HELP);
    println!("{}", console::execute(&session, console::Command::Show)?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line? {
                    Some(line) => match console::parse_command(&line) {
                        Ok(command) => match console::execute(&session, command) {
                            Ok(output) => println!("{}", output),
                            Err(e) => println!("{}", e),
                        },
                        Err(message) => println!("{}", message),
                    },
                    None => {
                        input_open = false;
                        match console::execute(&session, console::Command::Submit) {
                            Ok(output) => println!("{}", output),
                            Err(e) => println!("{}", e),
                        }
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(SessionEvent::Tick { remaining_seconds }) if remaining_seconds > 0 && remaining_seconds % 60 == 0 => {
                        println!("{} minute(s) left", remaining_seconds / 60);
                    }
                    Ok(SessionEvent::Submitted(result)) => {
                        if result.trigger == SubmitTrigger::TimerExpired {
                            println!("Time is up.");
                            println!("{}", console::render_result(&result));
                        }
                    }
                    Ok(SessionEvent::TransmissionDelivered) => {
                        println!("Result saved.");
                        break;
                    }
                    Ok(SessionEvent::TransmissionFailed(reason)) => {
                        println!("Your result is shown above but could not be saved: {}", reason);
                        break;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Skipped {} session events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    if session.state() != SessionState::Submitted || !session.transmission_status().is_settled() {
        tracing::warn!("Exiting before the result was transmitted");
    }
    match metrics::render_metrics() {
        Ok(text) => tracing::debug!("Metrics at exit:\n{}", text),
        Err(e) => tracing::warn!("Failed to render metrics: {}", e),
    }

    Ok(())
}
