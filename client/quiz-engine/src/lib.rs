//! Timed quiz attempts: randomized presentation order, a countdown that auto-submits,
//! answer capture with single and multiple selection, partial-credit scoring and a single
//! result submission to the quiz backend.

pub mod config;
pub mod console;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{ApiError, SessionError};
pub use models::{QuizResult, SessionEvent, SessionState, TransmissionStatus};
pub use services::{HttpQuizApi, QuizSession, QuizSource, ResultSubmitter, SessionSettings};
