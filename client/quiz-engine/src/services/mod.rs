pub mod answer_store;
pub mod countdown_timer;
pub mod quiz_api;
pub mod randomizer;
pub mod result_submitter;
pub mod scorer;
pub mod session_service;

pub use answer_store::AnswerStore;
pub use countdown_timer::CountdownTimer;
pub use quiz_api::{HttpQuizApi, QuizSource};
pub use result_submitter::ResultSubmitter;
pub use session_service::{QuizSession, SessionSettings};
