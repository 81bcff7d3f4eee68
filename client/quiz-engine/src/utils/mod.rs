pub mod retry;
pub mod time;
