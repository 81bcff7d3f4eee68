use std::fmt::Write;

use crate::error::SessionError;
use crate::models::{Classification, Question, QuestionKind, QuizResult, Selection};
use crate::services::QuizSession;
use crate::utils::time::format_clock;

pub const HELP: &str = "\
commands:
  n, next        next question
  p, prev        previous question
  g <n>          go to question n
  a <key>        select option (single choice)
  t <key>        toggle option (multiple choice)
  x <text>       free-text answer
  q, show        show the current question
  s, submit      submit the attempt
  h, help        this help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    /// Zero-based; the user types one-based numbers.
    GoTo(usize),
    Select(String),
    Toggle(String),
    Text(String),
    Show,
    Submit,
    Help,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let argument = |name: &str| {
        if rest.is_empty() {
            Err(format!("{} needs an argument", name))
        } else {
            Ok(rest.to_string())
        }
    };

    match verb.to_ascii_lowercase().as_str() {
        "n" | "next" => Ok(Command::Next),
        "p" | "prev" | "previous" => Ok(Command::Previous),
        "g" | "goto" => {
            let n: usize = argument("goto")?
                .parse()
                .map_err(|_| format!("not a question number: {}", rest))?;
            if n == 0 {
                return Err("questions are numbered from 1".to_string());
            }
            Ok(Command::GoTo(n - 1))
        }
        "a" | "answer" => Ok(Command::Select(argument("answer")?.to_ascii_uppercase())),
        "t" | "toggle" => Ok(Command::Toggle(argument("toggle")?.to_ascii_uppercase())),
        "x" | "text" => Ok(Command::Text(argument("text")?)),
        "q" | "show" => Ok(Command::Show),
        "s" | "submit" => Ok(Command::Submit),
        "h" | "help" | "?" => Ok(Command::Help),
        "" => Err("empty command".to_string()),
        other => Err(format!("unknown command: {}", other)),
    }
}

/// Applies a command to the session and returns what to print.
pub fn execute(session: &QuizSession, command: Command) -> Result<String, SessionError> {
    match command {
        Command::Next => {
            session.next()?;
            Ok(render_current(session))
        }
        Command::Previous => {
            session.previous()?;
            Ok(render_current(session))
        }
        Command::GoTo(index) => {
            if !session.go_to(index)? && session.current_index() != Some(index) {
                return Ok(format!("no question {}", index + 1));
            }
            Ok(render_current(session))
        }
        Command::Select(key) | Command::Text(key) => {
            let question = current_question_or_state_error(session)?;
            session.set_answer(&question.id, &key)?;
            Ok(render_current(session))
        }
        Command::Toggle(key) => {
            let question = current_question_or_state_error(session)?;
            session.toggle_answer(&question.id, &key)?;
            Ok(render_current(session))
        }
        Command::Show => Ok(render_current(session)),
        Command::Submit => Ok(match session.submit() {
            Some(result) => render_result(&result),
            None => "already submitted".to_string(),
        }),
        Command::Help => Ok(HELP.to_string()),
    }
}

fn current_question_or_state_error(session: &QuizSession) -> Result<Question, SessionError> {
    session
        .current_question()
        .ok_or(SessionError::IllegalState {
            operation: "change answers",
            state: session.state(),
        })
}

fn render_current(session: &QuizSession) -> String {
    match (session.current_index(), session.current_question()) {
        (Some(index), Some(question)) => render_question(
            index,
            session.question_count(),
            &question,
            session.get_answer(&question.id).as_ref(),
            session.remaining_seconds(),
        ),
        _ => "no question to show".to_string(),
    }
}

pub fn render_question(
    index: usize,
    count: usize,
    question: &Question,
    selection: Option<&Selection>,
    remaining_seconds: Option<u64>,
) -> String {
    let mut out = String::new();
    let _ = write!(out, "[{}/{}] ({} pts", index + 1, count, question.marks);
    if let Some(remaining) = remaining_seconds {
        let _ = write!(out, ", {} left", format_clock(remaining));
    }
    let _ = writeln!(out, ")");
    let _ = writeln!(out, "{}", question.prompt);

    if let Some(snippet) = &question.code_snippet {
        for line in snippet.lines() {
            let _ = writeln!(out, "    {}", line);
        }
    }
    if let Some(image) = &question.image_url {
        let _ = writeln!(out, "  image: {}", image);
    }

    let selected = selection.map(Selection::keys).unwrap_or_default();
    for option in &question.options {
        let mark = if selected.contains(&option.key) { "x" } else { " " };
        let _ = writeln!(out, "  [{}] {}) {}", mark, option.key, option.text);
    }
    if question.kind == QuestionKind::TextBased {
        match selected.first() {
            Some(text) => {
                let _ = writeln!(out, "  answer: {}", text);
            }
            None => {
                let _ = writeln!(out, "  (type x <answer>)");
            }
        }
    }
    if question.kind == QuestionKind::MultipleChoice {
        let _ = writeln!(out, "  (select all that apply)");
    }
    out.trim_end().to_string()
}

pub fn render_result(result: &QuizResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Score: {:.2} / {:.2} ({:.1}%) in {}",
        result.total_awarded,
        result.total_possible,
        result.percentage(),
        format_clock(result.elapsed_seconds)
    );
    for scored in &result.questions {
        let label = match scored.classification {
            Classification::Correct => "correct",
            Classification::PartialCredit => "partial",
            Classification::Incorrect => "incorrect",
        };
        let _ = writeln!(
            out,
            "  {}: {:.2}/{:.2} {}",
            scored.question_id, scored.awarded, scored.marks, label
        );
    }
    out.trim_end().to_string()
}
