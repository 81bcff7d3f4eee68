use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What the candidate currently has selected for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Selection {
    /// One option key, or free text for text-based questions.
    Single(String),
    /// Multi-select keys. An empty set reads back the same as "no selection".
    Multiple(BTreeSet<String>),
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::Single(key) => key.is_empty(),
            Selection::Multiple(keys) => keys.is_empty(),
        }
    }

    /// Keys in a stable order, as they go on the wire.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Selection::Single(key) if key.is_empty() => Vec::new(),
            Selection::Single(key) => vec![key.clone()],
            Selection::Multiple(keys) => keys.iter().cloned().collect(),
        }
    }
}
