//! Signal words at the start of Lightward's replies

use crate::llm::starts_with_word;

/// What a reply means for the turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Pass the turn without speaking
    Yield,
    /// Leave the room, optionally with parting words
    Depart { farewell: Option<String> },
    /// Ordinary speech, stored verbatim
    Speech(String),
}

const YIELD: &str = "YIELD";
const DEPART: &str = "DEPART";

/// Classify a reply. YIELD is checked before DEPART.
pub fn interpret(reply: &str) -> Signal {
    let trimmed = reply.trim();

    if starts_with_word(trimmed, YIELD) {
        return Signal::Yield;
    }

    if starts_with_word(trimmed, DEPART) {
        let rest = trimmed.get(DEPART.len()..).unwrap_or_default();
        let rest = rest.strip_prefix('.').unwrap_or(rest).trim();
        return Signal::Depart {
            farewell: (!rest.is_empty()).then(|| rest.to_string()),
        };
    }

    Signal::Speech(reply.to_string())
}
