//! Room messages. Append-only: never edited or deleted once stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Something a participant said
    Speech,
    /// A system line about a participant ("Lightward is listening")
    Narration,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Speech => "speech",
            MessageKind::Narration => "narration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "speech" => Some(MessageKind::Speech),
            "narration" => Some(MessageKind::Narration),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub kind: MessageKind,
    /// Speaker for speech; the participant being described for narration
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Turn the message was written on. Unset for messages from outside the
    /// turn loop.
    #[serde(default)]
    pub turn_index: Option<u64>,
}

impl Message {
    pub fn speech(
        room_id: impl Into<String>,
        author_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(MessageKind::Speech, room_id, author_id, text)
    }

    pub fn narration(
        room_id: impl Into<String>,
        author_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::new(MessageKind::Narration, room_id, author_id, text)
    }

    fn new(
        kind: MessageKind,
        room_id: impl Into<String>,
        author_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            kind,
            author_id: author_id.into(),
            text: text.into(),
            created_at: Utc::now(),
            turn_index: None,
        }
    }

    #[must_use]
    pub fn at_turn(mut self, turn_index: u64) -> Self {
        self.turn_index = Some(turn_index);
        self
    }
}

pub fn listening_narration(nickname: &str) -> String {
    format!("{nickname} is listening")
}

pub fn departure_narration(nickname: &str) -> String {
    format!("{nickname} has departed")
}
