//! Database schema and row types

use crate::room::ParticipantIdentifier;
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS records (
    key TEXT PRIMARY KEY,
    record_type TEXT NOT NULL,
    value TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_type ON records(record_type);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    room_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    author_id TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    turn_index INTEGER
);

CREATE INDEX IF NOT EXISTS idx_messages_room ON messages(room_id, created_at, id);

CREATE TABLE IF NOT EXISTS contacts (
    identifier_type TEXT NOT NULL,
    identifier TEXT NOT NULL,
    user_id TEXT NOT NULL,
    discoverable BOOLEAN NOT NULL DEFAULT 1,
    PRIMARY KEY (identifier_type, identifier)
);
";

/// Which column family a contact lookup goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Email,
    Phone,
}

impl ContactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContactKind::Email => "email",
            ContactKind::Phone => "phone",
        }
    }

    /// Split an identifier into lookup kind and value. Lightward and the
    /// local user are never looked up.
    pub fn of(identifier: &ParticipantIdentifier) -> Option<(Self, &str)> {
        match identifier {
            ParticipantIdentifier::Email(email) => Some((ContactKind::Email, email.as_str())),
            ParticipantIdentifier::Phone(phone) => Some((ContactKind::Phone, phone.as_str())),
            ParticipantIdentifier::Lightward | ParticipantIdentifier::LocalUser => None,
        }
    }
}

/// A known user reachable by email or phone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub kind: ContactKind,
    pub identifier: String,
    pub user_id: String,
    /// Users can opt out of being found by others
    pub discoverable: bool,
}

/// Emails are matched case-insensitively; phone numbers keep digits and a
/// leading `+` only.
pub fn normalize_identifier(kind: ContactKind, value: &str) -> String {
    match kind {
        ContactKind::Email => value.trim().to_lowercase(),
        ContactKind::Phone => value
            .trim()
            .chars()
            .enumerate()
            .filter(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '+'))
            .map(|(_, c)| c)
            .collect(),
    }
}
