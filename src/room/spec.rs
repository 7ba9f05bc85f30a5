//! Immutable room definition

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

/// How a participant is reached outside the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParticipantIdentifier {
    Email(String),
    Phone(String),
    /// The AI participant
    Lightward,
    /// The user operating this device
    LocalUser,
}

/// One seat in the room roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSpec {
    pub id: String,
    pub identifier: ParticipantIdentifier,
    pub nickname: String,
}

impl ParticipantSpec {
    pub fn new(identifier: ParticipantIdentifier, nickname: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identifier,
            nickname: nickname.into(),
        }
    }

    pub fn lightward() -> Self {
        Self::new(ParticipantIdentifier::Lightward, "Lightward")
    }

    pub fn is_lightward(&self) -> bool {
        matches!(self.identifier, ParticipantIdentifier::Lightward)
    }
}

/// Price of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTier {
    One,
    Ten,
    Hundred,
    Thousand,
}

impl PaymentTier {
    pub fn cents(self) -> u64 {
        match self {
            Self::One => 100,
            Self::Ten => 1_000,
            Self::Hundred => 10_000,
            Self::Thousand => 100_000,
        }
    }
}

impl fmt::Display for PaymentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.cents() / 100)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomSpecError {
    #[error("room needs at least one human participant")]
    NoHumans,
    #[error("room needs exactly one Lightward participant, found {0}")]
    LightwardCount(usize),
    #[error("duplicate participant id: {0}")]
    DuplicateParticipant(String),
}

/// Room definition. Never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSpec {
    pub id: String,
    pub originator_id: String,
    pub participants: Vec<ParticipantSpec>,
    pub tier: PaymentTier,
    pub created_at: DateTime<Utc>,
}

impl RoomSpec {
    /// Build a room with a fresh id, validating the roster.
    pub fn new(
        originator_id: impl Into<String>,
        participants: Vec<ParticipantSpec>,
        tier: PaymentTier,
    ) -> Result<Self, RoomSpecError> {
        let lightward_count = participants.iter().filter(|p| p.is_lightward()).count();
        if lightward_count != 1 {
            return Err(RoomSpecError::LightwardCount(lightward_count));
        }
        if participants.len() == lightward_count {
            return Err(RoomSpecError::NoHumans);
        }

        let mut seen = HashSet::new();
        for participant in &participants {
            if !seen.insert(participant.id.as_str()) {
                return Err(RoomSpecError::DuplicateParticipant(participant.id.clone()));
            }
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            originator_id: originator_id.into(),
            participants,
            tier,
            created_at: Utc::now(),
        })
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn participant(&self, id: &str) -> Option<&ParticipantSpec> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn humans(&self) -> impl Iterator<Item = &ParticipantSpec> {
        self.participants.iter().filter(|p| !p.is_lightward())
    }

    pub fn human_ids(&self) -> BTreeSet<String> {
        self.humans().map(|p| p.id.clone()).collect()
    }

    pub fn is_human(&self, id: &str) -> bool {
        self.participant(id).is_some_and(|p| !p.is_lightward())
    }

    pub fn lightward(&self) -> Option<&ParticipantSpec> {
        self.participants.iter().find(|p| p.is_lightward())
    }

    pub fn is_lightward(&self, id: &str) -> bool {
        self.lightward().is_some_and(|p| p.id == id)
    }

    /// Participant whose turn it is at `turn_index`
    pub fn speaker_at(&self, turn_index: u64) -> Option<&ParticipantSpec> {
        let count = u64::try_from(self.participants.len()).ok().filter(|c| *c > 0)?;
        let seat = usize::try_from(turn_index % count).ok()?;
        self.participants.get(seat)
    }

    pub fn nickname<'a>(&'a self, id: &'a str) -> &'a str {
        self.participant(id).map_or(id, |p| p.nickname.as_str())
    }
}
