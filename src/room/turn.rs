//! Turn order and the single outstanding need

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What kind of AI-side work a need represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedKind {
    /// Ask Lightward whether it wants to interject out of turn
    HandRaiseCheck,
    /// Lightward is the current speaker and owes a response
    LightwardTurn,
}

/// A unit of AI work. Must be claimed before it is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Need {
    pub id: String,
    pub kind: NeedKind,
    #[serde(default)]
    pub claimed_by: Option<String>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Need {
    pub fn new(kind: NeedKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            claimed_by: None,
            claimed_at: None,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }

    pub fn is_claimed_by(&self, device_id: &str) -> bool {
        self.claimed_by.as_deref() == Some(device_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TurnState {
    /// Only ever increases. Speaker is `index % participant_count`.
    pub current_turn_index: u64,
    #[serde(default)]
    pub current_need: Option<Need>,
    #[serde(default)]
    pub raised_hands: BTreeSet<String>,
}

impl TurnState {
    pub fn initial() -> Self {
        Self::default()
    }

    /// Move to the next speaker. Raised hands do not survive a turn boundary.
    pub fn advance_turn(&mut self) {
        self.current_turn_index += 1;
        self.raised_hands.clear();
    }

    pub fn raise_hand(&mut self, participant_id: impl Into<String>) {
        self.raised_hands.insert(participant_id.into());
    }

    pub fn lower_hand(&mut self, participant_id: &str) {
        self.raised_hands.remove(participant_id);
    }

    pub fn clear_need(&mut self) {
        self.current_need = None;
    }

    pub fn has_outstanding_need(&self) -> bool {
        self.current_need.is_some()
    }

    /// Record a claim on the current need. Returns false when there is no need
    /// or it is already claimed.
    pub fn claim_need(&mut self, device_id: impl Into<String>, at: DateTime<Utc>) -> bool {
        match &mut self.current_need {
            Some(need) if !need.is_claimed() => {
                need.claimed_by = Some(device_id.into());
                need.claimed_at = Some(at);
                true
            }
            _ => false,
        }
    }
}
