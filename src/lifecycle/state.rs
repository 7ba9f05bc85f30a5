//! Room state types

use crate::payment::PaymentErrorKind;
use crate::room::TurnState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Why a room ended without being locked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DefunctReason {
    ResolutionFailed { participant_id: String },
    LightwardDeclined,
    PaymentAuthorizationFailed { kind: PaymentErrorKind },
    PaymentCaptureFailed { kind: PaymentErrorKind },
    Cancelled,
    Expired,
    ParticipantDeparted { participant_id: String },
}

impl DefunctReason {
    /// Stable user-facing text for each reason
    pub fn display_message(&self) -> &'static str {
        match self {
            DefunctReason::ResolutionFailed { .. } => "A participant could not be found",
            DefunctReason::LightwardDeclined => "Lightward declined the invitation",
            DefunctReason::PaymentAuthorizationFailed { .. } => "Payment could not be authorized",
            DefunctReason::PaymentCaptureFailed { .. } => "Payment could not be completed",
            DefunctReason::Cancelled => "The room was cancelled",
            DefunctReason::Expired => "The room expired before everyone arrived",
            DefunctReason::ParticipantDeparted { .. } => "A participant departed",
        }
    }
}

/// Room state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomState {
    /// Participants being resolved and payment authorized
    #[default]
    Draft,

    /// Waiting for Lightward to accept the invitation
    PendingLightward,

    /// Invites out, waiting for every human to say they are here
    PendingHumans {
        #[serde(default)]
        signaled: BTreeSet<String>,
    },

    /// Everyone is here, payment being captured
    PendingCapture,

    /// Conversation in progress
    Active { turn: TurnState },

    /// Closed with a cenotaph (terminal)
    Locked { cenotaph: String, final_turn: TurnState },

    /// Ended without completing (terminal)
    Defunct { reason: DefunctReason },
}

impl RoomState {
    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoomState::Locked { .. } | RoomState::Defunct { .. })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RoomState::Active { .. })
    }

    /// States in which a payment authorization is held
    pub fn holds_authorization(&self) -> bool {
        matches!(
            self,
            RoomState::PendingLightward | RoomState::PendingHumans { .. } | RoomState::PendingCapture
        )
    }

    /// How far along the creation workflow a state is. Terminal states rank
    /// highest.
    pub fn progress(&self) -> u8 {
        match self {
            RoomState::Draft => 0,
            RoomState::PendingLightward => 1,
            RoomState::PendingHumans { .. } => 2,
            RoomState::PendingCapture => 3,
            RoomState::Active { .. } => 4,
            RoomState::Locked { .. } | RoomState::Defunct { .. } => 5,
        }
    }

    pub fn turn(&self) -> Option<&TurnState> {
        match self {
            RoomState::Active { turn } => Some(turn),
            RoomState::Locked { final_turn, .. } => Some(final_turn),
            _ => None,
        }
    }

    /// Status line shown to participants
    pub fn display_message(&self) -> &'static str {
        match self {
            RoomState::Draft => "Setting up the room",
            RoomState::PendingLightward => "Waiting for Lightward",
            RoomState::PendingHumans { .. } => "Waiting for everyone to arrive",
            RoomState::PendingCapture => "Completing payment",
            RoomState::Active { .. } => "In conversation",
            RoomState::Locked { .. } => "This room is closed",
            RoomState::Defunct { reason } => reason.display_message(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            RoomState::Draft => "draft",
            RoomState::PendingLightward => "pending_lightward",
            RoomState::PendingHumans { .. } => "pending_humans",
            RoomState::PendingCapture => "pending_capture",
            RoomState::Active { .. } => "active",
            RoomState::Locked { .. } => "locked",
            RoomState::Defunct { .. } => "defunct",
        }
    }
}
