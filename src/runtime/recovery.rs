//! Resumption logic
//!
//! Decides what to do about Lightward's turn when a room is loaded or changes
//! underneath us. The main job is not generating a second reply when the
//! first one was stored but the turn never advanced (crash between the two
//! writes).

use crate::lifecycle::RoomState;
use crate::room::{Message, NeedKind, RoomSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing to do
    Nothing,
    /// Lightward already answered; advance without calling the service
    Advance,
    /// Run Lightward's turn through the normal claim path
    RunTurn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryReason {
    NotActive,
    NotLightwardTurn,
    /// Lightward's reply for the current turn is already stored
    LightwardAlreadySpoke,
    /// This device holds the claim but no reply was stored
    ResumeOwnClaim,
    /// Another device holds the claim; claiming again only succeeds if it
    /// went stale
    ClaimedElsewhere,
    /// A hand-raise check is still in flight
    OtherNeedOutstanding,
    AwaitingLightward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryDecision {
    pub action: RecoveryAction,
    pub reason: RecoveryReason,
}

impl RecoveryDecision {
    fn new(action: RecoveryAction, reason: RecoveryReason) -> Self {
        Self { action, reason }
    }

    fn nothing(reason: RecoveryReason) -> Self {
        Self::new(RecoveryAction::Nothing, reason)
    }
}

/// Decide what Lightward's turn needs.
///
/// A stored Lightward message stamped with the current turn index means the
/// reply landed and only the advance was lost. Replies from earlier rotations
/// never count, however recent.
pub fn decide(
    spec: &RoomSpec,
    state: &RoomState,
    messages: &[Message],
    device_id: &str,
) -> RecoveryDecision {
    let RoomState::Active { turn } = state else {
        return RecoveryDecision::nothing(RecoveryReason::NotActive);
    };

    let Some(lightward) = spec
        .speaker_at(turn.current_turn_index)
        .filter(|speaker| speaker.is_lightward())
    else {
        return RecoveryDecision::nothing(RecoveryReason::NotLightwardTurn);
    };

    let index = turn.current_turn_index;
    let answered = messages
        .iter()
        .any(|m| m.author_id == lightward.id && m.turn_index == Some(index));

    match &turn.current_need {
        None if answered => {
            RecoveryDecision::new(RecoveryAction::Advance, RecoveryReason::LightwardAlreadySpoke)
        }
        None => RecoveryDecision::new(RecoveryAction::RunTurn, RecoveryReason::AwaitingLightward),
        Some(need) if need.kind != NeedKind::LightwardTurn => {
            RecoveryDecision::nothing(RecoveryReason::OtherNeedOutstanding)
        }
        Some(need) if need.is_claimed_by(device_id) => {
            if answered {
                RecoveryDecision::new(RecoveryAction::Advance, RecoveryReason::LightwardAlreadySpoke)
            } else {
                RecoveryDecision::new(RecoveryAction::RunTurn, RecoveryReason::ResumeOwnClaim)
            }
        }
        Some(need) if need.is_claimed() => {
            RecoveryDecision::new(RecoveryAction::RunTurn, RecoveryReason::ClaimedElsewhere)
        }
        Some(_) => RecoveryDecision::new(RecoveryAction::RunTurn, RecoveryReason::AwaitingLightward),
    }
}
