//! Pure state transition function
//!
//! Given the same spec, state and event this always produces the same result
//! and performs no I/O. Pairs with no row in the table come back unchanged
//! with `applied == false`.

use super::{DefunctReason, Effect, RoomEvent, RoomState};
use crate::room::{RoomSpec, TurnState};

/// Result of a state transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    pub new_state: RoomState,
    pub effects: Vec<Effect>,
    /// False when the (state, event) pair was rejected as a no-op
    pub applied: bool,
}

impl TransitionResult {
    pub fn new(state: RoomState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
            applied: true,
        }
    }

    pub fn rejected(state: &RoomState) -> Self {
        Self {
            new_state: state.clone(),
            effects: vec![],
            applied: false,
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

fn defunct(reason: DefunctReason) -> RoomState {
    RoomState::Defunct { reason }
}

fn active(turn: TurnState) -> TransitionResult {
    TransitionResult::new(RoomState::Active { turn })
}

#[allow(clippy::too_many_lines)] // One arm per table row
pub fn transition(spec: &RoomSpec, state: &RoomState, event: RoomEvent) -> TransitionResult {
    match (state, event) {
        // ============================================================
        // Creation workflow
        // ============================================================
        (RoomState::Draft, RoomEvent::ParticipantsResolved) => {
            TransitionResult::new(RoomState::Draft).with_effect(Effect::AuthorizePayment)
        }

        (RoomState::Draft, RoomEvent::ResolutionFailed { participant_id }) => {
            TransitionResult::new(defunct(DefunctReason::ResolutionFailed { participant_id }))
        }

        (RoomState::Draft, RoomEvent::PaymentAuthorized) => {
            TransitionResult::new(RoomState::PendingLightward)
                .with_effect(Effect::RequestLightwardPresence)
        }

        (RoomState::Draft, RoomEvent::PaymentAuthorizationFailed { kind }) => {
            TransitionResult::new(defunct(DefunctReason::PaymentAuthorizationFailed { kind }))
        }

        (RoomState::PendingLightward, RoomEvent::LightwardAccepted) => {
            TransitionResult::new(RoomState::PendingHumans {
                signaled: Default::default(),
            })
            .with_effect(Effect::DispatchInvites)
        }

        (RoomState::PendingLightward, RoomEvent::LightwardDeclined) => {
            TransitionResult::new(defunct(DefunctReason::LightwardDeclined))
                .with_effect(Effect::ReleasePaymentAuthorization)
        }

        (RoomState::PendingHumans { signaled }, RoomEvent::HumanSignaledHere { participant_id })
            if spec.is_human(&participant_id) =>
        {
            let mut signaled = signaled.clone();
            signaled.insert(participant_id);

            if signaled == spec.human_ids() {
                TransitionResult::new(RoomState::PendingCapture)
                    .with_effect(Effect::CapturePayment)
            } else {
                TransitionResult::new(RoomState::PendingHumans { signaled })
            }
        }

        (RoomState::PendingHumans { .. }, RoomEvent::Expired) => {
            TransitionResult::new(defunct(DefunctReason::Expired))
                .with_effect(Effect::ReleasePaymentAuthorization)
        }

        (RoomState::PendingCapture, RoomEvent::PaymentCaptured) => {
            active(TurnState::initial()).with_effect(Effect::ActivateRoom)
        }

        (RoomState::PendingCapture, RoomEvent::PaymentCaptureFailed { kind }) => {
            TransitionResult::new(defunct(DefunctReason::PaymentCaptureFailed { kind }))
        }

        // ============================================================
        // Cancellation
        // ============================================================

        // Nothing is authorized until the room leaves draft
        (RoomState::Draft, RoomEvent::Cancelled) => {
            TransitionResult::new(defunct(DefunctReason::Cancelled))
        }

        (
            RoomState::PendingLightward | RoomState::PendingHumans { .. } | RoomState::PendingCapture,
            RoomEvent::Cancelled,
        ) => TransitionResult::new(defunct(DefunctReason::Cancelled))
            .with_effect(Effect::ReleasePaymentAuthorization),

        // ============================================================
        // Active conversation
        // ============================================================
        (RoomState::Active { turn }, RoomEvent::MessageSent) => {
            let mut turn = turn.clone();
            turn.advance_turn();
            turn.clear_need();
            active(turn)
        }

        (RoomState::Active { turn }, RoomEvent::HandRaised { participant_id })
            if spec.participant(&participant_id).is_some() =>
        {
            let mut turn = turn.clone();
            turn.raise_hand(participant_id);
            active(turn)
        }

        (RoomState::Active { turn }, RoomEvent::HandLowered { participant_id }) => {
            let mut turn = turn.clone();
            turn.lower_hand(&participant_id);
            active(turn)
        }

        // One outstanding need at a time
        (RoomState::Active { turn }, RoomEvent::NeedCreated { need })
            if !turn.has_outstanding_need() =>
        {
            let mut turn = turn.clone();
            turn.current_need = Some(need);
            active(turn)
        }

        (RoomState::Active { turn }, RoomEvent::NeedClaimed { device_id, at })
            if turn.current_need.as_ref().is_some_and(|n| !n.is_claimed()) =>
        {
            let mut turn = turn.clone();
            turn.claim_need(device_id, at);
            active(turn)
        }

        (RoomState::Active { turn }, RoomEvent::NeedCompleted) => {
            let mut turn = turn.clone();
            turn.clear_need();
            active(turn)
        }

        (RoomState::Active { .. }, RoomEvent::ParticipantDeparted { participant_id })
            if spec.participant(&participant_id).is_some() =>
        {
            TransitionResult::new(defunct(DefunctReason::ParticipantDeparted { participant_id }))
        }

        (RoomState::Active { turn }, RoomEvent::CenotaphWritten { text }) => {
            TransitionResult::new(RoomState::Locked {
                cenotaph: text,
                final_turn: turn.clone(),
            })
        }

        // ============================================================
        // Everything else is a no-op
        // ============================================================
        (state, _) => TransitionResult::rejected(state),
    }
}
