//! Property-based tests for the room lifecycle
//!
//! These check invariants across arbitrary (state, event) pairs and event
//! sequences rather than hand-picked paths.

use super::state::*;
use super::transition::*;
use super::*;
use crate::payment::PaymentErrorKind;
use crate::room::{Need, NeedKind, ParticipantIdentifier, ParticipantSpec, PaymentTier, TurnState};
use chrono::{DateTime, Utc};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

const PARTICIPANT_IDS: [&str; 4] = ["ada", "lightward", "bo", "stranger"];

fn seat(id: &str, identifier: ParticipantIdentifier) -> ParticipantSpec {
    ParticipantSpec {
        id: id.to_string(),
        identifier,
        nickname: id.to_string(),
    }
}

/// Fixed ids so generated events can name real (and unknown) participants
fn test_spec() -> RoomSpec {
    RoomSpec::new(
        "ada",
        vec![
            seat("ada", ParticipantIdentifier::Email("ada@example.com".into())),
            seat("lightward", ParticipantIdentifier::Lightward),
            seat("bo", ParticipantIdentifier::Phone("+15550100".into())),
        ],
        PaymentTier::One,
    )
    .unwrap()
}

fn fixed_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_participant_id() -> impl Strategy<Value = String> {
    proptest::sample::select(PARTICIPANT_IDS.to_vec()).prop_map(String::from)
}

fn arb_payment_error_kind() -> impl Strategy<Value = PaymentErrorKind> {
    prop_oneof![
        Just(PaymentErrorKind::Declined),
        Just(PaymentErrorKind::Cancelled),
        Just(PaymentErrorKind::Expired),
        Just(PaymentErrorKind::Network),
        Just(PaymentErrorKind::NotConfigured),
    ]
}

fn arb_need() -> impl Strategy<Value = Need> {
    (
        prop_oneof![Just(NeedKind::HandRaiseCheck), Just(NeedKind::LightwardTurn)],
        proptest::option::of("dev-[ab]"),
    )
        .prop_map(|(kind, claimed_by)| {
            let mut need = Need::new(kind);
            if let Some(device) = claimed_by {
                need.claimed_by = Some(device);
                need.claimed_at = Some(fixed_time());
            }
            need
        })
}

fn arb_turn() -> impl Strategy<Value = TurnState> {
    (
        0u64..50,
        proptest::option::of(arb_need()),
        proptest::collection::btree_set(arb_participant_id(), 0..3),
    )
        .prop_map(|(index, need, hands)| TurnState {
            current_turn_index: index,
            current_need: need,
            raised_hands: hands,
        })
}

fn arb_defunct_reason() -> impl Strategy<Value = DefunctReason> {
    prop_oneof![
        arb_participant_id().prop_map(|participant_id| DefunctReason::ResolutionFailed {
            participant_id
        }),
        Just(DefunctReason::LightwardDeclined),
        arb_payment_error_kind().prop_map(|kind| DefunctReason::PaymentAuthorizationFailed { kind }),
        arb_payment_error_kind().prop_map(|kind| DefunctReason::PaymentCaptureFailed { kind }),
        Just(DefunctReason::Cancelled),
        Just(DefunctReason::Expired),
        arb_participant_id().prop_map(|participant_id| DefunctReason::ParticipantDeparted {
            participant_id
        }),
    ]
}

fn arb_state() -> impl Strategy<Value = RoomState> {
    prop_oneof![
        Just(RoomState::Draft),
        Just(RoomState::PendingLightward),
        proptest::collection::btree_set(prop_oneof![Just("ada".to_string()), Just("bo".to_string())], 0..2)
            .prop_map(|signaled| RoomState::PendingHumans { signaled }),
        Just(RoomState::PendingCapture),
        arb_turn().prop_map(|turn| RoomState::Active { turn }),
        ("[a-z ]{1,20}", arb_turn()).prop_map(|(cenotaph, final_turn)| RoomState::Locked {
            cenotaph,
            final_turn
        }),
        arb_defunct_reason().prop_map(|reason| RoomState::Defunct { reason }),
    ]
}

fn arb_event() -> impl Strategy<Value = RoomEvent> {
    prop_oneof![
        Just(RoomEvent::ParticipantsResolved),
        arb_participant_id().prop_map(|participant_id| RoomEvent::ResolutionFailed { participant_id }),
        Just(RoomEvent::PaymentAuthorized),
        arb_payment_error_kind().prop_map(|kind| RoomEvent::PaymentAuthorizationFailed { kind }),
        Just(RoomEvent::LightwardAccepted),
        Just(RoomEvent::LightwardDeclined),
        arb_participant_id().prop_map(|participant_id| RoomEvent::HumanSignaledHere { participant_id }),
        Just(RoomEvent::PaymentCaptured),
        arb_payment_error_kind().prop_map(|kind| RoomEvent::PaymentCaptureFailed { kind }),
        Just(RoomEvent::Expired),
        Just(RoomEvent::Cancelled),
        Just(RoomEvent::MessageSent),
        arb_participant_id().prop_map(|participant_id| RoomEvent::HandRaised { participant_id }),
        arb_participant_id().prop_map(|participant_id| RoomEvent::HandLowered { participant_id }),
        arb_need().prop_map(|need| RoomEvent::NeedCreated { need }),
        "dev-[ab]".prop_map(|device_id| RoomEvent::NeedClaimed {
            device_id,
            at: fixed_time()
        }),
        Just(RoomEvent::NeedCompleted),
        arb_participant_id().prop_map(|participant_id| RoomEvent::ParticipantDeparted { participant_id }),
        "[a-z ]{1,20}".prop_map(|text| RoomEvent::CenotaphWritten { text }),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// A rejected pair changes nothing and requests nothing
    #[test]
    fn prop_rejected_is_no_op(state in arb_state(), event in arb_event()) {
        let spec = test_spec();
        let result = transition(&spec, &state, event);
        if !result.applied {
            prop_assert_eq!(result.new_state, state);
            prop_assert!(result.effects.is_empty());
        }
    }

    /// Terminal states absorb every event
    #[test]
    fn prop_terminal_states_are_absorbing(state in arb_state(), event in arb_event()) {
        prop_assume!(state.is_terminal());
        let result = transition(&test_spec(), &state, event);
        prop_assert!(!result.applied);
        prop_assert_eq!(result.new_state, state);
    }

    /// Transitions are deterministic
    #[test]
    fn prop_transition_is_pure(state in arb_state(), event in arb_event()) {
        let spec = test_spec();
        let a = transition(&spec, &state, event.clone());
        let b = transition(&spec, &state, event);
        prop_assert_eq!(a, b);
    }

    /// At most one need is outstanding, and the turn index only moves forward
    #[test]
    fn prop_turn_index_is_monotonic(
        turn in arb_turn(),
        events in proptest::collection::vec(arb_event(), 1..40)
    ) {
        let spec = test_spec();
        let mut state = RoomState::Active { turn };
        let mut last_index = state.turn().map_or(0, |t| t.current_turn_index);

        for event in events {
            let before = state.clone();
            let result = transition(&spec, &state, event.clone());
            state = result.new_state;

            if let Some(turn) = state.turn() {
                prop_assert!(turn.current_turn_index >= last_index);
                if matches!(event, RoomEvent::MessageSent) && result.applied {
                    prop_assert_eq!(turn.current_turn_index, last_index + 1);
                    prop_assert!(turn.current_need.is_none());
                }
                if let (RoomEvent::NeedCreated { .. }, Some(prev)) = (&event, before.turn()) {
                    if prev.current_need.is_some() {
                        prop_assert_eq!(&turn.current_need, &prev.current_need);
                    }
                }
                last_index = turn.current_turn_index;
            }
        }
    }

    /// Effects that touch money only fire from states that can justify them
    #[test]
    fn prop_payment_effects_match_state(state in arb_state(), event in arb_event()) {
        let result = transition(&test_spec(), &state, event);
        for effect in &result.effects {
            match effect {
                Effect::AuthorizePayment => prop_assert_eq!(&state, &RoomState::Draft),
                Effect::ReleasePaymentAuthorization => prop_assert!(state.holds_authorization()),
                Effect::CapturePayment => {
                    prop_assert_eq!(&result.new_state, &RoomState::PendingCapture);
                }
                _ => {}
            }
        }
    }

    /// Only the defined participants can change turn state
    #[test]
    fn prop_unknown_participant_is_ignored(turn in arb_turn()) {
        let spec = test_spec();
        let state = RoomState::Active { turn };
        for event in [
            RoomEvent::HandRaised { participant_id: "stranger".into() },
            RoomEvent::ParticipantDeparted { participant_id: "stranger".into() },
        ] {
            let result = transition(&spec, &state, event);
            prop_assert!(!result.applied);
        }
    }

    /// Every human signaling (in any order, with repeats) reaches capture
    /// exactly once
    #[test]
    fn prop_all_humans_signal_reaches_capture(
        order in proptest::collection::vec(arb_participant_id(), 0..10)
    ) {
        let spec = test_spec();
        let mut state = RoomState::PendingHumans { signaled: Default::default() };
        let mut captures = 0;

        let tail = ["ada".to_string(), "bo".to_string()];
        for participant_id in order.into_iter().chain(tail) {
            let result = transition(&spec, &state, RoomEvent::HumanSignaledHere { participant_id });
            captures += result.effects.iter().filter(|e| **e == Effect::CapturePayment).count();
            state = result.new_state;
        }

        prop_assert_eq!(state, RoomState::PendingCapture);
        prop_assert_eq!(captures, 1);
    }
}

#[test]
fn test_lifecycle_wrapper_matches_transition() {
    let spec = test_spec();
    let mut lifecycle = RoomLifecycle::new(spec.clone());
    let events = [
        RoomEvent::ParticipantsResolved,
        RoomEvent::PaymentAuthorized,
        RoomEvent::LightwardAccepted,
        RoomEvent::HumanSignaledHere {
            participant_id: "bo".into(),
        },
        RoomEvent::HumanSignaledHere {
            participant_id: "ada".into(),
        },
        RoomEvent::PaymentCaptured,
    ];

    let mut state = RoomState::Draft;
    for event in events {
        let expected = transition(&spec, &state, event.clone());
        let effects = lifecycle.apply(event);
        assert_eq!(effects, expected.effects);
        state = expected.new_state;
        assert_eq!(lifecycle.state(), &state);
    }
    assert!(lifecycle.state().is_active());
}
