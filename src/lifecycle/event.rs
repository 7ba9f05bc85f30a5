//! Events that drive a room's lifecycle

use crate::payment::PaymentErrorKind;
use crate::room::Need;
use chrono::{DateTime, Utc};

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    // Creation workflow
    ParticipantsResolved,
    ResolutionFailed { participant_id: String },
    PaymentAuthorized,
    PaymentAuthorizationFailed { kind: PaymentErrorKind },
    LightwardAccepted,
    LightwardDeclined,
    HumanSignaledHere { participant_id: String },
    PaymentCaptured,
    PaymentCaptureFailed { kind: PaymentErrorKind },
    Expired,
    Cancelled,

    // Active conversation
    MessageSent,
    HandRaised { participant_id: String },
    HandLowered { participant_id: String },
    NeedCreated { need: Need },
    NeedClaimed { device_id: String, at: DateTime<Utc> },
    NeedCompleted,
    ParticipantDeparted { participant_id: String },
    CenotaphWritten { text: String },
}
