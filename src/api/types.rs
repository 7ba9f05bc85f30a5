//! API request and response types

use crate::db::ContactKind;
use crate::room::{Message, ParticipantIdentifier, ParticipantSpec, PaymentTier};
use crate::runtime::{RoomSnapshot, TurnOutcome};
use serde::{Deserialize, Serialize};

/// One roster entry in a create request. Ids are assigned by the server.
#[derive(Debug, Deserialize)]
pub struct ParticipantRequest {
    pub identifier: ParticipantIdentifier,
    pub nickname: String,
}

impl From<ParticipantRequest> for ParticipantSpec {
    fn from(request: ParticipantRequest) -> Self {
        ParticipantSpec::new(request.identifier, request.nickname)
    }
}

/// Request to create and start a room
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub participants: Vec<ParticipantRequest>,
    pub tier: PaymentTier,
}

/// The room as created. `error` is set when creation ended the room.
#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub room: RoomSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub room: RoomSnapshot,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

/// Request naming the participant acting
#[derive(Debug, Deserialize)]
pub struct ParticipantRequestBody {
    pub participant_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub author_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct LockRequest {
    pub cenotaph: String,
}

#[derive(Debug, Deserialize)]
pub struct HandRequest {
    pub participant_id: String,
    pub raised: bool,
}

/// Result of a turn action. `outcome` describes Lightward's turn when the
/// action handed it the floor.
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub room: RoomSnapshot,
    pub outcome: Option<TurnOutcome>,
}

#[derive(Debug, Serialize)]
pub struct HandCheckResponse {
    pub raised: bool,
}

/// Add or update a contact directory entry
#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub kind: ContactKind,
    pub identifier: String,
    pub user_id: String,
    #[serde(default = "default_discoverable")]
    pub discoverable: bool,
}

fn default_discoverable() -> bool {
    true
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
