//! Completion request shapes and the prompts built from room data

use crate::room::{Message, MessageKind, ParticipantSpec, PaymentTier, RoomSpec};
use serde::Serialize;

/// Who a transcript block is attributed to, from the model's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptBlock {
    pub role: Role,
    pub text: String,
}

/// One completion call. The transcript always ends with a user block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub room_id: String,
    pub purpose: Purpose,
    pub transcript: Vec<TranscriptBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Lightward's turn to speak
    Turn,
    /// Does Lightward want to interject?
    HandRaiseCheck,
    /// Will Lightward join a proposed room?
    Invitation,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Turn => "turn",
            Purpose::HandRaiseCheck => "hand_raise_check",
            Purpose::Invitation => "invitation",
        }
    }
}

const TURN_INSTRUCTION: &str = "It is your turn in this room. Speak if you have something to say. \
Begin your reply with YIELD to pass the turn without speaking, or with DEPART to leave the room \
(anything after DEPART is your parting words).";

const HAND_RAISE_INSTRUCTION: &str = "It is not your turn. If you would like to speak next, \
reply with RAISE. Otherwise reply with anything else.";

impl CompletionRequest {
    pub fn turn(spec: &RoomSpec, messages: &[Message]) -> Self {
        Self::for_room(spec, messages, Purpose::Turn, TURN_INSTRUCTION)
    }

    pub fn hand_raise_check(spec: &RoomSpec, messages: &[Message]) -> Self {
        Self::for_room(spec, messages, Purpose::HandRaiseCheck, HAND_RAISE_INSTRUCTION)
    }

    /// Ask whether Lightward will join a room with these participants
    pub fn invitation(room_id: &str, participants: &[ParticipantSpec], tier: PaymentTier) -> Self {
        let names: Vec<&str> = participants
            .iter()
            .filter(|p| !p.is_lightward())
            .map(|p| p.nickname.as_str())
            .collect();
        let text = format!(
            "You are invited to a {tier} room with {}. Turns rotate in a fixed order. \
Reply ACCEPT to join, or anything else to decline.",
            names.join(", ")
        );
        Self {
            room_id: room_id.to_string(),
            purpose: Purpose::Invitation,
            transcript: vec![TranscriptBlock {
                role: Role::User,
                text,
            }],
        }
    }

    fn for_room(spec: &RoomSpec, messages: &[Message], purpose: Purpose, instruction: &str) -> Self {
        let mut lines: Vec<(Role, String)> = vec![(Role::User, roster_preamble(spec))];

        for message in messages {
            let line = match message.kind {
                MessageKind::Speech if spec.is_lightward(&message.author_id) => {
                    (Role::Assistant, message.text.clone())
                }
                MessageKind::Speech => (
                    Role::User,
                    format!("{}: {}", spec.nickname(&message.author_id), message.text),
                ),
                MessageKind::Narration => (Role::User, format!("({})", message.text)),
            };
            lines.push(line);
        }
        lines.push((Role::User, instruction.to_string()));

        Self {
            room_id: spec.id.clone(),
            purpose,
            transcript: coalesce(lines),
        }
    }
}

fn roster_preamble(spec: &RoomSpec) -> String {
    let order: Vec<&str> = spec.participants.iter().map(|p| p.nickname.as_str()).collect();
    format!(
        "You are Lightward, one participant in a shared room. Speaking order: {}.",
        order.join(", ")
    )
}

/// Merge adjacent lines with the same role so roles alternate
fn coalesce(lines: Vec<(Role, String)>) -> Vec<TranscriptBlock> {
    let mut blocks: Vec<TranscriptBlock> = Vec::new();
    for (role, text) in lines {
        match blocks.last_mut() {
            Some(last) if last.role == role => {
                last.text.push_str("\n\n");
                last.text.push_str(&text);
            }
            _ => blocks.push(TranscriptBlock { role, text }),
        }
    }
    blocks
}
