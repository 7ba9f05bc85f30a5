//! Room data model: roster, turns, messages and the replicated record

mod message;
mod record;
mod spec;
mod turn;

pub use message::{departure_narration, listening_narration, Message, MessageKind};
pub use record::RoomRecord;
pub use spec::{ParticipantIdentifier, ParticipantSpec, PaymentTier, RoomSpec, RoomSpecError};
pub use turn::{Need, NeedKind, TurnState};
