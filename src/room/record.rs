//! The value replicated between devices for one room

use super::RoomSpec;
use crate::lifecycle::RoomState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub spec: RoomSpec,
    pub state: RoomState,
    pub updated_at: DateTime<Utc>,
}

impl RoomRecord {
    pub const RECORD_TYPE: &'static str = "room";

    pub fn new(spec: RoomSpec, state: RoomState) -> Self {
        Self {
            spec,
            state,
            updated_at: Utc::now(),
        }
    }

    pub fn key(room_id: &str) -> String {
        format!("room/{room_id}")
    }

    pub fn room_id_from_key(key: &str) -> Option<&str> {
        key.strip_prefix("room/")
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Rooms are created whole, so a record that fails to decode is treated
    /// as absent rather than partially valid.
    pub fn from_value(value: Value) -> Option<Self> {
        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring undecodable room record");
                None
            }
        }
    }
}
