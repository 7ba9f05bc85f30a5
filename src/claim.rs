//! Cross-device claim of a room's current need
//!
//! The claim is a read-verify-conditional-write against the room record. The
//! version precondition is what makes it atomic: of any number of devices
//! reading the same version, exactly one write lands.

use crate::lifecycle::RoomState;
use crate::room::RoomRecord;
use crate::store::{Precondition, RecordStore, StoreError, WriteOutcome};
use chrono::{Duration, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct AtomicClaim {
    store: Arc<dyn RecordStore>,
    claim_ttl: Option<Duration>,
}

impl AtomicClaim {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            claim_ttl: None,
        }
    }

    /// Allow taking over a claim older than `ttl`. Without this a claim holds
    /// until the need is completed.
    pub fn with_claim_ttl(mut self, ttl: Duration) -> Self {
        self.claim_ttl = Some(ttl);
        self
    }

    /// Try to claim `need_id` in `room_id` for `device_id`.
    ///
    /// `Ok(false)` covers every way of losing: no such room, room not active,
    /// a different need is current, someone else holds it, or another write
    /// landed between our read and our write.
    pub async fn claim(
        &self,
        room_id: &str,
        need_id: &str,
        device_id: &str,
    ) -> Result<bool, StoreError> {
        let key = RoomRecord::key(room_id);
        let Some(stored) = self.store.read(&key).await? else {
            tracing::debug!(room_id, need_id, "Claim lost: no room record");
            return Ok(false);
        };
        let Some(mut record) = RoomRecord::from_value(stored.value) else {
            return Ok(false);
        };

        let RoomState::Active { turn } = &mut record.state else {
            tracing::debug!(room_id, need_id, state = record.state.tag(), "Claim lost: room not active");
            return Ok(false);
        };
        let Some(need) = turn.current_need.as_mut() else {
            return Ok(false);
        };
        if need.id != need_id {
            tracing::debug!(room_id, need_id, current = %need.id, "Claim lost: need superseded");
            return Ok(false);
        }

        let now = Utc::now();
        if let Some(holder) = need.claimed_by.as_deref() {
            let stale = match (self.claim_ttl, need.claimed_at) {
                (Some(ttl), Some(at)) => now - at > ttl,
                _ => false,
            };
            if !stale {
                tracing::debug!(room_id, need_id, holder, "Claim lost: already claimed");
                return Ok(false);
            }
            tracing::info!(room_id, need_id, holder, "Taking over stale claim");
        }

        need.claimed_by = Some(device_id.to_string());
        need.claimed_at = Some(now);
        record.updated_at = now;

        match self
            .store
            .conditional_write(&key, record.to_value()?, Precondition::MatchesVersion(stored.version))
            .await?
        {
            WriteOutcome::Written { version } => {
                tracing::info!(room_id, need_id, device_id, version, "Need claimed");
                Ok(true)
            }
            WriteOutcome::Conflict { current } => {
                tracing::debug!(room_id, need_id, device_id, ?current, "Claim lost the race");
                Ok(false)
            }
        }
    }
}
