//! Room lifecycle state machine
//!
//! Elm-style: a pure transition function over (spec, state, event) that
//! returns the next state plus the effects the caller must carry out.

mod effect;
mod event;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::RoomEvent;
pub use state::{DefunctReason, RoomState};
pub use transition::{transition, TransitionResult};

use crate::reconcile;
use crate::room::{RoomRecord, RoomSpec};

/// Owns one room's state. The only way to change it is `apply` (or merging a
/// remote observation).
#[derive(Debug, Clone)]
pub struct RoomLifecycle {
    spec: RoomSpec,
    state: RoomState,
}

impl RoomLifecycle {
    pub fn new(spec: RoomSpec) -> Self {
        Self {
            spec,
            state: RoomState::Draft,
        }
    }

    pub fn restore(record: RoomRecord) -> Self {
        Self {
            spec: record.spec,
            state: record.state,
        }
    }

    pub fn spec(&self) -> &RoomSpec {
        &self.spec
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn room_id(&self) -> &str {
        &self.spec.id
    }

    /// Apply an event. Pairs with no transition leave the state untouched and
    /// return no effects.
    pub fn apply(&mut self, event: RoomEvent) -> Vec<Effect> {
        let result = transition(&self.spec, &self.state, event.clone());

        if !result.applied {
            tracing::warn!(
                room_id = %self.spec.id,
                state = self.state.tag(),
                event = ?event,
                "Ignoring event with no transition"
            );
            return result.effects;
        }

        if result.new_state.tag() != self.state.tag() {
            tracing::info!(
                room_id = %self.spec.id,
                from = self.state.tag(),
                to = result.new_state.tag(),
                "Room state changed"
            );
        }

        self.state = result.new_state;
        result.effects
    }

    /// Fold a freshly fetched remote state into ours. Returns true if the local
    /// state changed.
    pub fn merge_remote(&mut self, remote: &RoomState) -> bool {
        let merged = reconcile::merge_state(&self.state, remote);
        if merged == self.state {
            return false;
        }
        tracing::debug!(
            room_id = %self.spec.id,
            local = self.state.tag(),
            remote = remote.tag(),
            "Merged remote room state"
        );
        self.state = merged;
        true
    }

    pub fn record(&self) -> RoomRecord {
        RoomRecord::new(self.spec.clone(), self.state.clone())
    }
}
