//! Merge rules for two observations of the same room
//!
//! Two strategies:
//! - higher turn wins: turn index is `max(local, remote)`, raised hands union.
//!   Used for in-flight turn state against a store snapshot.
//! - remote wins: the fetched value is taken outright. Used for fields only
//!   one causal path can set (state tag, defunct reason, cenotaph).
//!
//! Nothing here fails. Callers decode remote records with
//! `RoomRecord::from_value`, which maps garbage to "absent".

use crate::lifecycle::RoomState;
use crate::room::{Message, Need, TurnState};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub fn higher_turn_wins(local: &TurnState, remote: &TurnState) -> TurnState {
    match local.current_turn_index.cmp(&remote.current_turn_index) {
        Ordering::Greater => local.clone(),
        Ordering::Less => remote.clone(),
        Ordering::Equal => TurnState {
            current_turn_index: local.current_turn_index,
            current_need: merge_need(local.current_need.as_ref(), remote.current_need.as_ref()),
            raised_hands: local
                .raised_hands
                .union(&remote.raised_hands)
                .cloned()
                .collect(),
        },
    }
}

/// Needs at the same turn index. The store is authoritative for which need is
/// current; a claim is write-once, so for the same need the claimed copy is
/// the newer one. A local need the store has not seen yet is kept.
fn merge_need(local: Option<&Need>, remote: Option<&Need>) -> Option<Need> {
    match (local, remote) {
        (None, None) => None,
        (Some(need), None) | (None, Some(need)) => Some(need.clone()),
        (Some(l), Some(r)) if l.id == r.id && l.is_claimed() && !r.is_claimed() => Some(l.clone()),
        (Some(_), Some(r)) => Some(r.clone()),
    }
}

pub fn merge_state(local: &RoomState, remote: &RoomState) -> RoomState {
    if local.is_terminal() {
        return local.clone();
    }

    match (local, remote) {
        (RoomState::Active { turn: l }, RoomState::Active { turn: r }) => RoomState::Active {
            turn: higher_turn_wins(l, r),
        },
        (RoomState::PendingHumans { signaled: l }, RoomState::PendingHumans { signaled: r }) => {
            RoomState::PendingHumans {
                signaled: l.union(r).cloned().collect(),
            }
        }
        _ => remote.clone(),
    }
}

/// Union by message id, ordered by creation time (id breaks ties so the
/// result does not depend on argument order).
pub fn merge_messages(a: &[Message], b: &[Message]) -> Vec<Message> {
    let mut by_id: BTreeMap<&str, &Message> = BTreeMap::new();
    for message in a.iter().chain(b) {
        by_id.entry(message.id.as_str()).or_insert(message);
    }

    let mut merged: Vec<Message> = by_id.into_values().cloned().collect();
    merged.sort_by(|x, y| x.created_at.cmp(&y.created_at).then_with(|| x.id.cmp(&y.id)));
    merged
}
