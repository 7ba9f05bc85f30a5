//! Runtime for rooms on this device
//!
//! Each room gets one task (see `task`), so operations on a room run one at
//! a time in arrival order while different rooms proceed independently.

mod conversation;
mod coordinator;
mod recovery;
mod services;
mod signal;
mod task;

#[cfg(test)]
pub mod testing;

pub use conversation::{ConversationCoordinator, ConversationError, TurnOutcome};
pub use coordinator::{RoomLifecycleCoordinator, RoomLifecycleError};
pub use services::Services;

use crate::lifecycle::{RoomLifecycle, RoomState};
use crate::room::{Message, ParticipantSpec, PaymentTier, RoomRecord, RoomSpec, RoomSpecError};
use crate::store::StoreError;
use serde::Serialize;
use std::collections::HashMap;
use task::{Phase, Reply, RoomCommand, RoomTask};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

#[derive(Debug, Error)]
pub enum RoomError {
    #[error(transparent)]
    Lifecycle(#[from] RoomLifecycleError),
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error(transparent)]
    InvalidSpec(#[from] RoomSpecError),
    #[error("operation not available while room is {0}")]
    WrongPhase(&'static str),
    #[error("room not found: {0}")]
    NotFound(String),
    #[error("room task stopped")]
    Closed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What clients see of a room
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub spec: RoomSpec,
    pub state: RoomState,
    pub display_message: &'static str,
    /// Whose turn it is, while active
    pub speaker_id: Option<String>,
}

impl RoomSnapshot {
    pub fn of(lifecycle: &RoomLifecycle) -> Self {
        let spec = lifecycle.spec();
        let state = lifecycle.state();
        let speaker_id = match state {
            RoomState::Active { turn } => spec.speaker_at(turn.current_turn_index).map(|p| p.id.clone()),
            _ => None,
        };
        Self {
            spec: spec.clone(),
            state: state.clone(),
            display_message: state.display_message(),
            speaker_id,
        }
    }
}

/// Events sent to subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomUpdate {
    /// Room state changed
    Room { room: RoomSnapshot },
    /// Full message list after any change
    Messages { messages: Vec<Message> },
    /// Background work failed
    Error { message: String },
}

/// Handle to a running room task
#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::Sender<RoomCommand>,
    updates: broadcast::Sender<RoomUpdate>,
}

/// Manager for all room tasks on this device
pub struct RoomManager {
    services: Services,
    rooms: RwLock<HashMap<String, RoomHandle>>,
}

impl RoomManager {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Validate the roster and start a room task in draft. Call `start` to
    /// run creation.
    pub async fn create_room(
        &self,
        originator_id: &str,
        participants: Vec<ParticipantSpec>,
        tier: PaymentTier,
    ) -> Result<String, RoomError> {
        let spec = RoomSpec::new(originator_id, participants, tier)?;
        let room_id = spec.id.clone();
        tracing::info!(room_id = %room_id, tier = %tier, participants = spec.participant_count(), "Creating room");

        let coordinator = RoomLifecycleCoordinator::new(spec, self.services.clone());
        self.spawn(room_id.clone(), Phase::Forming(coordinator)).await;
        Ok(room_id)
    }

    /// Get the running task for a room, loading it from the store if needed
    pub async fn get_or_load(&self, room_id: &str) -> Result<RoomHandle, RoomError> {
        {
            let rooms = self.rooms.read().await;
            if let Some(handle) = rooms.get(room_id) {
                return Ok(handle.clone());
            }
        }

        let stored = self
            .services
            .records
            .read(&RoomRecord::key(room_id))
            .await?
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;
        let record = RoomRecord::from_value(stored.value)
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))?;

        tracing::info!(room_id, state = record.state.tag(), version = stored.version, "Loading room");
        let phase = Phase::restore(record, stored.version, self.services.clone());
        Ok(self.spawn(room_id.to_string(), phase).await)
    }

    async fn spawn(&self, room_id: String, phase: Phase) -> RoomHandle {
        let mut rooms = self.rooms.write().await;
        // Lost a race with another loader; theirs is running
        if let Some(handle) = rooms.get(&room_id) {
            return handle.clone();
        }

        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (updates_tx, _) = broadcast::channel(128);
        let task = RoomTask::new(
            room_id.clone(),
            self.services.clone(),
            commands_rx,
            updates_tx.clone(),
        );
        tokio::spawn(task.run(phase));

        let handle = RoomHandle {
            commands: commands_tx,
            updates: updates_tx,
        };
        rooms.insert(room_id, handle.clone());
        handle
    }

    async fn request<T>(
        &self,
        room_id: &str,
        command: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let handle = self.get_or_load(room_id).await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .commands
            .send(command(reply_tx))
            .await
            .map_err(|_| RoomError::Closed)?;
        reply_rx.await.map_err(|_| RoomError::Closed)?
    }

    // ==================== Room operations ====================

    pub async fn start(&self, room_id: &str) -> Result<(), RoomError> {
        self.request(room_id, RoomCommand::Start).await
    }

    pub async fn signal_here(&self, room_id: &str, participant_id: &str) -> Result<(), RoomError> {
        let participant_id = participant_id.to_string();
        self.request(room_id, |reply| RoomCommand::SignalHere {
            participant_id,
            reply,
        })
        .await
    }

    pub async fn cancel(&self, room_id: &str) -> Result<(), RoomError> {
        self.request(room_id, RoomCommand::Cancel).await
    }

    pub async fn expire(&self, room_id: &str) -> Result<(), RoomError> {
        self.request(room_id, RoomCommand::Expire).await
    }

    pub async fn lock(&self, room_id: &str, cenotaph: &str) -> Result<(), RoomError> {
        let cenotaph = cenotaph.to_string();
        self.request(room_id, |reply| RoomCommand::Lock { cenotaph, reply })
            .await
    }

    pub async fn send_message(
        &self,
        room_id: &str,
        author_id: &str,
        text: &str,
    ) -> Result<Option<TurnOutcome>, RoomError> {
        let (author_id, text) = (author_id.to_string(), text.to_string());
        self.request(room_id, |reply| RoomCommand::SendMessage {
            author_id,
            text,
            reply,
        })
        .await
    }

    pub async fn pass(&self, room_id: &str, author_id: &str) -> Result<Option<TurnOutcome>, RoomError> {
        let author_id = author_id.to_string();
        self.request(room_id, |reply| RoomCommand::Pass { author_id, reply })
            .await
    }

    pub async fn human_yield(
        &self,
        room_id: &str,
        author_id: &str,
    ) -> Result<Option<TurnOutcome>, RoomError> {
        let author_id = author_id.to_string();
        self.request(room_id, |reply| RoomCommand::Yield { author_id, reply })
            .await
    }

    pub async fn set_hand(&self, room_id: &str, participant_id: &str, raised: bool) -> Result<(), RoomError> {
        let participant_id = participant_id.to_string();
        self.request(room_id, |reply| RoomCommand::Hand {
            participant_id,
            raised,
            reply,
        })
        .await
    }

    pub async fn hand_raise_check(&self, room_id: &str) -> Result<bool, RoomError> {
        self.request(room_id, RoomCommand::HandCheck).await
    }

    pub async fn snapshot(&self, room_id: &str) -> Result<RoomSnapshot, RoomError> {
        self.request(room_id, RoomCommand::Snapshot).await
    }

    pub async fn messages(&self, room_id: &str) -> Result<Vec<Message>, RoomError> {
        self.get_or_load(room_id).await?;
        Ok(self.services.messages.fetch_messages(room_id).await?)
    }

    /// Current snapshot, messages, and a receiver for everything after
    pub async fn subscribe(
        &self,
        room_id: &str,
    ) -> Result<(RoomSnapshot, Vec<Message>, broadcast::Receiver<RoomUpdate>), RoomError> {
        let handle = self.get_or_load(room_id).await?;
        let updates = handle.updates.subscribe();
        let snapshot = self.snapshot(room_id).await?;
        let messages = self.services.messages.fetch_messages(room_id).await?;
        Ok((snapshot, messages, updates))
    }

    /// Start tasks for every unfinished room in the store. Returns how many
    /// were started.
    pub async fn resume_all(&self) -> Result<usize, RoomError> {
        let records = self.services.records.list(RoomRecord::RECORD_TYPE).await?;
        let mut resumed = 0;

        for (key, stored) in records {
            let Some(room_id) = RoomRecord::room_id_from_key(&key) else {
                continue;
            };
            let terminal = RoomRecord::from_value(stored.value).map_or(true, |r| r.state.is_terminal());
            if terminal {
                continue;
            }
            match self.get_or_load(room_id).await {
                Ok(_) => resumed += 1,
                Err(e) => tracing::warn!(room_id, error = %e, "Failed to resume room"),
            }
        }

        tracing::info!(resumed, "Resumed rooms");
        Ok(resumed)
    }
}
