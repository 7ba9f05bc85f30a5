//! The task that owns one room on this device
//!
//! Commands arrive over an mpsc channel and run one at a time. Between
//! commands the task follows the store's change feed (so signals, turns and
//! cancellations from other devices are folded in) and forwards the room's
//! message list to subscribers.

use super::conversation::{ConversationCoordinator, TurnOutcome};
use super::coordinator::RoomLifecycleCoordinator;
use super::services::Services;
use super::{RoomError, RoomSnapshot, RoomUpdate};
use crate::lifecycle::{RoomLifecycle, RoomState};
use crate::room::{Message, RoomRecord};
use crate::store::{RecordChange, Version};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

pub(super) type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

pub(super) enum RoomCommand {
    Start(Reply<()>),
    SignalHere {
        participant_id: String,
        reply: Reply<()>,
    },
    Cancel(Reply<()>),
    Expire(Reply<()>),
    Lock {
        cenotaph: String,
        reply: Reply<()>,
    },
    SendMessage {
        author_id: String,
        text: String,
        reply: Reply<Option<TurnOutcome>>,
    },
    /// Silent pass
    Pass {
        author_id: String,
        reply: Reply<Option<TurnOutcome>>,
    },
    /// Narrated yield
    Yield {
        author_id: String,
        reply: Reply<Option<TurnOutcome>>,
    },
    Hand {
        participant_id: String,
        raised: bool,
        reply: Reply<()>,
    },
    HandCheck(Reply<bool>),
    Snapshot(Reply<RoomSnapshot>),
}

/// Which coordinator currently owns the room
pub(super) enum Phase {
    Forming(RoomLifecycleCoordinator),
    Conversing(ConversationCoordinator),
}

impl Phase {
    /// Active and locked rooms go straight to the turn loop
    pub(super) fn restore(record: RoomRecord, version: Version, services: Services) -> Self {
        match record.state {
            RoomState::Active { .. } | RoomState::Locked { .. } => {
                Phase::Conversing(ConversationCoordinator::restore(record, version, services))
            }
            _ => Phase::Forming(RoomLifecycleCoordinator::restore(record, version, services)),
        }
    }

    pub(super) fn lifecycle(&self) -> &RoomLifecycle {
        match self {
            Phase::Forming(c) => c.lifecycle(),
            Phase::Conversing(c) => c.lifecycle(),
        }
    }

    fn state(&self) -> &RoomState {
        self.lifecycle().state()
    }

    fn promote(self) -> (Self, bool) {
        match self {
            Phase::Forming(c) => match c.into_conversation() {
                Ok(conversation) => (Phase::Conversing(conversation), true),
                Err(c) => (Phase::Forming(c), false),
            },
            conversing @ Phase::Conversing(_) => (conversing, false),
        }
    }
}

pub(super) struct RoomTask {
    room_id: String,
    key: String,
    services: Services,
    commands: mpsc::Receiver<RoomCommand>,
    updates: broadcast::Sender<RoomUpdate>,
    changes: broadcast::Receiver<RecordChange>,
    messages: watch::Receiver<Vec<Message>>,
}

impl RoomTask {
    /// Subscribes to the feeds here, before the task is spawned, so no change
    /// between load and first poll is missed.
    pub(super) fn new(
        room_id: String,
        services: Services,
        commands: mpsc::Receiver<RoomCommand>,
        updates: broadcast::Sender<RoomUpdate>,
    ) -> Self {
        let changes = services.records.changes();
        let messages = services.messages.observe(&room_id);
        Self {
            key: RoomRecord::key(&room_id),
            room_id,
            services,
            commands,
            updates,
            changes,
            messages,
        }
    }

    pub(super) async fn run(mut self, phase: Phase) {
        tracing::info!(room_id = %self.room_id, state = phase.state().tag(), "Room task started");

        // A room reloaded mid-conversation may owe Lightward's turn
        let mut phase = phase;
        if let Phase::Conversing(conversation) = &mut phase {
            self.trigger(conversation).await;
        }

        let mut feed_open = true;
        let mut messages_open = true;

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    phase = self.handle_command(phase, command).await;
                }

                change = self.changes.recv(), if feed_open => {
                    match change {
                        Ok(change) if change.key == self.key => {
                            match RoomRecord::from_value(change.payload) {
                                Some(record) => phase = self.reconcile(phase, &record, change.version).await,
                                None => tracing::warn!(room_id = %self.room_id, "Ignoring undecodable change"),
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(room_id = %self.room_id, skipped, "Change feed lagged; refreshing");
                            phase = self.refresh(phase).await;
                        }
                        Err(RecvError::Closed) => {
                            tracing::warn!(room_id = %self.room_id, "Change feed closed");
                            feed_open = false;
                        }
                    }
                }

                changed = self.messages.changed(), if messages_open => {
                    if changed.is_err() {
                        messages_open = false;
                        continue;
                    }
                    let messages = self.messages.borrow_and_update().clone();
                    // No subscribers is fine
                    let _ = self.updates.send(RoomUpdate::Messages { messages });
                }
            }
        }

        tracing::info!(room_id = %self.room_id, "Room task finished");
    }

    #[allow(clippy::too_many_lines)]
    async fn handle_command(&self, phase: Phase, command: RoomCommand) -> Phase {
        let before = phase.state().clone();
        let mut phase = phase;

        match command {
            RoomCommand::Start(reply) => {
                let result = match &mut phase {
                    Phase::Forming(c) => c.start().await.map_err(RoomError::from),
                    Phase::Conversing(_) => Err(RoomError::WrongPhase(before.tag())),
                };
                let _ = reply.send(result);
            }
            RoomCommand::SignalHere {
                participant_id,
                reply,
            } => {
                let result = match &mut phase {
                    Phase::Forming(c) => c.signal_here(&participant_id).await.map_err(RoomError::from),
                    Phase::Conversing(_) => Err(RoomError::WrongPhase(before.tag())),
                };
                let _ = reply.send(result);
            }
            RoomCommand::Cancel(reply) => {
                let result = match &mut phase {
                    Phase::Forming(c) => c.cancel().await.map_err(RoomError::from),
                    Phase::Conversing(_) => Err(RoomError::WrongPhase(before.tag())),
                };
                let _ = reply.send(result);
            }
            RoomCommand::Expire(reply) => {
                let result = match &mut phase {
                    Phase::Forming(c) => c.expire().await.map_err(RoomError::from),
                    Phase::Conversing(_) => Err(RoomError::WrongPhase(before.tag())),
                };
                let _ = reply.send(result);
            }
            RoomCommand::Lock { cenotaph, reply } => {
                let result = match &mut phase {
                    Phase::Forming(c) => c.lock(cenotaph).await.map_err(RoomError::from),
                    Phase::Conversing(c) => c.lock(cenotaph).await.map_err(RoomError::from),
                };
                let _ = reply.send(result);
            }
            RoomCommand::SendMessage {
                author_id,
                text,
                reply,
            } => {
                let result = match &mut phase {
                    Phase::Conversing(c) => c.send_message(&author_id, &text).await.map_err(RoomError::from),
                    Phase::Forming(_) => Err(RoomError::WrongPhase(before.tag())),
                };
                let _ = reply.send(result);
            }
            RoomCommand::Pass { author_id, reply } => {
                let result = match &mut phase {
                    Phase::Conversing(c) => c.yield_turn(&author_id).await.map_err(RoomError::from),
                    Phase::Forming(_) => Err(RoomError::WrongPhase(before.tag())),
                };
                let _ = reply.send(result);
            }
            RoomCommand::Yield { author_id, reply } => {
                let result = match &mut phase {
                    Phase::Conversing(c) => c.human_yield_turn(&author_id).await.map_err(RoomError::from),
                    Phase::Forming(_) => Err(RoomError::WrongPhase(before.tag())),
                };
                let _ = reply.send(result);
            }
            RoomCommand::Hand {
                participant_id,
                raised,
                reply,
            } => {
                let result = match &mut phase {
                    Phase::Conversing(c) if raised => c.raise_hand(&participant_id).await.map_err(RoomError::from),
                    Phase::Conversing(c) => c.lower_hand(&participant_id).await.map_err(RoomError::from),
                    Phase::Forming(_) => Err(RoomError::WrongPhase(before.tag())),
                };
                let _ = reply.send(result);
            }
            RoomCommand::HandCheck(reply) => {
                let result = match &mut phase {
                    Phase::Conversing(c) => c.request_hand_raise_check().await.map_err(RoomError::from),
                    Phase::Forming(_) => Err(RoomError::WrongPhase(before.tag())),
                };
                let _ = reply.send(result);
            }
            RoomCommand::Snapshot(reply) => {
                let _ = reply.send(Ok(RoomSnapshot::of(phase.lifecycle())));
            }
        }

        self.after(phase, &before).await
    }

    /// Fold in a record written elsewhere
    async fn reconcile(&self, phase: Phase, record: &RoomRecord, version: Version) -> Phase {
        let before = phase.state().clone();
        let mut phase = phase;

        match &mut phase {
            Phase::Forming(c) => {
                if let Err(e) = c.reconcile_remote(record, version).await {
                    tracing::warn!(room_id = %self.room_id, error = %e, "Reconciling remote change failed");
                }
            }
            Phase::Conversing(c) => {
                if c.reconcile_remote(record, version) {
                    self.trigger(c).await;
                }
            }
        }

        self.after(phase, &before).await
    }

    /// Re-read the stored record after missing feed entries
    async fn refresh(&self, phase: Phase) -> Phase {
        match self.services.records.read(&self.key).await {
            Ok(Some(stored)) => match RoomRecord::from_value(stored.value) {
                Some(record) => self.reconcile(phase, &record, stored.version).await,
                None => phase,
            },
            Ok(None) => phase,
            Err(e) => {
                // Retried on the next natural trigger
                tracing::warn!(room_id = %self.room_id, error = %e, "Refresh failed");
                phase
            }
        }
    }

    /// Hand off to the turn loop once active, and publish state changes
    async fn after(&self, phase: Phase, before: &RoomState) -> Phase {
        let (mut phase, promoted) = phase.promote();
        if promoted {
            tracing::info!(room_id = %self.room_id, "Room handed to turn loop");
            if let Phase::Conversing(conversation) = &mut phase {
                self.trigger(conversation).await;
            }
        }

        if phase.state() != before {
            let _ = self.updates.send(RoomUpdate::Room {
                room: RoomSnapshot::of(phase.lifecycle()),
            });
        }
        phase
    }

    async fn trigger(&self, conversation: &mut ConversationCoordinator) {
        match conversation.trigger_lightward_if_their_turn().await {
            Ok(Some(outcome)) => {
                tracing::info!(room_id = %self.room_id, ?outcome, "Lightward turn handled");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(room_id = %self.room_id, error = %e, "Lightward turn failed");
                let _ = self.updates.send(RoomUpdate::Error {
                    message: e.to_string(),
                });
            }
        }
    }
}
