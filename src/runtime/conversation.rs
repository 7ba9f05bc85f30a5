//! Turn loop for an active room
//!
//! Humans speak, pass or yield on their turn. When the turn lands on
//! Lightward a `lightward_turn` need is created, claimed across devices, and
//! the winner asks the completion service for a reply.

use super::recovery::{self, RecoveryAction};
use super::services::{RecordHandle, SaveOutcome, Services};
use super::signal::{self, Signal};
use crate::lifecycle::{RoomEvent, RoomLifecycle, RoomState};
use crate::llm::{starts_with_word, CompletionError, CompletionRequest};
use crate::room::{
    departure_narration, listening_narration, Message, Need, NeedKind, ParticipantSpec, RoomRecord,
    RoomSpec, TurnState,
};
use crate::store::{StoreError, Version};
use serde::Serialize;
use thiserror::Error;

const MAX_SAVE_ATTEMPTS: usize = 3;

/// Reply word that raises Lightward's hand during a hand-raise check
const RAISE: &str = "RAISE";

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("room is not active (state: {0})")]
    NotActive(&'static str),
    #[error("it is {expected}'s turn, not {got}'s")]
    NotYourTurn { expected: String, got: String },
    #[error("{0} is not a human participant in this room")]
    UnknownParticipant(String),
    #[error("another need is outstanding")]
    NeedOutstanding,
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("room was changed by another device")]
    Conflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened on Lightward's turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Spoke,
    Yielded,
    Departed,
    /// A stored reply was found; the turn advanced without a new request
    AlreadyResponded,
    /// Another device holds the need
    ClaimedElsewhere,
}

pub struct ConversationCoordinator {
    lifecycle: RoomLifecycle,
    services: Services,
    record: RecordHandle,
}

impl ConversationCoordinator {
    pub(super) fn new(lifecycle: RoomLifecycle, services: Services, record: RecordHandle) -> Self {
        Self {
            lifecycle,
            services,
            record,
        }
    }

    pub fn restore(record: RoomRecord, version: Version, services: Services) -> Self {
        let handle = RecordHandle::at_version(services.records.clone(), &record.spec.id, version);
        Self::new(RoomLifecycle::restore(record), services, handle)
    }

    pub fn lifecycle(&self) -> &RoomLifecycle {
        &self.lifecycle
    }

    pub fn spec(&self) -> &RoomSpec {
        self.lifecycle.spec()
    }

    pub fn state(&self) -> &RoomState {
        self.lifecycle.state()
    }

    /// Turn state while the room is active
    pub fn current_turn_state(&self) -> Option<&TurnState> {
        match self.state() {
            RoomState::Active { turn } => Some(turn),
            _ => None,
        }
    }

    pub fn current_speaker(&self) -> Option<&ParticipantSpec> {
        let turn = self.current_turn_state()?;
        self.spec().speaker_at(turn.current_turn_index)
    }

    fn is_lightward_turn(&self) -> bool {
        self.current_speaker().is_some_and(ParticipantSpec::is_lightward)
    }

    fn active_turn(&self) -> Result<&TurnState, ConversationError> {
        self.current_turn_state()
            .ok_or(ConversationError::NotActive(self.state().tag()))
    }

    fn lightward_id(&self) -> String {
        self.spec().lightward().map(|p| p.id.clone()).unwrap_or_default()
    }

    fn require_human(&self, participant_id: &str) -> Result<(), ConversationError> {
        if self.spec().is_human(participant_id) {
            Ok(())
        } else {
            Err(ConversationError::UnknownParticipant(participant_id.to_string()))
        }
    }

    /// Active, human, and holding the turn. Returns the turn index.
    fn require_speaker(&self, participant_id: &str) -> Result<u64, ConversationError> {
        let index = self.active_turn()?.current_turn_index;
        self.require_human(participant_id)?;
        let expected = self.current_speaker().map(|p| p.id.clone()).unwrap_or_default();
        if expected != participant_id {
            return Err(ConversationError::NotYourTurn {
                expected: self.spec().nickname(&expected).to_string(),
                got: self.spec().nickname(participant_id).to_string(),
            });
        }
        Ok(index)
    }

    // ==================== Human operations ====================

    /// Store the speaker's message and pass the turn. If Lightward is next
    /// its turn runs before this returns.
    pub async fn send_message(
        &mut self,
        author_id: &str,
        text: &str,
    ) -> Result<Option<TurnOutcome>, ConversationError> {
        let base = self.require_speaker(author_id)?;
        self.save_message(Message::speech(&self.spec().id, author_id, text).at_turn(base))
            .await?;
        self.advance_and_respond(base).await
    }

    /// Pass the turn without a trace in the transcript
    pub async fn yield_turn(&mut self, author_id: &str) -> Result<Option<TurnOutcome>, ConversationError> {
        let base = self.require_speaker(author_id)?;
        self.advance_and_respond(base).await
    }

    /// Pass the turn, noting in the transcript that the speaker is listening
    pub async fn human_yield_turn(
        &mut self,
        author_id: &str,
    ) -> Result<Option<TurnOutcome>, ConversationError> {
        let base = self.require_speaker(author_id)?;
        let text = listening_narration(self.spec().nickname(author_id));
        self.save_message(Message::narration(&self.spec().id, author_id, text).at_turn(base))
            .await?;
        self.advance_and_respond(base).await
    }

    pub async fn raise_hand(&mut self, participant_id: &str) -> Result<(), ConversationError> {
        let base = self.active_turn()?.current_turn_index;
        self.require_human(participant_id)?;
        self.lifecycle.apply(RoomEvent::HandRaised {
            participant_id: participant_id.to_string(),
        });
        self.persist(base).await
    }

    pub async fn lower_hand(&mut self, participant_id: &str) -> Result<(), ConversationError> {
        let base = self.active_turn()?.current_turn_index;
        self.require_human(participant_id)?;
        self.lifecycle.apply(RoomEvent::HandLowered {
            participant_id: participant_id.to_string(),
        });
        self.persist(base).await
    }

    /// Ask Lightward whether it wants to speak out of turn. Returns true if it
    /// raised its hand. Always false on Lightward's own turn.
    pub async fn request_hand_raise_check(&mut self) -> Result<bool, ConversationError> {
        let base = self.active_turn()?.current_turn_index;
        if self.is_lightward_turn() {
            return Ok(false);
        }

        let need = self.ensure_need(NeedKind::HandRaiseCheck, base).await?;
        if !self.claim(&need).await? {
            return Ok(false);
        }

        let messages = self.services.messages.fetch_messages(&self.spec().id).await?;
        let request = CompletionRequest::hand_raise_check(self.spec(), &messages);
        let lightward = self.lightward_id();

        match self.services.completion.respond(&request).await {
            Ok(reply) => {
                let raised = starts_with_word(&reply, RAISE);
                if raised {
                    self.lifecycle.apply(RoomEvent::HandRaised {
                        participant_id: lightward,
                    });
                }
                self.lifecycle.apply(RoomEvent::NeedCompleted);
                self.persist(base).await?;
                tracing::info!(room_id = %self.spec().id, raised, "Hand-raise check finished");
                Ok(raised)
            }
            Err(CompletionError::Horizon { farewell }) => {
                self.depart_at_horizon(farewell, base).await?;
                Ok(false)
            }
            Err(e) => {
                // Free the socket so Lightward's own turn is not blocked
                self.lifecycle.apply(RoomEvent::NeedCompleted);
                self.persist(base).await?;
                Err(e.into())
            }
        }
    }

    /// Post-restart reconciliation. If Lightward's reply is already stored
    /// the turn advances with no completion call; otherwise the turn runs.
    pub async fn trigger_lightward_if_their_turn(
        &mut self,
    ) -> Result<Option<TurnOutcome>, ConversationError> {
        let messages = self.services.messages.fetch_messages(&self.spec().id).await?;
        let decision = recovery::decide(self.spec(), self.state(), &messages, &self.services.device_id);
        tracing::debug!(room_id = %self.spec().id, ?decision, "Lightward turn check");

        match decision.action {
            RecoveryAction::Nothing => Ok(None),
            RecoveryAction::Advance => {
                let base = self.active_turn()?.current_turn_index;
                tracing::info!(room_id = %self.spec().id, turn_index = base, "Lightward already replied; advancing");
                self.lifecycle.apply(RoomEvent::MessageSent);
                self.persist(base).await?;
                Ok(Some(TurnOutcome::AlreadyResponded))
            }
            RecoveryAction::RunTurn => self.run_lightward_turn().await.map(Some),
        }
    }

    pub async fn lock(&mut self, cenotaph: impl Into<String>) -> Result<(), ConversationError> {
        let base = self.active_turn()?.current_turn_index;
        self.lifecycle.apply(RoomEvent::CenotaphWritten {
            text: cenotaph.into(),
        });
        self.persist(base).await
    }

    /// Fold in a record seen on the change feed. Returns true if our state
    /// changed.
    pub fn reconcile_remote(&mut self, remote: &RoomRecord, version: Version) -> bool {
        if remote.spec.id != self.spec().id || self.record.version().is_some_and(|known| version <= known) {
            return false;
        }
        self.record.observe(version);
        self.lifecycle.merge_remote(&remote.state)
    }

    /// Fetch the stored record and merge it in
    pub async fn refresh(&mut self) -> Result<bool, StoreError> {
        let Some(remote) = self.record.fetch().await? else {
            return Ok(false);
        };
        Ok(self.lifecycle.merge_remote(&remote.state))
    }

    // ==================== Lightward's turn ====================

    async fn advance_and_respond(&mut self, base: u64) -> Result<Option<TurnOutcome>, ConversationError> {
        self.advance(base).await?;
        if !self.is_lightward_turn() {
            return Ok(None);
        }
        self.run_lightward_turn().await.map(Some)
    }

    async fn advance(&mut self, base: u64) -> Result<(), ConversationError> {
        self.lifecycle.apply(RoomEvent::MessageSent);
        self.persist(base).await
    }

    async fn run_lightward_turn(&mut self) -> Result<TurnOutcome, ConversationError> {
        let base = self.active_turn()?.current_turn_index;
        let need = self.ensure_need(NeedKind::LightwardTurn, base).await?;
        if !self.claim(&need).await? {
            return Ok(TurnOutcome::ClaimedElsewhere);
        }

        let room_id = self.spec().id.clone();
        let lightward = self.lightward_id();
        let messages = self.services.messages.fetch_messages(&room_id).await?;
        let request = CompletionRequest::turn(self.spec(), &messages);

        let reply = match self.services.completion.respond(&request).await {
            Ok(reply) => reply,
            Err(CompletionError::Horizon { farewell }) => {
                self.depart_at_horizon(farewell, base).await?;
                return Ok(TurnOutcome::Departed);
            }
            Err(e) => {
                // Need stays claimed by us; the next trigger retries it
                tracing::warn!(room_id = %room_id, need_id = %need.id, error = %e, "Lightward turn failed");
                return Err(e.into());
            }
        };

        match signal::interpret(&reply) {
            Signal::Yield => {
                let text = listening_narration(self.spec().nickname(&lightward));
                self.save_message(Message::narration(&room_id, &lightward, text).at_turn(base))
                    .await?;
                self.advance(base).await?;
                tracing::info!(room_id = %room_id, turn_index = base, "Lightward yielded");
                Ok(TurnOutcome::Yielded)
            }
            Signal::Depart { farewell } => {
                if let Some(farewell) = farewell {
                    self.save_message(Message::speech(&room_id, &lightward, farewell).at_turn(base))
                        .await?;
                }
                self.depart(&lightward, base).await?;
                Ok(TurnOutcome::Departed)
            }
            Signal::Speech(text) => {
                self.save_message(Message::speech(&room_id, &lightward, text).at_turn(base))
                    .await?;
                self.advance(base).await?;
                tracing::info!(room_id = %room_id, turn_index = base, "Lightward spoke");
                Ok(TurnOutcome::Spoke)
            }
        }
    }

    async fn depart_at_horizon(&mut self, farewell: String, base: u64) -> Result<(), ConversationError> {
        let lightward = self.lightward_id();
        tracing::info!(room_id = %self.spec().id, "Conversation horizon reached");
        if !farewell.trim().is_empty() {
            self.save_message(Message::speech(&self.spec().id, &lightward, farewell).at_turn(base))
                .await?;
        }
        self.depart(&lightward, base).await
    }

    /// Narrate the departure and end the room. The turn does not advance.
    async fn depart(&mut self, participant_id: &str, base: u64) -> Result<(), ConversationError> {
        let text = departure_narration(self.spec().nickname(participant_id));
        self.save_message(Message::narration(&self.spec().id, participant_id, text).at_turn(base))
            .await?;
        self.lifecycle.apply(RoomEvent::ParticipantDeparted {
            participant_id: participant_id.to_string(),
        });
        self.persist(base).await
    }

    /// The current need if it is of `kind`, otherwise a new one. Fails when a
    /// need of another kind holds the socket.
    async fn ensure_need(&mut self, kind: NeedKind, base: u64) -> Result<Need, ConversationError> {
        match &self.active_turn()?.current_need {
            Some(need) if need.kind == kind => return Ok(need.clone()),
            Some(_) => return Err(ConversationError::NeedOutstanding),
            None => {}
        }

        let need = Need::new(kind);
        tracing::debug!(room_id = %self.spec().id, need_id = %need.id, ?kind, "Need created");
        self.lifecycle.apply(RoomEvent::NeedCreated { need });
        self.persist(base).await?;

        // Another device may have created one first; theirs is current
        match &self.active_turn()?.current_need {
            Some(need) if need.kind == kind => Ok(need.clone()),
            _ => Err(ConversationError::NeedOutstanding),
        }
    }

    /// Claim through the store. A need this device already holds is resumed
    /// without claiming again.
    async fn claim(&mut self, need: &Need) -> Result<bool, ConversationError> {
        let device_id = self.services.device_id.clone();
        if need.is_claimed_by(&device_id) {
            tracing::info!(room_id = %self.spec().id, need_id = %need.id, "Resuming own claim");
            return Ok(true);
        }

        let won = self
            .services
            .claim
            .claim(&self.spec().id, &need.id, &device_id)
            .await?;
        // The claim wrote the record behind our back
        self.refresh().await?;
        Ok(won)
    }

    async fn save_message(&self, message: Message) -> Result<(), ConversationError> {
        self.services.messages.save(&message).await?;
        tracing::debug!(
            room_id = %message.room_id,
            message_id = %message.id,
            kind = message.kind.as_str(),
            "Message stored"
        );
        Ok(())
    }

    /// Conditional save. A conflict that only touched the same turn is merged
    /// and written again; one where another device moved the turn past `base`
    /// or ended the room leaves us with their state and returns `Conflict`.
    async fn persist(&mut self, base: u64) -> Result<(), ConversationError> {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            if self.record.save(&self.lifecycle.record()).await? == SaveOutcome::Saved {
                return Ok(());
            }

            let Some(remote) = self.record.fetch().await? else {
                return Err(ConversationError::Conflict);
            };
            let overtaken = remote.state.is_terminal()
                || !remote.state.is_active()
                || remote
                    .state
                    .turn()
                    .is_some_and(|t| t.current_turn_index > base);
            self.lifecycle.merge_remote(&remote.state);

            if overtaken {
                tracing::info!(
                    room_id = %self.spec().id,
                    base_turn = base,
                    remote = remote.state.tag(),
                    "Room moved on elsewhere"
                );
                return Err(ConversationError::Conflict);
            }
            if *self.state() == remote.state {
                return Ok(());
            }
        }

        Err(ConversationError::Conflict)
    }
}
