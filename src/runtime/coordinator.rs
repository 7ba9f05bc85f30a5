//! Room creation workflow
//!
//! Drives a room from draft to active: resolve participants, hold payment,
//! ask Lightward, wait for every human, capture. External failures become
//! lifecycle events first (so the stored state records why the room ended)
//! and are then returned to the caller.

use super::conversation::ConversationCoordinator;
use super::services::{remote_supersedes, RecordHandle, SaveOutcome, Services};
use crate::lifecycle::{Effect, RoomEvent, RoomLifecycle, RoomState};
use crate::llm::Acceptance;
use crate::payment::{Authorization, PaymentError};
use crate::resolver::ResolutionError;
use crate::room::{RoomRecord, RoomSpec};
use crate::store::{StoreError, Version};
use std::collections::VecDeque;
use thiserror::Error;

/// Rebase attempts when another device wrote the record first
const MAX_SAVE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum RoomLifecycleError {
    #[error("could not resolve participant {participant_id}: {source}")]
    Resolution {
        participant_id: String,
        source: ResolutionError,
    },
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("Lightward declined the invitation")]
    LightwardDeclined,
    #[error("cannot {operation} while room is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    #[error("{0} is not a human participant in this room")]
    UnknownParticipant(String),
    #[error("room was changed by another device")]
    Conflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum EffectOutcome {
    Done,
    Next(RoomEvent),
    Failed(RoomEvent, RoomLifecycleError),
    /// The effect did not run and no event follows
    Aborted(RoomLifecycleError),
}

pub struct RoomLifecycleCoordinator {
    lifecycle: RoomLifecycle,
    services: Services,
    record: RecordHandle,
    /// Held between authorization and capture/release. Only the device that
    /// authorized has one.
    authorization: Option<Authorization>,
}

impl RoomLifecycleCoordinator {
    pub fn new(spec: RoomSpec, services: Services) -> Self {
        let record = RecordHandle::new(services.records.clone(), &spec.id);
        Self {
            lifecycle: RoomLifecycle::new(spec),
            services,
            record,
            authorization: None,
        }
    }

    /// Pick up a room another process (or an earlier run of this one) wrote
    pub fn restore(record: RoomRecord, version: Version, services: Services) -> Self {
        let handle = RecordHandle::at_version(services.records.clone(), &record.spec.id, version);
        Self {
            lifecycle: RoomLifecycle::restore(record),
            services,
            record: handle,
            authorization: None,
        }
    }

    pub fn lifecycle(&self) -> &RoomLifecycle {
        &self.lifecycle
    }

    pub fn state(&self) -> &RoomState {
        self.lifecycle.state()
    }

    pub fn spec(&self) -> &RoomSpec {
        self.lifecycle.spec()
    }

    pub fn holds_authorization(&self) -> bool {
        self.authorization.is_some()
    }

    fn require(&self, operation: &'static str, allowed: fn(&RoomState) -> bool) -> Result<(), RoomLifecycleError> {
        if allowed(self.state()) {
            Ok(())
        } else {
            Err(RoomLifecycleError::InvalidState {
                operation,
                state: self.state().tag(),
            })
        }
    }

    // ==================== Operations ====================

    /// Run creation from draft as far as it can go without the humans:
    /// ends in `pending_humans` on success, `defunct` on any failure.
    pub async fn start(&mut self) -> Result<(), RoomLifecycleError> {
        self.require("start", |s| matches!(s, RoomState::Draft))?;
        tracing::info!(room_id = %self.spec().id, tier = %self.spec().tier, "Starting room");

        // Make the draft visible before any external call
        self.save().await?;

        let participants = self.spec().participants.clone();
        let failure = match self.services.resolver.resolve_all(&participants).await {
            Ok(_) => self.drive(RoomEvent::ParticipantsResolved).await,
            Err((participant_id, source)) => {
                tracing::warn!(
                    room_id = %self.spec().id,
                    participant_id = %participant_id,
                    error = %source,
                    "Participant resolution failed"
                );
                self.drive(RoomEvent::ResolutionFailed {
                    participant_id: participant_id.clone(),
                })
                .await;
                Some(RoomLifecycleError::Resolution {
                    participant_id,
                    source,
                })
            }
        };

        self.finish(failure).await
    }

    /// A human says they are here. The last one triggers capture and
    /// activation.
    pub async fn signal_here(&mut self, participant_id: &str) -> Result<(), RoomLifecycleError> {
        self.require("signal here", |s| matches!(s, RoomState::PendingHumans { .. }))?;
        if !self.spec().is_human(participant_id) {
            return Err(RoomLifecycleError::UnknownParticipant(participant_id.to_string()));
        }

        let failure = self
            .drive(RoomEvent::HumanSignaledHere {
                participant_id: participant_id.to_string(),
            })
            .await;
        self.finish(failure).await
    }

    /// Abandon a room that is not yet active. Any held authorization is
    /// released before this returns.
    pub async fn cancel(&mut self) -> Result<(), RoomLifecycleError> {
        self.require("cancel", |s| {
            matches!(s, RoomState::Draft) || s.holds_authorization()
        })?;
        let failure = self.drive(RoomEvent::Cancelled).await;
        self.finish(failure).await
    }

    /// The humans did not all arrive in time
    pub async fn expire(&mut self) -> Result<(), RoomLifecycleError> {
        self.require("expire", |s| matches!(s, RoomState::PendingHumans { .. }))?;
        let failure = self.drive(RoomEvent::Expired).await;
        self.finish(failure).await
    }

    pub async fn lock(&mut self, cenotaph: impl Into<String>) -> Result<(), RoomLifecycleError> {
        self.require("lock", RoomState::is_active)?;
        let failure = self
            .drive(RoomEvent::CenotaphWritten {
                text: cenotaph.into(),
            })
            .await;
        self.finish(failure).await
    }

    /// Fold in a record observed on the change feed. Returns true if the local
    /// state changed.
    ///
    /// This is how a creating device learns about signals and cancellations
    /// made elsewhere, and where it performs the capture or release only it
    /// can do.
    pub async fn reconcile_remote(
        &mut self,
        remote: &RoomRecord,
        version: Version,
    ) -> Result<bool, RoomLifecycleError> {
        // Echoes of our own writes and out-of-order deliveries
        if remote.spec.id != self.spec().id || self.record.version().is_some_and(|known| version <= known) {
            return Ok(false);
        }
        self.record.observe(version);

        let before = self.state().clone();
        if remote_supersedes(&before, &remote.state) || remote.state.tag() == before.tag() {
            self.lifecycle.merge_remote(&remote.state);
        }

        let failure = self.settle().await;
        let changed = *self.state() != before;
        if changed || failure.is_some() {
            self.finish(failure).await?;
        }
        Ok(changed)
    }

    /// Hand the room to the turn loop. Fails (returning self) unless active.
    pub fn into_conversation(self) -> Result<ConversationCoordinator, Self> {
        if !self.state().is_active() {
            return Err(self);
        }
        if self.authorization.is_some() {
            tracing::warn!(room_id = %self.spec().id, "Active room still holds an authorization");
        }
        Ok(ConversationCoordinator::new(self.lifecycle, self.services, self.record))
    }

    // ==================== Internals ====================

    /// Apply an event and every event its effects produce, in order. Returns
    /// the first failure.
    async fn drive(&mut self, event: RoomEvent) -> Option<RoomLifecycleError> {
        let mut failure = None;
        let mut events = VecDeque::from([event]);

        while let Some(event) = events.pop_front() {
            for effect in self.lifecycle.apply(event) {
                match self.execute_effect(effect).await {
                    EffectOutcome::Done => {}
                    EffectOutcome::Next(next) => events.push_back(next),
                    EffectOutcome::Failed(next, error) => {
                        events.push_back(next);
                        failure.get_or_insert(error);
                    }
                    EffectOutcome::Aborted(error) => {
                        failure.get_or_insert(error);
                    }
                }
            }
        }

        failure
    }

    async fn execute_effect(&mut self, effect: Effect) -> EffectOutcome {
        let room_id = self.spec().id.clone();
        match effect {
            Effect::AuthorizePayment => {
                let cents = self.spec().tier.cents();
                match self.services.payments.authorize(cents).await {
                    Ok(authorization) => {
                        tracing::info!(room_id = %room_id, authorization_id = %authorization.id, cents, "Payment authorized");
                        self.authorization = Some(authorization);
                        EffectOutcome::Next(RoomEvent::PaymentAuthorized)
                    }
                    Err(e) => {
                        tracing::warn!(room_id = %room_id, error = %e, "Payment authorization failed");
                        EffectOutcome::Failed(
                            RoomEvent::PaymentAuthorizationFailed { kind: e.kind() },
                            RoomLifecycleError::Payment(e),
                        )
                    }
                }
            }

            Effect::RequestLightwardPresence => {
                let spec = self.spec();
                match self
                    .services
                    .oracle
                    .evaluate(&spec.id, &spec.participants, spec.tier)
                    .await
                {
                    Acceptance::Accepted => {
                        tracing::info!(room_id = %room_id, "Lightward accepted");
                        EffectOutcome::Next(RoomEvent::LightwardAccepted)
                    }
                    Acceptance::Declined => {
                        tracing::info!(room_id = %room_id, "Lightward declined");
                        EffectOutcome::Failed(
                            RoomEvent::LightwardDeclined,
                            RoomLifecycleError::LightwardDeclined,
                        )
                    }
                }
            }

            // Invites are the pending room itself, made visible by saving it
            Effect::DispatchInvites => {
                tracing::info!(
                    room_id = %room_id,
                    humans = self.spec().humans().count(),
                    "Invites dispatched"
                );
                EffectOutcome::Done
            }

            Effect::ReleasePaymentAuthorization => {
                match self.authorization.take() {
                    Some(authorization) => {
                        self.services.payments.release(&authorization).await;
                        tracing::info!(room_id = %room_id, authorization_id = %authorization.id, "Authorization released");
                    }
                    None => {
                        tracing::debug!(room_id = %room_id, "No authorization held on this device");
                    }
                }
                EffectOutcome::Done
            }

            Effect::CapturePayment => {
                let Some(authorization) = self.authorization.clone() else {
                    // The creating device captures when it sees pending_capture
                    tracing::info!(room_id = %room_id, "Awaiting capture by the creating device");
                    return EffectOutcome::Done;
                };
                // No charge unless our pending_capture is the stored state
                match self.persist_before_capture().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!(
                            room_id = %room_id,
                            state = self.state().tag(),
                            "Room moved on before capture; releasing authorization"
                        );
                        self.authorization = None;
                        self.services.payments.release(&authorization).await;
                        return EffectOutcome::Aborted(RoomLifecycleError::Conflict);
                    }
                    Err(e) => {
                        tracing::warn!(room_id = %room_id, error = %e, "Could not record pending capture");
                        return EffectOutcome::Aborted(e);
                    }
                }
                match self.services.payments.capture(&authorization).await {
                    Ok(()) => {
                        self.authorization = None;
                        tracing::info!(room_id = %room_id, authorization_id = %authorization.id, "Payment captured");
                        EffectOutcome::Next(RoomEvent::PaymentCaptured)
                    }
                    Err(e) => {
                        self.authorization = None;
                        tracing::warn!(room_id = %room_id, error = %e, "Payment capture failed");
                        EffectOutcome::Failed(
                            RoomEvent::PaymentCaptureFailed { kind: e.kind() },
                            RoomLifecycleError::Payment(e),
                        )
                    }
                }
            }

            Effect::ActivateRoom => {
                tracing::info!(room_id = %room_id, "Room is active");
                EffectOutcome::Done
            }
        }
    }

    /// Finish work a merged state implies: complete a signal set gathered
    /// across devices, capture a hold this device owns, release a hold on a
    /// room that ended elsewhere.
    async fn settle(&mut self) -> Option<RoomLifecycleError> {
        match self.state().clone() {
            RoomState::PendingHumans { signaled } => {
                let humans = self.spec().human_ids();
                let last = humans.iter().find(|id| signaled.contains(*id)).cloned();
                match last {
                    Some(participant_id) if signaled.is_superset(&humans) => {
                        self.drive(RoomEvent::HumanSignaledHere { participant_id }).await
                    }
                    _ => None,
                }
            }
            RoomState::PendingCapture if self.authorization.is_some() => {
                match self.execute_effect(Effect::CapturePayment).await {
                    EffectOutcome::Done => None,
                    EffectOutcome::Next(event) => self.drive(event).await,
                    EffectOutcome::Failed(event, error) => {
                        self.drive(event).await;
                        Some(error)
                    }
                    EffectOutcome::Aborted(error) => Some(error),
                }
            }
            state if state.is_terminal() => {
                if let Some(authorization) = self.authorization.take() {
                    tracing::info!(room_id = %self.spec().id, "Room ended elsewhere; releasing authorization");
                    self.services.payments.release(&authorization).await;
                }
                None
            }
            _ => None,
        }
    }

    /// Conditional save of `pending_capture`. True when our write is the
    /// stored state. False when another device moved the room further
    /// along or ended it, in which case their state has been adopted.
    async fn persist_before_capture(&mut self) -> Result<bool, RoomLifecycleError> {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            if self.record.save(&self.lifecycle.record()).await? == SaveOutcome::Saved {
                return Ok(true);
            }

            let Some(remote) = self.record.fetch().await? else {
                return Err(RoomLifecycleError::Conflict);
            };
            if remote_supersedes(self.state(), &remote.state) {
                self.lifecycle.merge_remote(&remote.state);
                return Ok(false);
            }
            if remote.state.tag() == self.state().tag() {
                self.lifecycle.merge_remote(&remote.state);
            }
        }

        Err(RoomLifecycleError::Conflict)
    }

    /// Save, then report the operation's failure (if any). A save error wins
    /// because the caller cannot assume the state was recorded.
    async fn finish(&mut self, failure: Option<RoomLifecycleError>) -> Result<(), RoomLifecycleError> {
        self.save().await?;
        failure.map_or(Ok(()), Err)
    }

    /// Conditional save with rebase. Compatible states (same tag) are merged
    /// and written on top of the stored version. If another device moved the
    /// room further along, or ended it, we adopt their state, finish whatever
    /// it implies for this device, and report a conflict.
    async fn save(&mut self) -> Result<(), RoomLifecycleError> {
        let mut superseded = false;

        for _ in 0..MAX_SAVE_ATTEMPTS {
            if self.record.save(&self.lifecycle.record()).await? == SaveOutcome::Saved {
                return if superseded {
                    Err(RoomLifecycleError::Conflict)
                } else {
                    Ok(())
                };
            }

            let Some(remote) = self.record.fetch().await? else {
                return Err(RoomLifecycleError::Conflict);
            };

            if remote_supersedes(self.state(), &remote.state) {
                superseded = true;
                self.lifecycle.merge_remote(&remote.state);
            } else if remote.state.tag() == self.state().tag() {
                self.lifecycle.merge_remote(&remote.state);
            }

            if let Some(error) = self.settle().await {
                tracing::warn!(room_id = %self.spec().id, error = %error, "Settling merged state failed");
            }

            // Nothing of ours left to write
            if superseded && *self.state() == remote.state {
                return Err(RoomLifecycleError::Conflict);
            }
        }

        Err(RoomLifecycleError::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::DefunctReason;
    use crate::payment::PaymentErrorKind;
    use crate::runtime::testing::TestHarness;

    #[tokio::test]
    async fn test_end_to_end_creation() {
        let harness = TestHarness::new();
        let mut coordinator = harness.coordinator();
        let [ada, bo] = harness.human_ids();

        coordinator.start().await.unwrap();
        assert!(matches!(coordinator.state(), RoomState::PendingHumans { signaled } if signaled.is_empty()));
        assert_eq!(harness.payments.authorized(), vec![100]);
        assert_eq!(harness.resolver.calls(), 3);

        coordinator.signal_here(&ada).await.unwrap();
        assert!(matches!(coordinator.state(), RoomState::PendingHumans { signaled } if signaled.len() == 1));

        coordinator.signal_here(&bo).await.unwrap();
        assert_eq!(coordinator.state().turn().map(|t| t.current_turn_index), Some(0));
        assert!(coordinator.state().is_active());
        assert_eq!(harness.payments.captured().len(), 1);
        assert!(!coordinator.holds_authorization());

        let stored = harness.stored_record(&coordinator.spec().id).unwrap();
        assert!(stored.state.is_active());
    }

    #[tokio::test]
    async fn test_resolution_failure_is_recorded_and_raised() {
        let harness = TestHarness::new();
        let [_, bo] = harness.human_ids();
        harness.resolver.fail(&bo, ResolutionError::NotDiscoverable);
        let mut coordinator = harness.coordinator();

        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(
            err,
            RoomLifecycleError::Resolution { ref participant_id, source: ResolutionError::NotDiscoverable }
                if *participant_id == bo
        ));
        assert_eq!(
            coordinator.state(),
            &RoomState::Defunct {
                reason: DefunctReason::ResolutionFailed { participant_id: bo }
            }
        );
        assert!(harness.payments.authorized().is_empty());
    }

    #[tokio::test]
    async fn test_declined_payment() {
        let harness = TestHarness::new();
        harness
            .payments
            .fail_authorize(PaymentError::Declined("insufficient funds".into()));
        let mut coordinator = harness.coordinator();

        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(err, RoomLifecycleError::Payment(PaymentError::Declined(_))));
        assert_eq!(
            coordinator.state(),
            &RoomState::Defunct {
                reason: DefunctReason::PaymentAuthorizationFailed {
                    kind: PaymentErrorKind::Declined
                }
            }
        );
        let stored = harness.stored_record(&coordinator.spec().id).unwrap();
        assert_eq!(&stored.state, coordinator.state());
    }

    #[tokio::test]
    async fn test_lightward_declines_releases_hold() {
        let harness = TestHarness::new();
        harness.oracle.set(Acceptance::Declined);
        let mut coordinator = harness.coordinator();

        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(err, RoomLifecycleError::LightwardDeclined));
        assert_eq!(harness.payments.released().len(), 1);
        assert!(!coordinator.holds_authorization());
    }

    #[tokio::test]
    async fn test_cancel_releases_before_returning() {
        let harness = TestHarness::new();
        let mut coordinator = harness.coordinator();
        coordinator.start().await.unwrap();

        coordinator.cancel().await.unwrap();
        assert_eq!(harness.payments.released().len(), 1);
        assert_eq!(
            coordinator.state(),
            &RoomState::Defunct {
                reason: DefunctReason::Cancelled
            }
        );

        // Terminal: nothing else is legal
        assert!(matches!(
            coordinator.cancel().await,
            Err(RoomLifecycleError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_from_draft_releases_nothing() {
        let harness = TestHarness::new();
        let mut coordinator = harness.coordinator();
        coordinator.cancel().await.unwrap();
        assert!(harness.payments.released().is_empty());
    }

    #[tokio::test]
    async fn test_signal_validation() {
        let harness = TestHarness::new();
        let mut coordinator = harness.coordinator();
        let [ada, _] = harness.human_ids();

        assert!(matches!(
            coordinator.signal_here(&ada).await,
            Err(RoomLifecycleError::InvalidState { operation: "signal here", state: "draft" })
        ));

        coordinator.start().await.unwrap();
        let lightward = coordinator.spec().lightward().unwrap().id.clone();
        assert!(matches!(
            coordinator.signal_here(&lightward).await,
            Err(RoomLifecycleError::UnknownParticipant(_))
        ));
        assert!(matches!(
            coordinator.lock("too early").await,
            Err(RoomLifecycleError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_expire_releases() {
        let harness = TestHarness::new();
        let mut coordinator = harness.coordinator();
        coordinator.start().await.unwrap();

        coordinator.expire().await.unwrap();
        assert_eq!(
            coordinator.state(),
            &RoomState::Defunct {
                reason: DefunctReason::Expired
            }
        );
        assert_eq!(harness.payments.released().len(), 1);
    }

    #[tokio::test]
    async fn test_capture_failure() {
        let harness = TestHarness::new();
        harness.payments.fail_capture(PaymentError::Expired);
        let mut coordinator = harness.coordinator();
        let [ada, bo] = harness.human_ids();
        coordinator.start().await.unwrap();
        coordinator.signal_here(&ada).await.unwrap();

        let err = coordinator.signal_here(&bo).await.unwrap_err();
        assert!(matches!(err, RoomLifecycleError::Payment(PaymentError::Expired)));
        assert_eq!(
            coordinator.state(),
            &RoomState::Defunct {
                reason: DefunctReason::PaymentCaptureFailed {
                    kind: PaymentErrorKind::Expired
                }
            }
        );
    }

    #[tokio::test]
    async fn test_signal_from_other_device_completes_capture_here() {
        let harness = TestHarness::new();
        let mut creator = harness.coordinator();
        let [ada, bo] = harness.human_ids();
        creator.start().await.unwrap();
        creator.signal_here(&ada).await.unwrap();

        // A second device loads the room and records bo's signal. It holds no
        // authorization, so it stops at pending_capture.
        let (record, version) = harness.stored_versioned(&creator.spec().id).unwrap();
        let mut other = RoomLifecycleCoordinator::restore(record, version, harness.services_for("device-b"));
        other.signal_here(&bo).await.unwrap();
        assert_eq!(other.state(), &RoomState::PendingCapture);
        assert!(harness.payments.captured().is_empty());

        // The creator sees it and captures
        let (record, version) = harness.stored_versioned(&creator.spec().id).unwrap();
        assert!(creator.reconcile_remote(&record, version).await.unwrap());
        assert!(creator.state().is_active());
        assert_eq!(harness.payments.captured().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_signals_merge_on_conflict() {
        let harness = TestHarness::new();
        let mut creator = harness.coordinator();
        let [ada, bo] = harness.human_ids();
        creator.start().await.unwrap();

        let (record, version) = harness.stored_versioned(&creator.spec().id).unwrap();
        let mut other = RoomLifecycleCoordinator::restore(record, version, harness.services_for("device-b"));
        other.signal_here(&bo).await.unwrap();

        // The creator has not seen bo's write; its save conflicts, merges the
        // signal sets and completes the room.
        creator.signal_here(&ada).await.unwrap();
        assert!(creator.state().is_active());
        assert_eq!(harness.payments.captured().len(), 1);
        assert!(harness.stored_record(&creator.spec().id).unwrap().state.is_active());
    }

    #[tokio::test]
    async fn test_remote_cancel_releases_local_hold() {
        let harness = TestHarness::new();
        let mut creator = harness.coordinator();
        creator.start().await.unwrap();

        let (record, version) = harness.stored_versioned(&creator.spec().id).unwrap();
        let mut other = RoomLifecycleCoordinator::restore(record, version, harness.services_for("device-b"));
        other.cancel().await.unwrap();
        assert!(harness.payments.released().is_empty());

        let (record, version) = harness.stored_versioned(&creator.spec().id).unwrap();
        creator.reconcile_remote(&record, version).await.unwrap();
        assert!(creator.state().is_terminal());
        assert_eq!(harness.payments.released().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_elsewhere_before_capture_releases_instead() {
        let harness = TestHarness::new();
        let mut creator = harness.coordinator();
        let [ada, bo] = harness.human_ids();
        creator.start().await.unwrap();
        creator.signal_here(&ada).await.unwrap();

        let (record, version) = harness.stored_versioned(&creator.spec().id).unwrap();
        let mut other = RoomLifecycleCoordinator::restore(record, version, harness.services_for("device-b"));
        other.cancel().await.unwrap();

        // The creator has not seen the cancellation when bo arrives
        let err = creator.signal_here(&bo).await.unwrap_err();
        assert!(matches!(err, RoomLifecycleError::Conflict));
        assert_eq!(
            creator.state(),
            &RoomState::Defunct {
                reason: DefunctReason::Cancelled
            }
        );
        assert!(harness.payments.captured().is_empty());
        assert_eq!(harness.payments.released().len(), 1);
        assert!(!creator.holds_authorization());

        let stored = harness.stored_record(&creator.spec().id).unwrap();
        assert_eq!(&stored.state, creator.state());
    }

    #[tokio::test]
    async fn test_capture_follows_stored_pending_capture() {
        let harness = TestHarness::new();
        let mut coordinator = harness.coordinator();
        let [ada, bo] = harness.human_ids();
        coordinator.start().await.unwrap();
        coordinator.signal_here(&ada).await.unwrap();
        let writes_before = harness.store.writes().len();

        coordinator.signal_here(&bo).await.unwrap();
        assert!(coordinator.state().is_active());
        // pending_capture, then active
        assert_eq!(harness.store.writes().len(), writes_before + 2);
    }

    #[tokio::test]
    async fn test_handoff_only_when_active() {
        let harness = TestHarness::new();
        let mut coordinator = harness.coordinator();
        coordinator.start().await.unwrap();

        let coordinator = match coordinator.into_conversation() {
            Ok(_) => panic!("pending room must not hand off"),
            Err(coordinator) => coordinator,
        };
        let mut coordinator = coordinator;
        for id in harness.human_ids() {
            coordinator.signal_here(&id).await.unwrap();
        }
        let conversation = coordinator.into_conversation().ok().unwrap();
        assert_eq!(conversation.current_turn_state().map(|t| t.current_turn_index), Some(0));
    }
}
