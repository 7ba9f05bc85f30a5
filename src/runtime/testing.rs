//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O. Every mock
//! records its calls so tests can assert on what the coordinators did.

use super::conversation::ConversationCoordinator;
use super::coordinator::RoomLifecycleCoordinator;
use super::services::Services;
use crate::claim::AtomicClaim;
use crate::llm::{Acceptance, CompletionError, CompletionRequest, CompletionService, LightwardOracle};
use crate::payment::{Authorization, PaymentError, PaymentProcessor};
use crate::resolver::{ParticipantResolver, ResolutionError};
use crate::room::{
    Message, ParticipantIdentifier, ParticipantSpec, PaymentTier, RoomRecord, RoomSpec,
};
use crate::store::memory::MemoryStore;
use crate::store::{MessageStore, Version};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Resolver
// ============================================================================

/// Resolves every human to `user-<nickname>` unless told to fail
#[derive(Default)]
pub struct MockResolver {
    failures: Mutex<HashMap<String, ResolutionError>>,
    calls: AtomicUsize,
}

impl MockResolver {
    pub fn fail(&self, participant_id: &str, error: ResolutionError) {
        self.failures
            .lock()
            .unwrap()
            .insert(participant_id.to_string(), error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParticipantResolver for MockResolver {
    async fn resolve(&self, participant: &ParticipantSpec) -> Result<Option<String>, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().get(&participant.id) {
            return Err(error.clone());
        }
        if participant.is_lightward() {
            return Ok(None);
        }
        Ok(Some(format!("user-{}", participant.nickname)))
    }
}

// ============================================================================
// Mock Payments
// ============================================================================

#[derive(Default)]
pub struct MockPayments {
    authorize_error: Mutex<Option<PaymentError>>,
    capture_error: Mutex<Option<PaymentError>>,
    authorized: Mutex<Vec<u64>>,
    captured: Mutex<Vec<Authorization>>,
    released: Mutex<Vec<Authorization>>,
}

impl MockPayments {
    pub fn fail_authorize(&self, error: PaymentError) {
        *self.authorize_error.lock().unwrap() = Some(error);
    }

    pub fn fail_capture(&self, error: PaymentError) {
        *self.capture_error.lock().unwrap() = Some(error);
    }

    /// Amounts successfully authorized
    pub fn authorized(&self) -> Vec<u64> {
        self.authorized.lock().unwrap().clone()
    }

    pub fn captured(&self) -> Vec<Authorization> {
        self.captured.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<Authorization> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProcessor for MockPayments {
    async fn authorize(&self, cents: u64) -> Result<Authorization, PaymentError> {
        if let Some(error) = self.authorize_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.authorized.lock().unwrap().push(cents);
        Ok(Authorization {
            id: format!("auth-{}", uuid::Uuid::new_v4()),
            cents,
            expires_at: Utc::now() + Duration::days(7),
        })
    }

    async fn capture(&self, authorization: &Authorization) -> Result<(), PaymentError> {
        if let Some(error) = self.capture_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.captured.lock().unwrap().push(authorization.clone());
        Ok(())
    }

    async fn release(&self, authorization: &Authorization) {
        self.released.lock().unwrap().push(authorization.clone());
    }
}

// ============================================================================
// Mock Oracle
// ============================================================================

pub struct MockOracle {
    acceptance: Mutex<Acceptance>,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self {
            acceptance: Mutex::new(Acceptance::Accepted),
        }
    }
}

impl MockOracle {
    pub fn set(&self, acceptance: Acceptance) {
        *self.acceptance.lock().unwrap() = acceptance;
    }
}

#[async_trait]
impl LightwardOracle for MockOracle {
    async fn evaluate(&self, _room_id: &str, _participants: &[ParticipantSpec], _tier: PaymentTier) -> Acceptance {
        *self.acceptance.lock().unwrap()
    }
}

// ============================================================================
// Mock Completion Service
// ============================================================================

/// Returns queued replies in order; errors once the queue is empty
#[derive(Default)]
pub struct MockCompletion {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn queue_error(&self, error: CompletionError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn respond(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::network("No mock reply queued")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Harness
// ============================================================================

/// One shared store and set of mocks; any number of "devices" can be built
/// over them with `services_for`.
pub struct TestHarness {
    pub store: MemoryStore,
    pub resolver: Arc<MockResolver>,
    pub payments: Arc<MockPayments>,
    pub oracle: Arc<MockOracle>,
    pub completion: Arc<MockCompletion>,
    pub spec: RoomSpec,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Roster `[ada, Lightward, bo]` at the lowest tier
    pub fn new() -> Self {
        Self::with_spec(test_spec())
    }

    pub fn with_spec(spec: RoomSpec) -> Self {
        Self {
            store: MemoryStore::new(),
            resolver: Arc::default(),
            payments: Arc::default(),
            oracle: Arc::default(),
            completion: Arc::default(),
            spec,
        }
    }

    pub fn services(&self) -> Services {
        self.services_for("device-a")
    }

    pub fn services_for(&self, device_id: &str) -> Services {
        let store = Arc::new(self.store.clone());
        Services {
            device_id: device_id.to_string(),
            records: store.clone(),
            messages: store.clone(),
            resolver: self.resolver.clone(),
            payments: self.payments.clone(),
            oracle: self.oracle.clone(),
            completion: self.completion.clone(),
            claim: AtomicClaim::new(store),
        }
    }

    pub fn coordinator(&self) -> RoomLifecycleCoordinator {
        RoomLifecycleCoordinator::new(self.spec.clone(), self.services())
    }

    /// A room taken all the way to active on device-a, turn index 0
    pub async fn active_conversation(&self) -> ConversationCoordinator {
        let mut coordinator = self.coordinator();
        coordinator.start().await.unwrap();
        for id in self.human_ids() {
            coordinator.signal_here(&id).await.unwrap();
        }
        match coordinator.into_conversation() {
            Ok(conversation) => conversation,
            Err(coordinator) => panic!("room did not activate: {:?}", coordinator.state()),
        }
    }

    pub fn human_ids(&self) -> [String; 2] {
        let humans: Vec<String> = self.spec.humans().map(|p| p.id.clone()).collect();
        [humans[0].clone(), humans[1].clone()]
    }

    pub fn lightward_id(&self) -> String {
        self.spec.lightward().unwrap().id.clone()
    }

    pub fn stored_record(&self, room_id: &str) -> Option<RoomRecord> {
        RoomRecord::from_value(self.store.value(&RoomRecord::key(room_id))?)
    }

    pub fn stored_versioned(&self, room_id: &str) -> Option<(RoomRecord, Version)> {
        let stored = self.store.versioned(&RoomRecord::key(room_id))?;
        Some((RoomRecord::from_value(stored.value)?, stored.version))
    }

    pub async fn messages(&self, room_id: &str) -> Vec<Message> {
        self.store.fetch_messages(room_id).await.unwrap()
    }

    pub async fn save_message(&self, message: Message) {
        MessageStore::save(&self.store, &message).await.unwrap();
    }
}

pub fn test_spec() -> RoomSpec {
    RoomSpec::new(
        "origin",
        vec![
            ParticipantSpec::new(ParticipantIdentifier::Email("ada@example.com".into()), "ada"),
            ParticipantSpec::lightward(),
            ParticipantSpec::new(ParticipantIdentifier::Phone("+15550100".into()), "bo"),
        ],
        PaymentTier::One,
    )
    .unwrap()
}
