//! Collaborators shared by every room on this device

use crate::claim::AtomicClaim;
use crate::lifecycle::RoomState;
use crate::llm::{CompletionService, LightwardOracle};
use crate::payment::PaymentProcessor;
use crate::resolver::ParticipantResolver;
use crate::room::RoomRecord;
use crate::store::{MessageStore, Precondition, RecordStore, StoreError, Version, WriteOutcome};
use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub device_id: String,
    pub records: Arc<dyn RecordStore>,
    pub messages: Arc<dyn MessageStore>,
    pub resolver: Arc<dyn ParticipantResolver>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub oracle: Arc<dyn LightwardOracle>,
    pub completion: Arc<dyn CompletionService>,
    pub claim: AtomicClaim,
}

/// Outcome of saving a room record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Someone else wrote first; the local copy must be refreshed
    Conflict,
}

/// One room's record in the store plus the last version this device has
/// seen. Writes are conditional on that version.
pub struct RecordHandle {
    store: Arc<dyn RecordStore>,
    key: String,
    version: Option<Version>,
}

impl RecordHandle {
    /// A room not yet written anywhere
    pub fn new(store: Arc<dyn RecordStore>, room_id: &str) -> Self {
        Self {
            store,
            key: RoomRecord::key(room_id),
            version: None,
        }
    }

    pub fn at_version(store: Arc<dyn RecordStore>, room_id: &str, version: Version) -> Self {
        Self {
            store,
            key: RoomRecord::key(room_id),
            version: Some(version),
        }
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Note a version seen on the change feed. Versions never go backwards.
    pub fn observe(&mut self, version: Version) {
        self.version = Some(self.version.map_or(version, |v| v.max(version)));
    }

    pub async fn save(&mut self, record: &RoomRecord) -> Result<SaveOutcome, StoreError> {
        let precondition = self
            .version
            .map_or(Precondition::DoesNotExist, Precondition::MatchesVersion);

        match self
            .store
            .conditional_write(&self.key, record.to_value()?, precondition)
            .await?
        {
            WriteOutcome::Written { version } => {
                tracing::debug!(
                    key = %self.key,
                    version,
                    state = record.state.tag(),
                    "Room record saved"
                );
                self.version = Some(version);
                Ok(SaveOutcome::Saved)
            }
            WriteOutcome::Conflict { current } => {
                tracing::info!(key = %self.key, expected = ?self.version, ?current, "Room record write conflict");
                Ok(SaveOutcome::Conflict)
            }
        }
    }

    /// Read the stored record and adopt its version. Undecodable records
    /// read as absent.
    pub async fn fetch(&mut self) -> Result<Option<RoomRecord>, StoreError> {
        let Some(stored) = self.store.read(&self.key).await? else {
            return Ok(None);
        };
        let record = RoomRecord::from_value(stored.value);
        if record.is_some() {
            self.observe(stored.version);
        }
        Ok(record)
    }
}

/// Remote state that must replace local progress rather than be overwritten
/// by it
pub fn remote_supersedes(local: &RoomState, remote: &RoomState) -> bool {
    remote.is_terminal() || remote.progress() > local.progress()
}
