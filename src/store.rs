//! Replicated store ports
//!
//! The backing store is a key/value record store with conditional writes and
//! a change feed, plus an append-only message log per room. Replication
//! itself happens behind these traits.

#[cfg(test)]
pub mod memory;

use crate::room::Message;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

/// Monotonic per-key version. The first write of a key is version 1.
pub type Version = u64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("record codec error: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// Precondition for a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Write only if the key has never been written
    DoesNotExist,
    /// Write only if the stored version is exactly this one
    MatchesVersion(Version),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { version: Version },
    /// Precondition failed. `current` is `None` when the key does not exist.
    Conflict { current: Option<Version> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    pub value: Value,
    pub version: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
}

/// One entry of the change feed
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub kind: ChangeKind,
    pub record_type: String,
    pub key: String,
    pub payload: Value,
    pub version: Version,
}

/// Record type of a key: the segment before the first `/`
pub fn record_type_of(key: &str) -> &str {
    key.split_once('/').map_or(key, |(record_type, _)| record_type)
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<VersionedRecord>, StoreError>;

    async fn conditional_write(
        &self,
        key: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<WriteOutcome, StoreError>;

    /// All records of one type, keyed
    async fn list(&self, record_type: &str) -> Result<Vec<(String, VersionedRecord)>, StoreError>;

    /// Subscribe to every successful write from now on
    fn changes(&self) -> broadcast::Receiver<RecordChange>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message. Saving an id that already exists is a no-op.
    async fn save(&self, message: &Message) -> Result<(), StoreError>;

    /// All messages of a room ordered by (created_at, id)
    async fn fetch_messages(&self, room_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Live view of a room's messages. The receiver starts at the current list.
    fn observe(&self, room_id: &str) -> watch::Receiver<Vec<Message>>;
}
