//! In-memory store for tests
//!
//! Same conditional-write and change-feed semantics as the SQLite store, plus
//! failure injection and a write log for assertions.

use super::{
    record_type_of, ChangeKind, MessageStore, Precondition, RecordChange, RecordStore, StoreError,
    Version, VersionedRecord, WriteOutcome,
};
use crate::reconcile::merge_messages;
use crate::room::Message;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};

#[derive(Clone)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<String, VersionedRecord>>>,
    messages: Arc<Mutex<HashMap<String, Vec<Message>>>>,
    observers: Arc<Mutex<HashMap<String, watch::Sender<Vec<Message>>>>>,
    changes: broadcast::Sender<RecordChange>,
    fail_prefixes: Arc<Mutex<Vec<String>>>,
    writes: Arc<Mutex<Vec<(String, Precondition)>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            records: Arc::default(),
            messages: Arc::default(),
            observers: Arc::default(),
            changes,
            fail_prefixes: Arc::default(),
            writes: Arc::default(),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on keys with this prefix fail
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.fail_prefixes.lock().expect("lock").push(prefix.into());
    }

    pub fn clear_failures(&self) {
        self.fail_prefixes.lock().expect("lock").clear();
    }

    /// Conditional writes attempted so far, including conflicts
    pub fn writes(&self) -> Vec<(String, Precondition)> {
        self.writes.lock().expect("lock").clone()
    }

    /// Current value of a record, bypassing failure injection
    pub fn value(&self, key: &str) -> Option<Value> {
        self.records.lock().expect("lock").get(key).map(|r| r.value.clone())
    }

    pub fn versioned(&self, key: &str) -> Option<VersionedRecord> {
        self.records.lock().expect("lock").get(key).cloned()
    }

    /// Overwrite a record as if another device had written it
    pub fn put_remote(&self, key: &str, value: Value) -> Version {
        let mut records = self.records.lock().expect("lock");
        let version = records.get(key).map_or(1, |r| r.version + 1);
        let kind = if version == 1 {
            ChangeKind::Inserted
        } else {
            ChangeKind::Updated
        };
        records.insert(
            key.to_string(),
            VersionedRecord {
                value: value.clone(),
                version,
            },
        );
        drop(records);
        self.publish(kind, key, value, version);
        version
    }

    fn check_failure(&self, key: &str) -> Result<(), StoreError> {
        let prefixes = self.fail_prefixes.lock().expect("lock");
        if prefixes.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(StoreError::Backend(format!("injected failure for {key}")));
        }
        Ok(())
    }

    fn publish(&self, kind: ChangeKind, key: &str, payload: Value, version: Version) {
        // No subscribers is fine
        let _ = self.changes.send(RecordChange {
            kind,
            record_type: record_type_of(key).to_string(),
            key: key.to_string(),
            payload,
            version,
        });
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<VersionedRecord>, StoreError> {
        self.check_failure(key)?;
        Ok(self.records.lock().expect("lock").get(key).cloned())
    }

    async fn conditional_write(
        &self,
        key: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<WriteOutcome, StoreError> {
        self.check_failure(key)?;
        self.writes
            .lock()
            .expect("lock")
            .push((key.to_string(), precondition));

        let mut records = self.records.lock().expect("lock");
        let current = records.get(key).map(|r| r.version);

        let (kind, version) = match (precondition, current) {
            (Precondition::DoesNotExist, None) => (ChangeKind::Inserted, 1),
            (Precondition::MatchesVersion(expected), Some(actual)) if expected == actual => {
                (ChangeKind::Updated, actual + 1)
            }
            _ => return Ok(WriteOutcome::Conflict { current }),
        };

        records.insert(
            key.to_string(),
            VersionedRecord {
                value: value.clone(),
                version,
            },
        );
        drop(records);

        self.publish(kind, key, value, version);
        Ok(WriteOutcome::Written { version })
    }

    async fn list(&self, record_type: &str) -> Result<Vec<(String, VersionedRecord)>, StoreError> {
        self.check_failure(record_type)?;
        Ok(self
            .records
            .lock()
            .expect("lock")
            .iter()
            .filter(|(key, _)| record_type_of(key) == record_type)
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save(&self, message: &Message) -> Result<(), StoreError> {
        self.check_failure(&format!("messages/{}", message.room_id))?;

        let merged = {
            let mut messages = self.messages.lock().expect("lock");
            let room = messages.entry(message.room_id.clone()).or_default();
            *room = merge_messages(room, std::slice::from_ref(message));
            room.clone()
        };

        if let Some(sender) = self.observers.lock().expect("lock").get(&message.room_id) {
            sender.send_replace(merged);
        }
        Ok(())
    }

    async fn fetch_messages(&self, room_id: &str) -> Result<Vec<Message>, StoreError> {
        self.check_failure(&format!("messages/{room_id}"))?;
        Ok(self
            .messages
            .lock()
            .expect("lock")
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }

    fn observe(&self, room_id: &str) -> watch::Receiver<Vec<Message>> {
        let current = self
            .messages
            .lock()
            .expect("lock")
            .get(room_id)
            .cloned()
            .unwrap_or_default();
        self.observers
            .lock()
            .expect("lock")
            .entry(room_id.to_string())
            .or_insert_with(|| watch::channel(current).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_conditional_write_semantics() {
        let store = MemoryStore::new();

        let first = store
            .conditional_write("room/a", json!(1), Precondition::DoesNotExist)
            .await
            .unwrap();
        assert_eq!(first, WriteOutcome::Written { version: 1 });

        let again = store
            .conditional_write("room/a", json!(2), Precondition::DoesNotExist)
            .await
            .unwrap();
        assert_eq!(again, WriteOutcome::Conflict { current: Some(1) });

        let stale = store
            .conditional_write("room/a", json!(2), Precondition::MatchesVersion(7))
            .await
            .unwrap();
        assert_eq!(stale, WriteOutcome::Conflict { current: Some(1) });

        let ok = store
            .conditional_write("room/a", json!(2), Precondition::MatchesVersion(1))
            .await
            .unwrap();
        assert_eq!(ok, WriteOutcome::Written { version: 2 });

        let missing = store
            .conditional_write("room/b", json!(2), Precondition::MatchesVersion(1))
            .await
            .unwrap();
        assert_eq!(missing, WriteOutcome::Conflict { current: None });

        assert_eq!(store.read("room/a").await.unwrap().unwrap().value, json!(2));
    }

    #[tokio::test]
    async fn test_change_feed_reports_writes() {
        let store = MemoryStore::new();
        let mut changes = store.changes();

        store
            .conditional_write("room/a", json!({"x": 1}), Precondition::DoesNotExist)
            .await
            .unwrap();
        store.put_remote("room/a", json!({"x": 2}));

        let inserted = changes.recv().await.unwrap();
        assert_eq!(inserted.kind, ChangeKind::Inserted);
        assert_eq!(inserted.record_type, "room");
        let updated = changes.recv().await.unwrap();
        assert_eq!(updated.kind, ChangeKind::Updated);
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryStore::new();
        store.inject_failure("room/");
        assert!(matches!(
            store.read("room/a").await,
            Err(StoreError::Backend(_))
        ));

        store.clear_failures();
        assert!(store.read("room/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_observe_sees_saves() {
        let store = MemoryStore::new();
        let rx = store.observe("r1");
        assert!(rx.borrow().is_empty());

        let message = Message::speech("r1", "ada", "hello");
        store.save(&message).await.unwrap();
        store.save(&message).await.unwrap();

        assert_eq!(rx.borrow().len(), 1);
        assert_eq!(store.fetch_messages("r1").await.unwrap(), vec![message]);
    }
}
