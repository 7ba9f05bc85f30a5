//! SQLite persistence
//!
//! Implements the record store (conditional writes + change feed), the
//! per-room message log and the contact directory on one connection.

mod schema;

pub use schema::*;

use crate::room::{Message, MessageKind};
use crate::store::{
    record_type_of, ChangeKind, MessageStore, Precondition, RecordChange, RecordStore, StoreError,
    Version, VersionedRecord, WriteOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{broadcast, watch};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid JSON in database: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Json(e) => StoreError::Codec(e.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<RecordChange>,
    observers: Arc<Mutex<HashMap<String, watch::Sender<Vec<Message>>>>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        // Databases created before messages carried a turn index; fails
        // harmlessly once the column exists
        let _ = conn.execute("ALTER TABLE messages ADD COLUMN turn_index INTEGER", []);
        let (changes, _) = broadcast::channel(256);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
            observers: Arc::default(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Record Operations ====================

    pub fn read_record(&self, key: &str) -> DbResult<Option<VersionedRecord>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT value, version FROM records WHERE key = ?1",
                params![key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        row.map(|(value, version)| decode_record(&value, version))
            .transpose()
    }

    /// Write `value` under `key` if `precondition` holds. The version check and
    /// the write happen under one lock.
    pub fn write_record(
        &self,
        key: &str,
        value: &Value,
        precondition: Precondition,
    ) -> DbResult<WriteOutcome> {
        let conn = self.conn();
        let json = serde_json::to_string(value)?;
        let now = format_datetime(Utc::now());

        let written = match precondition {
            Precondition::DoesNotExist => conn.execute(
                "INSERT INTO records (key, record_type, value, version, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4)
                 ON CONFLICT(key) DO NOTHING",
                params![key, record_type_of(key), json, now],
            )?,
            Precondition::MatchesVersion(expected) => conn.execute(
                "UPDATE records SET value = ?1, version = version + 1, updated_at = ?2
                 WHERE key = ?3 AND version = ?4",
                params![json, now, key, to_sql_version(expected)?],
            )?,
        };

        let current = conn
            .query_row(
                "SELECT version FROM records WHERE key = ?1",
                params![key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(from_sql_version)
            .transpose()?;
        drop(conn);

        match (written, current) {
            (0, current) => Ok(WriteOutcome::Conflict { current }),
            (_, Some(version)) => {
                let kind = match precondition {
                    Precondition::DoesNotExist => ChangeKind::Inserted,
                    Precondition::MatchesVersion(_) => ChangeKind::Updated,
                };
                // No subscribers is fine
                let _ = self.changes.send(RecordChange {
                    kind,
                    record_type: record_type_of(key).to_string(),
                    key: key.to_string(),
                    payload: value.clone(),
                    version,
                });
                Ok(WriteOutcome::Written { version })
            }
            (_, None) => Err(DbError::InvalidRow(format!("record {key} vanished after write"))),
        }
    }

    pub fn list_records(&self, record_type: &str) -> DbResult<Vec<(String, VersionedRecord)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, value, version FROM records WHERE record_type = ?1 ORDER BY updated_at",
        )?;
        let rows = stmt
            .query_map(params![record_type], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, value, version)| Ok((key, decode_record(&value, version)?)))
            .collect()
    }

    // ==================== Message Operations ====================

    /// Insert a message. Returns false if the id was already stored.
    pub fn insert_message(&self, message: &Message) -> DbResult<bool> {
        let turn_index = message
            .turn_index
            .map(i64::try_from)
            .transpose()
            .map_err(|_| DbError::InvalidRow(format!("message {} turn index too large", message.id)))?;
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO messages (id, room_id, kind, author_id, text, created_at, turn_index)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO NOTHING",
            params![
                message.id,
                message.room_id,
                message.kind.as_str(),
                message.author_id,
                message.text,
                format_datetime(message.created_at),
                turn_index,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Messages for a room, ordered by (created_at, id)
    pub fn get_messages(&self, room_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, room_id, kind, author_id, text, created_at, turn_index
             FROM messages WHERE room_id = ?1
             ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![room_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, room_id, kind, author_id, text, created_at, turn_index)| {
                let kind = MessageKind::parse(&kind)
                    .ok_or_else(|| DbError::InvalidRow(format!("message {id} has kind {kind}")))?;
                let turn_index = turn_index
                    .map(u64::try_from)
                    .transpose()
                    .map_err(|_| DbError::InvalidRow(format!("message {id} has a negative turn index")))?;
                Ok(Message {
                    id,
                    room_id,
                    kind,
                    author_id,
                    text,
                    created_at: parse_datetime(&created_at)?,
                    turn_index,
                })
            })
            .collect()
    }

    // ==================== Contact Operations ====================

    pub fn upsert_contact(&self, contact: &Contact) -> DbResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO contacts (identifier_type, identifier, user_id, discoverable)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(identifier_type, identifier)
             DO UPDATE SET user_id = excluded.user_id, discoverable = excluded.discoverable",
            params![
                contact.kind.as_str(),
                normalize_identifier(contact.kind, &contact.identifier),
                contact.user_id,
                contact.discoverable,
            ],
        )?;
        Ok(())
    }

    pub fn find_contact(&self, kind: ContactKind, identifier: &str) -> DbResult<Option<Contact>> {
        let normalized = normalize_identifier(kind, identifier);
        let conn = self.conn();
        let found = conn
            .query_row(
                "SELECT user_id, discoverable FROM contacts
                 WHERE identifier_type = ?1 AND identifier = ?2",
                params![kind.as_str(), normalized],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
            )
            .optional()?;

        Ok(found.map(|(user_id, discoverable)| Contact {
            kind,
            identifier: normalized,
            user_id,
            discoverable,
        }))
    }

    fn notify_observers(&self, room_id: &str) -> DbResult<()> {
        let sender = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .cloned();
        if let Some(sender) = sender {
            sender.send_replace(self.get_messages(room_id)?);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn read(&self, key: &str) -> Result<Option<VersionedRecord>, StoreError> {
        Ok(self.read_record(key)?)
    }

    async fn conditional_write(
        &self,
        key: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<WriteOutcome, StoreError> {
        Ok(self.write_record(key, &value, precondition)?)
    }

    async fn list(&self, record_type: &str) -> Result<Vec<(String, VersionedRecord)>, StoreError> {
        Ok(self.list_records(record_type)?)
    }

    fn changes(&self) -> broadcast::Receiver<RecordChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl MessageStore for Database {
    async fn save(&self, message: &Message) -> Result<(), StoreError> {
        if self.insert_message(message)? {
            self.notify_observers(&message.room_id)?;
        }
        Ok(())
    }

    async fn fetch_messages(&self, room_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self.get_messages(room_id)?)
    }

    fn observe(&self, room_id: &str) -> watch::Receiver<Vec<Message>> {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = observers.get(room_id) {
            return sender.subscribe();
        }

        let initial = self.get_messages(room_id).unwrap_or_else(|e| {
            tracing::warn!(room_id, error = %e, "Failed to load messages for observer");
            Vec::new()
        });
        let (sender, receiver) = watch::channel(initial);
        observers.insert(room_id.to_string(), sender);
        receiver
    }
}

fn decode_record(value: &str, version: i64) -> DbResult<VersionedRecord> {
    Ok(VersionedRecord {
        value: serde_json::from_str(value)?,
        version: from_sql_version(version)?,
    })
}

fn to_sql_version(version: Version) -> DbResult<i64> {
    i64::try_from(version).map_err(|_| DbError::InvalidRow(format!("version {version} too large")))
}

fn from_sql_version(version: i64) -> DbResult<Version> {
    Version::try_from(version).map_err(|_| DbError::InvalidRow(format!("negative version {version}")))
}

/// Fixed-width so lexical order in SQL matches time order
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_datetime(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::InvalidRow(format!("bad timestamp {s}: {e}")))
}
