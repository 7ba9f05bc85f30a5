//! Participant identity resolution
//!
//! Maps a roster entry to the user id that will be invited. Lightward has no
//! user id and resolves to `None`.

use crate::db::{ContactKind, Database};
use crate::room::{ParticipantIdentifier, ParticipantSpec};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no user with that identifier")]
    NotFound,
    #[error("user is not discoverable")]
    NotDiscoverable,
    #[error("resolution network error: {0}")]
    Network(String),
}

#[async_trait]
pub trait ParticipantResolver: Send + Sync {
    async fn resolve(&self, participant: &ParticipantSpec) -> Result<Option<String>, ResolutionError>;

    /// Resolve in roster order, stopping at the first failure. The error names
    /// the participant that failed.
    async fn resolve_all(
        &self,
        participants: &[ParticipantSpec],
    ) -> Result<Vec<Option<String>>, (String, ResolutionError)> {
        let mut resolved = Vec::with_capacity(participants.len());
        for participant in participants {
            match self.resolve(participant).await {
                Ok(user) => resolved.push(user),
                Err(e) => return Err((participant.id.clone(), e)),
            }
        }
        Ok(resolved)
    }
}

/// Resolves email and phone identifiers through the local contact directory
pub struct DirectoryResolver {
    db: Database,
    local_user_id: String,
}

impl DirectoryResolver {
    pub fn new(db: Database, local_user_id: impl Into<String>) -> Self {
        Self {
            db,
            local_user_id: local_user_id.into(),
        }
    }
}

#[async_trait]
impl ParticipantResolver for DirectoryResolver {
    async fn resolve(&self, participant: &ParticipantSpec) -> Result<Option<String>, ResolutionError> {
        let (kind, value) = match &participant.identifier {
            ParticipantIdentifier::Lightward => return Ok(None),
            ParticipantIdentifier::LocalUser => return Ok(Some(self.local_user_id.clone())),
            other => ContactKind::of(other).ok_or(ResolutionError::NotFound)?,
        };

        let contact = self
            .db
            .find_contact(kind, value)
            .map_err(|e| ResolutionError::Network(e.to_string()))?
            .ok_or(ResolutionError::NotFound)?;

        if !contact.discoverable {
            tracing::debug!(participant_id = %participant.id, "Participant is not discoverable");
            return Err(ResolutionError::NotDiscoverable);
        }
        Ok(Some(contact.user_id))
    }
}
