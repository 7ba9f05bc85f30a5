//! Completion service abstraction
//!
//! Lightward's voice comes from a single completion endpoint. Everything the
//! room needs from it (turns, hand-raise checks, invitations) is a
//! `CompletionRequest` answered with plain text.

mod error;
mod http;
mod oracle;
mod types;

pub use error::{CompletionError, CompletionErrorKind};
pub use http::{HttpCompletionService, DEFAULT_COMPLETION_URL};
pub use oracle::{starts_with_word, Acceptance, CompletionOracle, LightwardOracle};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn respond(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Identifies the backend in logs
    fn name(&self) -> &str;
}

/// Logging wrapper for completion services
pub struct LoggingCompletionService {
    inner: Arc<dyn CompletionService>,
    name: String,
}

impl LoggingCompletionService {
    pub fn new(inner: Arc<dyn CompletionService>) -> Self {
        let name = inner.name().to_string();
        Self { inner, name }
    }
}

#[async_trait]
impl CompletionService for LoggingCompletionService {
    async fn respond(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let start = std::time::Instant::now();
        let result = self.inner.respond(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    service = %self.name,
                    room_id = %request.room_id,
                    purpose = request.purpose.as_str(),
                    duration_ms = %duration.as_millis(),
                    reply_chars = reply.chars().count(),
                    "Completion request completed"
                );
            }
            Err(CompletionError::Horizon { .. }) => {
                tracing::info!(
                    service = %self.name,
                    room_id = %request.room_id,
                    duration_ms = %duration.as_millis(),
                    "Completion reached horizon"
                );
            }
            Err(e) => {
                tracing::error!(
                    service = %self.name,
                    room_id = %request.room_id,
                    purpose = request.purpose.as_str(),
                    duration_ms = %duration.as_millis(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "Completion request failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}
