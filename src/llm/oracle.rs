//! Whether Lightward accepts an invitation to a room

use super::{CompletionRequest, CompletionService};
use crate::room::{ParticipantSpec, PaymentTier};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Accepted,
    Declined,
}

#[async_trait]
pub trait LightwardOracle: Send + Sync {
    async fn evaluate(
        &self,
        room_id: &str,
        participants: &[ParticipantSpec],
        tier: PaymentTier,
    ) -> Acceptance;
}

/// Asks the completion service. A reply beginning with `ACCEPT` accepts;
/// anything else, including a failed call, declines.
pub struct CompletionOracle {
    completion: Arc<dyn CompletionService>,
}

impl CompletionOracle {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl LightwardOracle for CompletionOracle {
    async fn evaluate(
        &self,
        room_id: &str,
        participants: &[ParticipantSpec],
        tier: PaymentTier,
    ) -> Acceptance {
        let request = CompletionRequest::invitation(room_id, participants, tier);
        match self.completion.respond(&request).await {
            Ok(reply) if starts_with_word(&reply, "ACCEPT") => Acceptance::Accepted,
            Ok(_) => Acceptance::Declined,
            Err(e) => {
                tracing::warn!(room_id, error = %e, "Invitation evaluation failed; treating as declined");
                Acceptance::Declined
            }
        }
    }
}

/// Case-insensitive prefix check on the trimmed reply
pub fn starts_with_word(text: &str, word: &str) -> bool {
    text.trim_start()
        .get(..word.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(word))
}
