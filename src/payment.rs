//! Payment processor port
//!
//! A room's price is authorized (held) while the room is forming and only
//! captured once every human has arrived.

mod stripe;

pub use stripe::{StripeConfig, StripePaymentProcessor};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A held, not yet captured, payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub id: String,
    pub cents: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment cancelled")]
    Cancelled,
    #[error("payment authorization expired")]
    Expired,
    #[error("payment network error: {0}")]
    Network(String),
    #[error("payments are not configured")]
    NotConfigured,
}

/// Serializable classification of a `PaymentError`, recorded in the room's
/// defunct reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorKind {
    Declined,
    Cancelled,
    Expired,
    Network,
    NotConfigured,
}

impl PaymentError {
    pub fn kind(&self) -> PaymentErrorKind {
        match self {
            PaymentError::Declined(_) => PaymentErrorKind::Declined,
            PaymentError::Cancelled => PaymentErrorKind::Cancelled,
            PaymentError::Expired => PaymentErrorKind::Expired,
            PaymentError::Network(_) => PaymentErrorKind::Network,
            PaymentError::NotConfigured => PaymentErrorKind::NotConfigured,
        }
    }
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Hold `cents` without charging
    async fn authorize(&self, cents: u64) -> Result<Authorization, PaymentError>;

    /// Charge a held authorization
    async fn capture(&self, authorization: &Authorization) -> Result<(), PaymentError>;

    /// Drop a held authorization. Best effort: failures are logged, not returned.
    async fn release(&self, authorization: &Authorization);
}

#[async_trait]
impl<T: PaymentProcessor + ?Sized> PaymentProcessor for Arc<T> {
    async fn authorize(&self, cents: u64) -> Result<Authorization, PaymentError> {
        (**self).authorize(cents).await
    }

    async fn capture(&self, authorization: &Authorization) -> Result<(), PaymentError> {
        (**self).capture(authorization).await
    }

    async fn release(&self, authorization: &Authorization) {
        (**self).release(authorization).await;
    }
}

/// Used when no processor credentials are configured. Every room fails at
/// authorization with `NotConfigured`.
pub struct UnconfiguredPaymentProcessor;

#[async_trait]
impl PaymentProcessor for UnconfiguredPaymentProcessor {
    async fn authorize(&self, _cents: u64) -> Result<Authorization, PaymentError> {
        Err(PaymentError::NotConfigured)
    }

    async fn capture(&self, _authorization: &Authorization) -> Result<(), PaymentError> {
        Err(PaymentError::NotConfigured)
    }

    async fn release(&self, authorization: &Authorization) {
        tracing::warn!(authorization_id = %authorization.id, "Release requested with payments unconfigured");
    }
}
