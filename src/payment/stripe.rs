//! Stripe manual-capture PaymentIntents
//!
//! authorize = create + confirm with `capture_method=manual`, capture and
//! release map to the intent's `/capture` and `/cancel` endpoints.

use super::{Authorization, PaymentError, PaymentProcessor};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.stripe.com/v1";

/// Uncaptured card authorizations lapse after seven days
const AUTHORIZATION_LIFETIME_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_key: String,
    /// Saved payment method charged for rooms created on this device
    pub payment_method: String,
    pub api_base: String,
}

impl StripeConfig {
    /// `None` when `STRIPE_API_KEY` is unset
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("STRIPE_API_KEY").ok().filter(|k| !k.is_empty())?;
        let payment_method =
            std::env::var("STRIPE_PAYMENT_METHOD").unwrap_or_else(|_| "pm_card_visa".to_string());
        let api_base =
            std::env::var("STRIPE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        Some(Self {
            api_key,
            payment_method,
            api_base,
        })
    }
}

pub struct StripePaymentProcessor {
    client: Client,
    config: StripeConfig,
}

impl StripePaymentProcessor {
    pub fn new(config: StripeConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, form: &[(&str, String)]) -> Result<IntentResponse, PaymentError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .form(form)
            .send()
            .await
            .map_err(|e| PaymentError::Network(format!("Request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| PaymentError::Network(format!("Failed to parse response: {e}")))
    }
}

fn classify_error(status: StatusCode, body: &str) -> PaymentError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| body.to_string());

    match status.as_u16() {
        402 => PaymentError::Declined(message),
        _ => PaymentError::Network(format!("HTTP {status}: {message}")),
    }
}

#[async_trait]
impl PaymentProcessor for StripePaymentProcessor {
    async fn authorize(&self, cents: u64) -> Result<Authorization, PaymentError> {
        let form = [
            ("amount", cents.to_string()),
            ("currency", "usd".to_string()),
            ("capture_method", "manual".to_string()),
            ("confirm", "true".to_string()),
            ("payment_method", self.config.payment_method.clone()),
        ];
        let intent = self.post("payment_intents", &form).await?;

        if intent.status != "requires_capture" {
            return Err(PaymentError::Declined(format!(
                "payment intent {} is {}",
                intent.id, intent.status
            )));
        }

        tracing::info!(authorization_id = %intent.id, cents, "Payment authorized");
        Ok(Authorization {
            id: intent.id,
            cents,
            expires_at: Utc::now() + chrono::Duration::days(AUTHORIZATION_LIFETIME_DAYS),
        })
    }

    async fn capture(&self, authorization: &Authorization) -> Result<(), PaymentError> {
        if authorization.expires_at <= Utc::now() {
            return Err(PaymentError::Expired);
        }

        let path = format!("payment_intents/{}/capture", authorization.id);
        let intent = self.post(&path, &[]).await?;

        match intent.status.as_str() {
            "succeeded" => {
                tracing::info!(authorization_id = %authorization.id, "Payment captured");
                Ok(())
            }
            "canceled" => Err(PaymentError::Cancelled),
            other => Err(PaymentError::Declined(format!("capture left intent {other}"))),
        }
    }

    async fn release(&self, authorization: &Authorization) {
        let path = format!("payment_intents/{}/cancel", authorization.id);
        match self.post(&path, &[]).await {
            Ok(_) => tracing::info!(authorization_id = %authorization.id, "Authorization released"),
            Err(e) => {
                tracing::warn!(authorization_id = %authorization.id, error = %e, "Failed to release authorization");
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}
