//! Plain-text completion endpoint over HTTP
//!
//! Request: JSON `{"messages": [{"role", "content": [{"type": "text", "text"}]}]}`.
//! Response: the reply as plain text. Status 422 means the conversation has
//! reached its horizon and the body is the farewell.

use super::{CompletionError, CompletionRequest, CompletionService, TranscriptBlock};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_COMPLETION_URL: &str = "https://lightward.com/api/plain";

pub struct HttpCompletionService {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpCompletionService {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    fn translate_request(request: &CompletionRequest) -> WireRequest<'_> {
        WireRequest {
            messages: request.transcript.iter().map(WireMessage::from).collect(),
        }
    }
}

fn classify_error(status: StatusCode, body: &str) -> CompletionError {
    match status.as_u16() {
        422 => CompletionError::Horizon {
            farewell: body.trim().to_string(),
        },
        401 | 403 => CompletionError::auth(format!("Authentication failed: {body}")),
        429 => CompletionError::rate_limit(format!("Rate limited: {body}")),
        400 => CompletionError::invalid_request(format!("Invalid request: {body}")),
        500..=599 => CompletionError::server_error(format!("Server error: {body}")),
        _ => CompletionError::unknown(format!("HTTP {status}: {body}")),
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    async fn respond(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut builder = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .json(&Self::translate_request(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                CompletionError::network(format!("Connection failed: {e}"))
            } else {
                CompletionError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }
        Ok(body)
    }

    fn name(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: super::Role,
    content: [WireContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    r#type: &'static str,
    text: &'a str,
}

impl<'a> From<&'a TranscriptBlock> for WireMessage<'a> {
    fn from(block: &'a TranscriptBlock) -> Self {
        Self {
            role: block.role,
            content: [WireContent {
                r#type: "text",
                text: &block.text,
            }],
        }
    }
}
