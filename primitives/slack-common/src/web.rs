//! Outbound messages via the Slack Web API.

use crate::SlackError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// A single message attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub text: String,
}

/// Body of a `chat.postMessage` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundResponse {
    pub channel: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl OutboundResponse {
    /// Puts `output` both in the message body and in one attachment.
    pub fn with_attachment_echo(channel: impl Into<String>, output: impl Into<String>) -> Self {
        let text = output.into();
        Self {
            channel: channel.into(),
            attachments: vec![Attachment { text: text.clone() }],
            text,
        }
    }
}

/// Accepts outbound responses.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn post(&self, response: &OutboundResponse) -> Result<(), SlackError>;
}

/// Slack API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    error: Option<String>,
    ts: Option<String>,
}

/// Posts messages with a bot token.
#[derive(Debug, Clone)]
pub struct SlackWebClient {
    client: Client,
    token: String,
    api_base: String,
}

impl SlackWebClient {
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            api_base: api_base.into(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl MessageSink for SlackWebClient {
    async fn post(&self, response: &OutboundResponse) -> Result<(), SlackError> {
        let reply = self
            .client
            .post(self.endpoint("chat.postMessage"))
            .bearer_auth(&self.token)
            .json(response)
            .send()
            .await?;

        if !reply.status().is_success() {
            return Err(SlackError::Status(reply.status()));
        }

        let body: ApiResponse = reply.json().await?;
        if !body.ok {
            return Err(SlackError::Api(
                body.error.unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        tracing::debug!(
            channel = %response.channel,
            ts = body.ts.as_deref().unwrap_or_default(),
            "posted message"
        );

        Ok(())
    }
}
