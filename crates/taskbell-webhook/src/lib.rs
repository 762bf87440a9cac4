// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic HTTP webhook channel transport.
//!
//! Each message is POSTed as JSON to the channel's `url` setting. An optional
//! `secret` setting is sent as a bearer token and `header.<Name>` settings
//! become extra request headers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use taskbell_core::{
    ChannelConfig, ChannelStrategy, ChannelTransport, ChannelType, Embed, ManagedChannel, Message,
    NotificationError, Priority,
};
use tracing::debug;

const HEADER_PREFIX: &str = "header.";

/// JSON body of a webhook delivery.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<&'a str>,
    pub content: &'a str,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<&'a Embed>,
    #[serde(skip_serializing_if = "is_empty")]
    pub metadata: &'a HashMap<String, serde_json::Value>,
}

fn is_empty(map: &&HashMap<String, serde_json::Value>) -> bool {
    map.is_empty()
}

impl<'a> From<&'a Message> for WebhookPayload<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            id: &message.id.0,
            subject: message.payload.subject.as_deref(),
            content: &message.payload.content,
            priority: message.payload.priority,
            timestamp: message.payload.timestamp,
            destination: message.options.destination.as_deref(),
            embed: message.payload.embed.as_ref(),
            metadata: &message.metadata,
        }
    }
}

/// POSTs messages to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookTransport {
    client: reqwest::Client,
    url: Url,
    label: String,
}

impl WebhookTransport {
    pub fn from_config(config: &ChannelConfig) -> Result<Self, NotificationError> {
        let invalid = |detail: String| {
            NotificationError::InvalidConfig(format!("webhook channel `{}`: {detail}", config.id))
        };

        let raw_url = config
            .setting("url")
            .ok_or_else(|| invalid("missing `url` setting".to_string()))?;
        let url = Url::parse(raw_url).map_err(|e| invalid(format!("invalid url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported url scheme `{}`", url.scheme())));
        }

        let mut headers = HeaderMap::new();
        if let Some(secret) = config.setting("secret") {
            let value = HeaderValue::from_str(&format!("Bearer {secret}"))
                .map_err(|e| invalid(format!("invalid secret: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        for (key, value) in &config.settings {
            let Some(name) = key.strip_prefix(HEADER_PREFIX) else {
                continue;
            };
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| invalid(format!("invalid header name `{name}`: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| invalid(format!("invalid value for header `{name}`: {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| NotificationError::ChannelCreation {
                channel_id: config.id.clone(),
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            url,
            label: config.id.clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn status_error(&self, message: &Message, status: StatusCode, body: String) -> NotificationError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => NotificationError::ProviderAuth {
                provider_id: "webhook".to_string(),
                message: format!("{} rejected credentials ({status})", self.label),
            },
            StatusCode::TOO_MANY_REQUESTS => NotificationError::RateLimitExceeded {
                scope: format!("webhook {}", self.label),
                limit: 0,
                window: "remote",
            },
            _ => NotificationError::MessageSend {
                message: format!("webhook returned {status}: {body}"),
                channel_id: Some(self.label.clone()),
                message_id: Some(message.id.0.clone()),
                attempts: None,
                source: None,
            },
        }
    }
}

#[async_trait]
impl ChannelTransport for WebhookTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn connect(&self) -> Result<(), NotificationError> {
        self.ping().await
    }

    async fn deliver(&self, message: &Message) -> Result<Option<String>, NotificationError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&WebhookPayload::from(message))
            .send()
            .await
            .map_err(|e| NotificationError::MessageSend {
                message: format!("webhook request failed: {e}"),
                channel_id: Some(self.label.clone()),
                message_id: Some(message.id.0.clone()),
                attempts: None,
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(channel_id = %self.label, status = %status, "webhook response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_error(message, status, body));
        }
        Ok(response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    /// Any response below 500 means the endpoint is reachable; many webhook
    /// receivers answer HEAD with 404 or 405.
    async fn ping(&self) -> Result<(), NotificationError> {
        let response = self
            .client
            .head(self.url.clone())
            .send()
            .await
            .map_err(|e| NotificationError::ChannelUnavailable {
                message: format!("webhook connection failed: {e}"),
                channel_id: Some(self.label.clone()),
            })?;
        if response.status().is_server_error() {
            return Err(NotificationError::ChannelUnavailable {
                message: format!("webhook endpoint returned {}", response.status()),
                channel_id: Some(self.label.clone()),
            });
        }
        Ok(())
    }
}

/// Builds a managed webhook channel; used as the webhook channel factory.
pub fn build_channel(config: &ChannelConfig) -> Result<Arc<dyn ChannelStrategy>, NotificationError> {
    let transport = WebhookTransport::from_config(config)?;
    let channel = ManagedChannel::new(config.clone(), transport)?;
    Ok(Arc::new(channel) as Arc<dyn ChannelStrategy>)
}
