// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification provider trait, implemented by providers and their decorators.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::NotificationError;
use crate::message::{DeliveryOptions, Message};
use crate::template::Template;
use crate::types::{ChannelConfig, DeliveryReceipt, ProviderConfig, ProviderHealth, ProviderMetrics};

/// Credentials presented to a provider on initialization.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderAuth {
    pub token: Option<String>,
    pub properties: HashMap<String, String>,
}

impl ProviderAuth {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            properties: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for ProviderAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAuth")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A named notification backend grouping channels and templates.
///
/// Decorators implement this trait by wrapping another provider.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn config(&self) -> &ProviderConfig;

    /// Must succeed before any send.
    async fn initialize(&self, auth: ProviderAuth) -> Result<(), NotificationError>;

    async fn register_channel(&self, config: ChannelConfig) -> Result<(), NotificationError>;

    async fn unregister_channel(&self, channel_id: &str) -> Result<(), NotificationError>;

    async fn register_template(&self, template: Template) -> Result<(), NotificationError>;

    /// Delivers to every eligible channel concurrently.
    async fn send(&self, message: &mut Message) -> Result<Vec<DeliveryReceipt>, NotificationError>;

    /// Sends each message independently; one failure does not stop the rest.
    async fn send_bulk(
        &self,
        messages: &mut [Message],
    ) -> Vec<Result<Vec<DeliveryReceipt>, NotificationError>> {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages.iter_mut() {
            results.push(self.send(message).await);
        }
        results
    }

    /// Renders a registered template into a message carrying `options`.
    async fn render_template(
        &self,
        template_id: &str,
        variables: &HashMap<String, String>,
        options: DeliveryOptions,
    ) -> Result<Message, NotificationError>;

    /// Renders a template and sends the result through [`send`](Self::send).
    async fn send_template(
        &self,
        template_id: &str,
        variables: &HashMap<String, String>,
        options: DeliveryOptions,
    ) -> Result<Vec<DeliveryReceipt>, NotificationError> {
        let mut message = self.render_template(template_id, variables, options).await?;
        self.send(&mut message).await
    }

    async fn check_health(&self) -> ProviderHealth;

    fn metrics(&self) -> ProviderMetrics;

    async fn shutdown(&self) -> Result<(), NotificationError>;
}
