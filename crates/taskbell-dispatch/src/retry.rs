// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry-with-backoff decorator for any [`NotificationProvider`].

use std::collections::HashMap;

use async_trait::async_trait;
use taskbell_core::{
    ChannelConfig, DeliveryOptions, DeliveryReceipt, Message, NotificationError,
    NotificationProvider, ProviderAuth, ProviderConfig, ProviderHealth, ProviderMetrics,
    RetryConfig, Template,
};
use tracing::{debug, warn};

/// Wraps a provider and retries its `send` with exponential backoff.
///
/// The policy comes from the message's own retry override when present,
/// otherwise from the decorator.
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryConfig,
}

impl<P: NotificationProvider> RetryingProvider<P> {
    /// Uses the inner provider's configured retry policy.
    pub fn new(inner: P) -> Self {
        let policy = inner.config().retry.clone();
        Self { inner, policy }
    }

    pub fn with_policy(inner: P, policy: RetryConfig) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn policy(&self) -> &RetryConfig {
        &self.policy
    }
}

#[async_trait]
impl<P: NotificationProvider> NotificationProvider for RetryingProvider<P> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn config(&self) -> &ProviderConfig {
        self.inner.config()
    }

    async fn initialize(&self, auth: ProviderAuth) -> Result<(), NotificationError> {
        self.inner.initialize(auth).await
    }

    async fn register_channel(&self, config: ChannelConfig) -> Result<(), NotificationError> {
        self.inner.register_channel(config).await
    }

    async fn unregister_channel(&self, channel_id: &str) -> Result<(), NotificationError> {
        self.inner.unregister_channel(channel_id).await
    }

    async fn register_template(&self, template: Template) -> Result<(), NotificationError> {
        self.inner.register_template(template).await
    }

    async fn send(&self, message: &mut Message) -> Result<Vec<DeliveryReceipt>, NotificationError> {
        let policy = message
            .options
            .retry
            .clone()
            .unwrap_or_else(|| self.policy.clone());
        let max_attempts = policy.max_attempts.max(1);

        let mut attempt: u32 = 0;
        loop {
            let err = match self.inner.send(message).await {
                Ok(receipts) => {
                    if attempt > 0 {
                        debug!(provider_id = self.id(), message_id = %message.id, attempts = attempt + 1, "delivered after retry");
                    }
                    return Ok(receipts);
                }
                Err(err) => err,
            };
            attempt += 1;

            if !err.is_retryable() {
                debug!(provider_id = self.id(), message_id = %message.id, code = %err.code(), "error is not retryable");
                return Err(err);
            }

            if attempt >= max_attempts {
                warn!(
                    provider_id = self.id(),
                    message_id = %message.id,
                    attempts = attempt,
                    error = %err,
                    "retries exhausted"
                );
                let wrapped = NotificationError::MessageSend {
                    message: format!("delivery failed after {attempt} attempts: {err}"),
                    channel_id: err.context().channel_id,
                    message_id: Some(message.id.0.clone()),
                    attempts: Some(attempt),
                    source: Some(Box::new(err)),
                };
                message.mark_failed(&wrapped);
                return Err(wrapped);
            }

            let delay = policy.delay_for(attempt - 1);
            warn!(
                provider_id = self.id(),
                message_id = %message.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "delivery failed, retrying"
            );
            taskbell_prometheus::record_retry(self.id());
            message.mark_retrying();
            tokio::time::sleep(delay).await;
        }
    }

    async fn render_template(
        &self,
        template_id: &str,
        variables: &HashMap<String, String>,
        options: DeliveryOptions,
    ) -> Result<Message, NotificationError> {
        self.inner.render_template(template_id, variables, options).await
    }

    async fn check_health(&self) -> ProviderHealth {
        self.inner.check_health().await
    }

    fn metrics(&self) -> ProviderMetrics {
        self.inner.metrics()
    }

    async fn shutdown(&self) -> Result<(), NotificationError> {
        self.inner.shutdown().await
    }
}

