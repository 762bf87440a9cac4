// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The channel-backed notification provider.
//!
//! A [`ChannelProvider`] owns its channels and templates exclusively. Unlike
//! the [`ChannelHandler`](crate::ChannelHandler) it does not load balance:
//! `send` fans out to every eligible channel concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use taskbell_core::{
    ChannelConfig, ChannelStatus, ChannelStrategy, DeliveryOptions, DeliveryReceipt, Message,
    NotificationError, NotificationProvider, ProviderAuth, ProviderConfig, ProviderHealth,
    ProviderMetrics, RateLimiter, Template,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::factory::ChannelFactoryRegistry;

/// A provider that delivers through channels built by a factory registry.
pub struct ChannelProvider {
    config: ProviderConfig,
    factories: ChannelFactoryRegistry,
    channels: RwLock<BTreeMap<String, Arc<dyn ChannelStrategy>>>,
    templates: RwLock<HashMap<String, Template>>,
    auth: RwLock<Option<ProviderAuth>>,
    limiter: Mutex<RateLimiter>,
}

impl ChannelProvider {
    pub fn new(config: ProviderConfig, factories: ChannelFactoryRegistry) -> Self {
        let limiter = RateLimiter::new(
            format!("provider {}", config.id),
            config.rate_limits.global.clone(),
        );
        Self {
            config,
            factories,
            channels: RwLock::new(BTreeMap::new()),
            templates: RwLock::new(HashMap::new()),
            auth: RwLock::new(None),
            limiter: Mutex::new(limiter),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn channel(&self, channel_id: &str) -> Option<Arc<dyn ChannelStrategy>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel_id)
            .cloned()
    }

    pub fn channel_ids(&self) -> Vec<String> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ChannelStrategy>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn unavailable(&self, message: impl Into<String>) -> NotificationError {
        NotificationError::ProviderUnavailable {
            provider_id: self.config.id.clone(),
            message: message.into(),
        }
    }

    fn channel_error(config: &ChannelConfig, message: String) -> NotificationError {
        NotificationError::ChannelCreation {
            channel_id: config.id.clone(),
            message,
            source: None,
        }
    }
}

#[async_trait]
impl NotificationProvider for ChannelProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn initialize(&self, auth: ProviderAuth) -> Result<(), NotificationError> {
        if !self.config.enabled {
            return Err(NotificationError::ProviderInit {
                provider_id: self.config.id.clone(),
                message: "provider is disabled".to_string(),
                source: None,
            });
        }
        if auth.token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(NotificationError::ProviderAuth {
                provider_id: self.config.id.clone(),
                message: "token is empty".to_string(),
            });
        }
        *self.auth.write().unwrap_or_else(PoisonError::into_inner) = Some(auth);
        info!(provider_id = %self.config.id, "provider initialized");
        Ok(())
    }

    async fn register_channel(&self, mut config: ChannelConfig) -> Result<(), NotificationError> {
        if !self.config.supports(config.channel_type) {
            return Err(Self::channel_error(
                &config,
                format!(
                    "provider {} does not support {} channels",
                    self.config.id, config.channel_type
                ),
            ));
        }
        if self.channel(&config.id).is_some() {
            return Err(Self::channel_error(
                &config,
                "a channel with this id is already registered".to_string(),
            ));
        }
        if config.rate_limits.is_unlimited()
            && let Some(limits) = self.config.rate_limits.per_channel.get(&config.id)
        {
            config.rate_limits = limits.clone();
        }

        let channel = self.factories.create(&config)?;
        channel.initialize().await?;

        let inserted = {
            let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
            if channels.contains_key(&config.id) {
                false
            } else {
                channels.insert(config.id.clone(), Arc::clone(&channel));
                true
            }
        };
        if !inserted {
            // Lost a registration race; the other registration wins.
            let _ = channel.dispose().await;
            return Err(Self::channel_error(
                &config,
                "a channel with this id is already registered".to_string(),
            ));
        }
        info!(provider_id = %self.config.id, channel_id = %config.id, channel_type = %config.channel_type, "channel registered");
        Ok(())
    }

    async fn unregister_channel(&self, channel_id: &str) -> Result<(), NotificationError> {
        let removed = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel_id);
        match removed {
            Some(channel) => {
                info!(provider_id = %self.config.id, channel_id, "channel unregistered");
                channel.dispose().await
            }
            None => Err(NotificationError::ChannelUnavailable {
                message: "channel is not registered".to_string(),
                channel_id: Some(channel_id.to_string()),
            }),
        }
    }

    async fn register_template(&self, template: Template) -> Result<(), NotificationError> {
        template.validate()?;
        debug!(provider_id = %self.config.id, template_id = %template.id, "template registered");
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(template.id.clone(), template);
        Ok(())
    }

    async fn send(&self, message: &mut Message) -> Result<Vec<DeliveryReceipt>, NotificationError> {
        if !self.is_initialized() {
            return Err(self.unavailable("provider is not initialized"));
        }
        if message.is_expired() {
            let err = NotificationError::MessageSend {
                message: "message expired before delivery".to_string(),
                channel_id: None,
                message_id: Some(message.id.0.clone()),
                attempts: Some(message.delivery.attempts),
                source: None,
            };
            message.mark_failed(&err);
            return Err(err);
        }
        let admitted = self
            .limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(Instant::now());
        admitted?;

        let attempt = message.begin_attempt();
        let eligible: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|c| c.can_handle(message))
            .collect();
        if eligible.is_empty() {
            let err = NotificationError::MessageSend {
                message: "no suitable channels".to_string(),
                channel_id: None,
                message_id: Some(message.id.0.clone()),
                attempts: Some(attempt),
                source: None,
            };
            message.mark_failed(&err);
            return Err(err);
        }

        let shared: &Message = message;
        let outcomes = join_all(eligible.iter().map(|c| c.send(shared))).await;

        let mut receipts = Vec::new();
        let mut first_error = None;
        for (channel, outcome) in eligible.iter().zip(outcomes) {
            match outcome {
                Ok(receipt) => {
                    taskbell_prometheus::record_send(
                        channel.id(),
                        channel.channel_type(),
                        true,
                        Some(Duration::from_secs_f64(receipt.latency_ms / 1000.0)),
                    );
                    receipts.push(receipt);
                }
                Err(e) => {
                    taskbell_prometheus::record_send(channel.id(), channel.channel_type(), false, None);
                    warn!(
                        provider_id = %self.config.id,
                        channel_id = channel.id(),
                        message_id = %message.id,
                        attempt,
                        error = %e,
                        "channel delivery failed"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match (receipts.first(), first_error) {
            (Some(first), _) => {
                let channel_id = first.channel_id.clone();
                message.mark_delivered(channel_id);
                Ok(receipts)
            }
            (None, Some(err)) => {
                message.mark_failed(&err);
                Err(err)
            }
            (None, None) => Err(NotificationError::Internal(
                "fan-out produced no outcome".to_string(),
            )),
        }
    }

    async fn send_bulk(
        &self,
        messages: &mut [Message],
    ) -> Vec<Result<Vec<DeliveryReceipt>, NotificationError>> {
        join_all(messages.iter_mut().map(|m| self.send(m))).await
    }

    async fn render_template(
        &self,
        template_id: &str,
        variables: &HashMap<String, String>,
        options: DeliveryOptions,
    ) -> Result<Message, NotificationError> {
        let template = self
            .templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(template_id)
            .cloned()
            .ok_or_else(|| NotificationError::TemplateValidation {
                template_id: template_id.to_string(),
                message: "template is not registered".to_string(),
            })?;

        if let Some(channel_type) = options.channel_type
            && !template.supports(channel_type)
        {
            return Err(NotificationError::TemplateValidation {
                template_id: template.id.clone(),
                message: format!("template does not support {channel_type} channels"),
            });
        }

        let rendered = template.render(variables)?;
        let mut message = Message::new(rendered.body).with_metadata(
            "template_id",
            serde_json::Value::String(template.id.clone()),
        );
        message.payload.subject = rendered.subject;
        message.payload.priority = options.priority;
        message.options = options;
        Ok(message)
    }

    async fn check_health(&self) -> ProviderHealth {
        let channels = self.snapshot();
        let results = join_all(channels.iter().map(|c| c.check_health())).await;
        let channels: BTreeMap<_, _> = channels
            .iter()
            .zip(results)
            .map(|(c, health)| {
                taskbell_prometheus::set_channel_health(c.id(), health.status);
                (c.id().to_string(), health)
            })
            .collect();

        let (status, message) = if !self.is_initialized() {
            (ChannelStatus::Initializing, Some("provider is not initialized".to_string()))
        } else if channels
            .values()
            .all(|h| h.status == ChannelStatus::Operational)
        {
            (ChannelStatus::Operational, None)
        } else {
            let failing: Vec<&str> = channels
                .iter()
                .filter(|(_, h)| h.status != ChannelStatus::Operational)
                .map(|(id, _)| id.as_str())
                .collect();
            (
                ChannelStatus::Degraded,
                Some(format!("unhealthy channels: {}", failing.join(", "))),
            )
        };

        ProviderHealth {
            provider_id: self.config.id.clone(),
            status,
            channels,
            checked_at: Utc::now(),
            message,
        }
    }

    fn metrics(&self) -> ProviderMetrics {
        let channels = self
            .snapshot()
            .iter()
            .map(|c| (c.id().to_string(), c.metrics()))
            .collect();
        ProviderMetrics::aggregate(&self.config.id, channels)
    }

    async fn shutdown(&self) -> Result<(), NotificationError> {
        let channels = std::mem::take(&mut *self.channels.write().unwrap_or_else(PoisonError::into_inner));
        for (id, channel) in channels {
            if let Err(e) = channel.dispose().await {
                warn!(provider_id = %self.config.id, channel_id = %id, error = %e, "channel dispose failed");
            }
        }
        *self.auth.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!(provider_id = %self.config.id, "provider shut down");
        Ok(())
    }
}

impl std::fmt::Debug for ChannelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelProvider")
            .field("id", &self.config.id)
            .field("channels", &self.channel_ids())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
