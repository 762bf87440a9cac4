// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel handler: registry, health monitoring and load-balanced routing.
//!
//! The handler owns a set of channel strategies and a [`LoadBalancer`].
//! `send` routes a message to exactly one operational channel that can
//! handle it; there is no handler-level retry. A background monitor
//! re-arms itself after every sweep, so a slow sweep never overlaps the next.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use taskbell_config::DispatchConfig;
use taskbell_core::{
    BalancerStats, ChannelHealth, ChannelStatus, ChannelStrategy, DeliveryReceipt, ErrorCode,
    LoadBalancer, LoadBalancingMetrics, Message, MessageId, NotificationError, NotificationSink,
    Observers, ProviderHealth, ProviderMetrics,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::balancer;

/// Routing outcome published to handler observers.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerEvent {
    /// `message:sent`
    MessageSent {
        message_id: MessageId,
        channel_id: String,
        latency_ms: f64,
    },
    /// `message:failed`
    MessageFailed {
        message_id: MessageId,
        channel_id: Option<String>,
        code: ErrorCode,
        error: String,
    },
}

impl HandlerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HandlerEvent::MessageSent { .. } => "message:sent",
            HandlerEvent::MessageFailed { .. } => "message:failed",
        }
    }
}

/// Registry limits and monitor cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerConfig {
    pub max_channels_per_type: usize,
    pub health_check_interval: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_channels_per_type: 5,
            health_check_interval: Duration::from_secs(30),
        }
    }
}

impl From<&DispatchConfig> for HandlerConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_channels_per_type: config.max_channels_per_type,
            health_check_interval: Duration::from_secs(config.health_check_interval_secs),
        }
    }
}

/// Aggregated load picture across every registered channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandlerLoadStats {
    pub total_queue_size: usize,
    pub total_throughput: f64,
    pub channels: BTreeMap<String, LoadBalancingMetrics>,
    pub balancer: BalancerStats,
}

struct Monitor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry of channel strategies that routes each message to one of them.
pub struct ChannelHandler {
    name: String,
    config: HandlerConfig,
    balancer: Arc<dyn LoadBalancer>,
    channels: RwLock<Vec<Arc<dyn ChannelStrategy>>>,
    events: Observers<HandlerEvent>,
    monitor: Mutex<Option<Monitor>>,
}

impl ChannelHandler {
    pub fn new(
        name: impl Into<String>,
        config: HandlerConfig,
        balancer: Arc<dyn LoadBalancer>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            balancer,
            channels: RwLock::new(Vec::new()),
            events: Observers::new(),
            monitor: Mutex::new(None),
        }
    }

    /// Builds a handler with the balancer selected by `config.strategy`.
    pub fn from_config(name: impl Into<String>, config: &DispatchConfig) -> Self {
        Self::new(name, HandlerConfig::from(config), balancer::from_config(config))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn balancer(&self) -> &Arc<dyn LoadBalancer> {
        &self.balancer
    }

    /// Observers notified with `message:sent` / `message:failed` events.
    pub fn events(&self) -> &Observers<HandlerEvent> {
        &self.events
    }

    fn snapshot(&self) -> Vec<Arc<dyn ChannelStrategy>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn channel(&self, channel_id: &str) -> Option<Arc<dyn ChannelStrategy>> {
        self.snapshot().into_iter().find(|c| c.id() == channel_id)
    }

    pub fn channel_ids(&self) -> Vec<String> {
        self.snapshot().iter().map(|c| c.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `channel` to the registry and initializes it.
    ///
    /// Fails on a duplicate id or when the per-type cap is reached. A failed
    /// initialization leaves the channel registered in the `error` state so
    /// the health monitor can recover it.
    pub async fn register(&self, channel: Arc<dyn ChannelStrategy>) -> Result<(), NotificationError> {
        {
            let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
            if channels.iter().any(|c| c.id() == channel.id()) {
                return Err(NotificationError::ChannelCreation {
                    channel_id: channel.id().to_string(),
                    message: "a channel with this id is already registered".to_string(),
                    source: None,
                });
            }
            let same_type = channels
                .iter()
                .filter(|c| c.channel_type() == channel.channel_type())
                .count();
            if same_type >= self.config.max_channels_per_type {
                return Err(NotificationError::ChannelCreation {
                    channel_id: channel.id().to_string(),
                    message: format!(
                        "maximum of {} {} channels reached",
                        self.config.max_channels_per_type,
                        channel.channel_type()
                    ),
                    source: None,
                });
            }
            channels.push(Arc::clone(&channel));
        }

        if let Err(e) = channel.initialize().await {
            warn!(handler = %self.name, channel_id = channel.id(), error = %e, "registered channel failed to initialize");
        }
        taskbell_prometheus::set_channel_health(channel.id(), channel.health().status);
        info!(handler = %self.name, channel_id = channel.id(), channel_type = %channel.channel_type(), "channel registered");
        Ok(())
    }

    /// Removes and disposes a channel.
    pub async fn unregister(&self, channel_id: &str) -> Result<(), NotificationError> {
        let removed = {
            let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
            channels
                .iter()
                .position(|c| c.id() == channel_id)
                .map(|index| channels.remove(index))
        };
        let Some(channel) = removed else {
            return Err(NotificationError::ChannelUnavailable {
                message: "channel is not registered".to_string(),
                channel_id: Some(channel_id.to_string()),
            });
        };
        info!(handler = %self.name, channel_id, "channel unregistered");
        channel.dispose().await
    }

    /// Routes `message` to one healthy channel chosen by the balancer.
    ///
    /// Operational channels are preferred. When none is, rate-limited
    /// channels stay eligible and their limiter decides admission.
    pub async fn send(&self, message: &Message) -> Result<DeliveryReceipt, NotificationError> {
        let compatible: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|c| c.can_handle(message))
            .collect();

        if compatible.is_empty() {
            let err = NotificationError::ChannelIncompatible {
                channel_id: "*".to_string(),
                message_id: message.id.0.clone(),
            };
            self.emit_failed(message, None, &err);
            return Err(err);
        }

        let (operational, rest): (Vec<_>, Vec<_>) = compatible
            .into_iter()
            .partition(|c| c.health().status == ChannelStatus::Operational);
        let candidates = if operational.is_empty() {
            rest.into_iter()
                .filter(|c| c.health().status == ChannelStatus::RateLimited)
                .collect()
        } else {
            operational
        };

        if candidates.is_empty() {
            let err = NotificationError::ChannelUnavailable {
                message: format!("no operational channel can handle message {}", message.id),
                channel_id: None,
            };
            self.emit_failed(message, None, &err);
            return Err(err);
        }

        let selection = match self.balancer.select(&candidates, message) {
            Ok(selection) => selection,
            Err(e) => {
                self.emit_failed(message, None, &e);
                return Err(e);
            }
        };
        let channel = selection.channel;
        debug!(
            handler = %self.name,
            channel_id = channel.id(),
            message_id = %message.id,
            queue_position = ?selection.queue_position,
            "routing message"
        );

        match channel.send(message).await {
            Ok(receipt) => {
                taskbell_prometheus::record_send(
                    channel.id(),
                    channel.channel_type(),
                    true,
                    Some(Duration::from_secs_f64(receipt.latency_ms / 1000.0)),
                );
                self.events.emit(&HandlerEvent::MessageSent {
                    message_id: message.id.clone(),
                    channel_id: receipt.channel_id.clone(),
                    latency_ms: receipt.latency_ms,
                });
                Ok(receipt)
            }
            Err(e) => {
                taskbell_prometheus::record_send(channel.id(), channel.channel_type(), false, None);
                self.emit_failed(message, Some(channel.id()), &e);
                Err(e)
            }
        }
    }

    fn emit_failed(&self, message: &Message, channel_id: Option<&str>, err: &NotificationError) {
        warn!(handler = %self.name, message_id = %message.id, channel_id = ?channel_id, error = %err, "message failed");
        self.events.emit(&HandlerEvent::MessageFailed {
            message_id: message.id.clone(),
            channel_id: channel_id.map(str::to_string),
            code: err.code(),
            error: err.to_string(),
        });
    }

    /// Checks every channel concurrently and returns their fresh health.
    pub async fn check_all_health(&self) -> BTreeMap<String, ChannelHealth> {
        let channels = self.snapshot();
        let results = join_all(channels.iter().map(|c| c.check_health())).await;

        channels
            .iter()
            .zip(results)
            .map(|(channel, health)| {
                taskbell_prometheus::set_channel_health(channel.id(), health.status);
                (channel.id().to_string(), health)
            })
            .collect()
    }

    /// Rolled-up health from the last known state of each channel.
    pub fn health(&self) -> ProviderHealth {
        let channels: BTreeMap<String, ChannelHealth> = self
            .snapshot()
            .iter()
            .map(|c| (c.id().to_string(), c.health()))
            .collect();
        let status = ChannelStatus::rollup(channels.values().map(|h| h.status));
        ProviderHealth {
            provider_id: self.name.clone(),
            status,
            channels,
            checked_at: Utc::now(),
            message: None,
        }
    }

    /// Summed counters and sent-weighted latency across channels.
    pub fn metrics(&self) -> ProviderMetrics {
        let channels = self
            .snapshot()
            .iter()
            .map(|c| (c.id().to_string(), c.metrics()))
            .collect();
        ProviderMetrics::aggregate(&self.name, channels)
    }

    pub fn load_stats(&self) -> HandlerLoadStats {
        let channels: BTreeMap<String, LoadBalancingMetrics> = self
            .snapshot()
            .iter()
            .map(|c| {
                let load = c.load_metrics();
                taskbell_prometheus::set_queue_size(c.id(), load.queue_size);
                (c.id().to_string(), load)
            })
            .collect();
        HandlerLoadStats {
            total_queue_size: channels.values().map(|l| l.queue_size).sum(),
            total_throughput: channels.values().map(|l| l.throughput).sum(),
            channels,
            balancer: self.balancer.stats(),
        }
    }

    /// Starts the self-rearming health monitor. Calling it again while a
    /// monitor runs is a no-op.
    pub fn start_health_monitor(self: &Arc<Self>) {
        let mut slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let handler = Arc::clone(self);
        let token = cancel.clone();
        let interval = self.config.health_check_interval;
        let task = tokio::spawn(async move {
            info!(handler = %handler.name, interval_secs = interval.as_secs(), "health monitor started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let results = handler.check_all_health().await;
                let unhealthy = results
                    .values()
                    .filter(|h| h.status != ChannelStatus::Operational)
                    .count();
                debug!(handler = %handler.name, channels = results.len(), unhealthy, "health sweep finished");
            }
            debug!(handler = %handler.name, "health monitor stopped");
        });
        *slot = Some(Monitor { cancel, task });
    }

    /// Stops the monitor and waits for the current sweep to finish.
    pub async fn stop_health_monitor(&self) {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = monitor {
            monitor.cancel.cancel();
            if let Err(e) = monitor.task.await {
                warn!(handler = %self.name, error = %e, "health monitor task ended abnormally");
            }
        }
    }

    /// Stops monitoring and disposes every channel.
    pub async fn shutdown(&self) -> Result<(), NotificationError> {
        self.stop_health_monitor().await;
        let channels = std::mem::take(
            &mut *self.channels.write().unwrap_or_else(PoisonError::into_inner),
        );
        for channel in channels {
            if let Err(e) = channel.dispose().await {
                warn!(handler = %self.name, channel_id = channel.id(), error = %e, "channel dispose failed");
            }
        }
        info!(handler = %self.name, "channel handler shut down");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for ChannelHandler {
    async fn dispatch(&self, message: Message) -> Result<Vec<DeliveryReceipt>, NotificationError> {
        self.send(&message).await.map(|receipt| vec![receipt])
    }
}

impl std::fmt::Debug for ChannelHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandler")
            .field("name", &self.name)
            .field("balancer", &self.balancer.name())
            .field("channels", &self.channel_ids())
            .finish()
    }
}
