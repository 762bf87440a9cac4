// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel strategy with directly settable load and health, for balancer
//! and handler tests.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use taskbell_core::{
    ChannelConfig, ChannelHealth, ChannelMetrics, ChannelStatus, ChannelStrategy, ChannelType,
    DeliveryReceipt, LoadBalancingMetrics, Message, MessageId, NotificationError,
};

#[derive(Default)]
struct State {
    health: ChannelHealth,
    queue_size: usize,
    throughput: f64,
    metrics: ChannelMetrics,
    sent: Vec<MessageId>,
    failing: bool,
    disposals: usize,
}

pub struct MockChannel {
    config: ChannelConfig,
    state: Mutex<State>,
}

impl MockChannel {
    pub fn new(id: &str, channel_type: ChannelType) -> Self {
        Self {
            config: ChannelConfig::new(id, channel_type),
            state: Mutex::new(State::default()),
        }
    }

    /// An operational Discord channel.
    pub fn operational(id: &str) -> Self {
        let channel = Self::new(id, ChannelType::Discord);
        channel.set_status(ChannelStatus::Operational);
        channel
    }

    pub fn with_max_queue_size(mut self, max: usize) -> Self {
        self.config.max_queue_size = Some(max);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: ChannelStatus) {
        self.state().health.status = status;
    }

    pub fn set_queue_size(&self, queue_size: usize) {
        self.state().queue_size = queue_size;
    }

    pub fn set_throughput(&self, throughput: f64) {
        self.state().throughput = throughput;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    pub fn sent(&self) -> Vec<MessageId> {
        self.state().sent.clone()
    }

    pub fn disposals(&self) -> usize {
        self.state().disposals
    }
}

#[async_trait]
impl ChannelStrategy for MockChannel {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn channel_type(&self) -> ChannelType {
        self.config.channel_type
    }

    fn config(&self) -> &ChannelConfig {
        &self.config
    }

    async fn initialize(&self) -> Result<(), NotificationError> {
        let mut state = self.state();
        if state.health.status == ChannelStatus::Initializing {
            state.health.status = ChannelStatus::Operational;
        }
        Ok(())
    }

    fn can_handle(&self, message: &Message) -> bool {
        message
            .options
            .channel_type
            .is_none_or(|t| t == self.config.channel_type)
            && message
                .options
                .target_channel
                .as_deref()
                .is_none_or(|id| id == self.config.id)
    }

    async fn send(&self, message: &Message) -> Result<DeliveryReceipt, NotificationError> {
        let mut state = self.state();
        if state.failing {
            state.metrics.record_failure();
            return Err(NotificationError::send_failed(format!(
                "{} is failing",
                self.config.id
            )));
        }
        state.metrics.record_success(5.0);
        state.sent.push(message.id.clone());
        Ok(DeliveryReceipt {
            message_id: message.id.clone(),
            channel_id: self.config.id.clone(),
            external_id: None,
            latency_ms: 5.0,
            delivered_at: Utc::now(),
        })
    }

    async fn check_health(&self) -> ChannelHealth {
        let mut state = self.state();
        state.health.last_checked = Some(Utc::now());
        state.health.clone()
    }

    async fn test_connection(&self) -> Result<Duration, NotificationError> {
        Ok(Duration::from_millis(1))
    }

    fn metrics(&self) -> ChannelMetrics {
        self.state().metrics.clone()
    }

    fn health(&self) -> ChannelHealth {
        self.state().health.clone()
    }

    fn load_metrics(&self) -> LoadBalancingMetrics {
        let state = self.state();
        LoadBalancingMetrics {
            active_connections: state.queue_size,
            queue_size: state.queue_size,
            throughput: state.throughput,
            last_balanced: None,
        }
    }

    async fn dispose(&self) -> Result<(), NotificationError> {
        let mut state = self.state();
        state.disposals += 1;
        state.health.status = ChannelStatus::Down;
        Ok(())
    }
}
