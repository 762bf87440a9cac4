// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock notification provider for decorator tests.
//!
//! `send` consumes scripted failures first and succeeds once they run out.
//! Each call's (possibly paused) clock time is recorded so tests can
//! assert on backoff spacing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use taskbell_core::{
    ChannelConfig, ChannelStatus, ChannelType, DeliveryOptions, DeliveryReceipt, Message,
    NotificationError, NotificationProvider, ProviderAuth, ProviderConfig, ProviderHealth,
    ProviderMetrics, Template,
};
use tokio::time::Instant;

use crate::MockFailure;

#[derive(Default)]
struct State {
    failures: VecDeque<MockFailure>,
    calls: Vec<Instant>,
    sent: Vec<Message>,
    delay: Duration,
    health: Option<ChannelStatus>,
}

pub struct MockProvider {
    config: ProviderConfig,
    state: Mutex<State>,
}

impl MockProvider {
    pub fn new(id: &str) -> Self {
        Self {
            config: ProviderConfig::new(id, "mock provider", vec![ChannelType::Discord, ChannelType::Webhook]),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_config(config: ProviderConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails the next `times` sends with `failure`.
    pub fn fail_next(&self, times: usize, failure: MockFailure) {
        self.state()
            .failures
            .extend(std::iter::repeat_n(failure, times));
    }

    /// Each send takes `delay` before completing.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = delay;
    }

    pub fn set_health(&self, status: ChannelStatus) {
        self.state().health = Some(status);
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Clock time of each `send` call.
    pub fn call_times(&self) -> Vec<Instant> {
        self.state().calls.clone()
    }

    /// Gaps between consecutive calls.
    pub fn call_gaps(&self) -> Vec<Duration> {
        self.call_times()
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }

    pub fn sent(&self) -> Vec<Message> {
        self.state().sent.clone()
    }
}

#[async_trait]
impl NotificationProvider for MockProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn initialize(&self, _auth: ProviderAuth) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn register_channel(&self, _config: ChannelConfig) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn unregister_channel(&self, _channel_id: &str) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn register_template(&self, template: Template) -> Result<(), NotificationError> {
        template.validate()
    }

    async fn send(&self, message: &mut Message) -> Result<Vec<DeliveryReceipt>, NotificationError> {
        let delay = {
            let mut state = self.state();
            state.calls.push(Instant::now());
            state.delay
        };
        message.begin_attempt();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = self.state().failures.pop_front();
        if let Some(failure) = failure {
            return Err(failure.to_error(&self.config.id));
        }
        message.mark_delivered("mock");
        self.state().sent.push(message.clone());
        Ok(vec![DeliveryReceipt {
            message_id: message.id.clone(),
            channel_id: "mock".to_string(),
            external_id: None,
            latency_ms: delay.as_secs_f64() * 1000.0,
            delivered_at: Utc::now(),
        }])
    }

    async fn render_template(
        &self,
        template_id: &str,
        _variables: &HashMap<String, String>,
        options: DeliveryOptions,
    ) -> Result<Message, NotificationError> {
        let mut message = Message::new(format!("rendered {template_id}"));
        message.options = options;
        Ok(message)
    }

    async fn check_health(&self) -> ProviderHealth {
        ProviderHealth {
            provider_id: self.config.id.clone(),
            status: self.state().health.unwrap_or(ChannelStatus::Operational),
            channels: Default::default(),
            checked_at: Utc::now(),
            message: None,
        }
    }

    fn metrics(&self) -> ProviderMetrics {
        let state = self.state();
        ProviderMetrics {
            provider_id: self.config.id.clone(),
            messages_sent: state.sent.len() as u64,
            ..ProviderMetrics::default()
        }
    }

    async fn shutdown(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}
