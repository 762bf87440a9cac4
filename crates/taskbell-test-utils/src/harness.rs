// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the full delivery stack over mock transports:
//! channel provider, retry and performance decorators, an in-memory broker
//! and the task relay. `publish()` followed by `process_next()` drives one
//! task event through the whole pipeline.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use taskbell_config::{RelayConfig, SlaConfig};
use taskbell_core::{
    ChannelConfig, ChannelType, NotificationError, NotificationProvider, ProviderAuth,
    ProviderConfig, RetryConfig,
};
use taskbell_dispatch::{ChannelProvider, PerformanceProvider, ProviderSink, RetryingProvider};
use taskbell_relay::{Broker, DeliveryStream, RelayOutcome, TaskNotification, TaskRelay};

use crate::journal::Journal;
use crate::mock_transport::{MockTransport, MockTransportPool};
use crate::recording_broker::RecordingBroker;

/// The decorated provider stack the harness sends through.
pub type HarnessProvider = PerformanceProvider<RetryingProvider<ChannelProvider>>;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    channels: Vec<ChannelConfig>,
    retry: RetryConfig,
    sla: SlaConfig,
    relay: RelayConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            channels: Vec::new(),
            // Short delays keep failing-path tests fast on a real clock.
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 1,
                max_delay_ms: 5,
                backoff_factor: 2.0,
            },
            sla: SlaConfig::default(),
            relay: RelayConfig::default(),
        }
    }

    /// Register a mock-backed channel at build time.
    pub fn with_channel(mut self, id: &str, channel_type: ChannelType) -> Self {
        self.channels.push(ChannelConfig::new(id, channel_type));
        self
    }

    pub fn with_channel_config(mut self, config: ChannelConfig) -> Self {
        self.channels.push(config);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sla(mut self, sla: SlaConfig) -> Self {
        self.sla = sla;
        self
    }

    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, NotificationError> {
        let journal = Journal::new();
        let pool = MockTransportPool::new().with_journal(journal.clone());

        let types = [ChannelType::Discord, ChannelType::Webhook];
        let mut provider_config = ProviderConfig::new("test", "Test provider", types.to_vec());
        provider_config.retry = self.retry;
        let provider = ChannelProvider::new(provider_config, pool.factory_registry(&types));
        provider.initialize(ProviderAuth::token("test-token")).await?;
        for channel in self.channels {
            provider.register_channel(channel).await?;
        }
        let provider = Arc::new(PerformanceProvider::new(
            RetryingProvider::new(provider),
            self.sla,
        ));

        let broker = RecordingBroker::new(journal.clone());
        let relay = TaskRelay::new(
            Arc::new(broker.clone()),
            Arc::new(ProviderSink::new(Arc::clone(&provider))),
            self.relay,
        );
        relay.setup().await?;
        let deliveries = broker.consume(&relay.config().queue).await?;

        Ok(TestHarness {
            journal,
            pool,
            provider,
            broker,
            relay,
            deliveries,
        })
    }
}

/// A complete in-memory pipeline from broker to mock transports.
pub struct TestHarness {
    journal: Journal,
    pool: MockTransportPool,
    provider: Arc<HarnessProvider>,
    broker: RecordingBroker,
    relay: TaskRelay,
    deliveries: DeliveryStream,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Ordered side effects: `publish:`, `send:`, `ack:` and `nack:` entries.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn transport(&self, channel_id: &str) -> Option<MockTransport> {
        self.pool.transport(channel_id)
    }

    pub fn provider(&self) -> &Arc<HarnessProvider> {
        &self.provider
    }

    pub fn broker(&self) -> &RecordingBroker {
        &self.broker
    }

    pub fn relay(&self) -> &TaskRelay {
        &self.relay
    }

    pub async fn publish(&self, notification: &TaskNotification) -> Result<String, NotificationError> {
        self.relay.publish(notification).await
    }

    /// Publishes a raw body under `routing_key`, bypassing serialization.
    pub async fn publish_raw(&self, routing_key: &str, body: &[u8]) -> Result<(), NotificationError> {
        self.broker
            .publish(
                &self.relay.config().exchange,
                routing_key,
                body.to_vec(),
                Default::default(),
            )
            .await
    }

    /// Handles the next queued delivery, or returns `None` if the queue is
    /// empty.
    pub async fn process_next(&mut self) -> Result<Option<RelayOutcome>, NotificationError> {
        if self.broker.inner().queue_depth(&self.relay.config().queue) == 0 {
            return Ok(None);
        }
        let next = tokio::time::timeout(Duration::from_secs(5), self.deliveries.next())
            .await
            .map_err(|_| NotificationError::Internal("timed out waiting for delivery".to_string()))?;
        match next {
            Some(delivery) => self.relay.handle_delivery(&delivery).await.map(Some),
            None => Ok(None),
        }
    }
}
