// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;
use taskbell_core::NotificationError;
use taskbell_relay::{Broker, DeliveryStream, ExchangeKind, InMemoryBroker, MessageProperties};

use crate::journal::Journal;

/// [`InMemoryBroker`] that journals `ack:<tag>` and `nack:<tag>:<requeue>`.
#[derive(Debug, Clone)]
pub struct RecordingBroker {
    inner: InMemoryBroker,
    journal: Journal,
}

impl RecordingBroker {
    pub fn new(journal: Journal) -> Self {
        Self {
            inner: InMemoryBroker::new(),
            journal,
        }
    }

    /// The wrapped broker, for inspecting queues and dead letters.
    pub fn inner(&self) -> &InMemoryBroker {
        &self.inner
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), NotificationError> {
        self.inner.declare_exchange(name, kind, durable).await
    }

    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), NotificationError> {
        self.inner.declare_queue(name, durable).await
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), NotificationError> {
        self.inner.bind_queue(queue, exchange, pattern).await
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<(), NotificationError> {
        self.journal.record(format!("publish:{routing_key}"));
        self.inner
            .publish(exchange, routing_key, body, properties)
            .await
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream, NotificationError> {
        self.inner.consume(queue).await
    }

    async fn ack(&self, tag: u64) -> Result<(), NotificationError> {
        self.inner.ack(tag).await?;
        self.journal.record(format!("ack:{tag}"));
        Ok(())
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), NotificationError> {
        self.inner.nack(tag, requeue).await?;
        self.journal.record(format!("nack:{tag}:{requeue}"));
        Ok(())
    }
}
