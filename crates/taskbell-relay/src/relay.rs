// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridges task events from the broker into notification sends.
//!
//! Each delivery moves through `received -> parsed -> delivered -> acked`.
//! A payload that cannot be parsed, or a send that fails permanently, is
//! rejected without requeue. A transient send failure is requeued until the
//! message has been redelivered `max_redeliveries` times, then dead-lettered.
//! Every path settles the delivery exactly once.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use taskbell_config::RelayConfig;
use taskbell_core::{NotificationError, NotificationSink};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{Broker, Delivery, ExchangeKind, MessageProperties};
use crate::notification::TaskNotification;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Acked,
    /// Delivery failed transiently; the broker will redeliver.
    Requeued,
    /// Malformed payload, permanent failure, or redeliveries exhausted.
    DeadLettered,
}

impl RelayOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acked => "ack",
            Self::Requeued => "nack_requeue",
            Self::DeadLettered => "nack_drop",
        }
    }
}

/// Publishes task events and consumes them into a [`NotificationSink`].
pub struct TaskRelay {
    broker: Arc<dyn Broker>,
    sink: Arc<dyn NotificationSink>,
    config: RelayConfig,
}

impl TaskRelay {
    pub fn new(
        broker: Arc<dyn Broker>,
        sink: Arc<dyn NotificationSink>,
        config: RelayConfig,
    ) -> Self {
        Self {
            broker,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Declares the durable exchange and queue and binds them.
    ///
    /// Errors are fatal; there is no reconnect at this layer.
    pub async fn setup(&self) -> Result<(), NotificationError> {
        let RelayConfig {
            exchange,
            queue,
            binding_key,
            ..
        } = &self.config;
        self.broker
            .declare_exchange(exchange, ExchangeKind::Topic, true)
            .await?;
        self.broker.declare_queue(queue, true).await?;
        self.broker.bind_queue(queue, exchange, binding_key).await?;
        info!(exchange = %exchange, queue = %queue, binding_key = %binding_key, "task relay ready");
        Ok(())
    }

    /// Publishes `notification` as a persistent message; returns its message id.
    pub async fn publish(&self, notification: &TaskNotification) -> Result<String, NotificationError> {
        let body = serde_json::to_vec(notification)
            .map_err(|e| NotificationError::queue("failed to encode task notification", e))?;
        let message_id = uuid::Uuid::new_v4().to_string();
        let routing_key = notification.routing_key();
        let properties = MessageProperties {
            message_id: Some(message_id.clone()),
            kind: Some(notification.kind.clone()),
            headers: BTreeMap::from([("task_id".to_string(), notification.task_id.clone())]),
            timestamp: Some(Utc::now()),
            persistent: true,
        };
        self.broker
            .publish(&self.config.exchange, &routing_key, body, properties)
            .await?;
        debug!(message_id = %message_id, routing_key = %routing_key, "task notification published");
        Ok(message_id)
    }

    /// Processes one delivery and settles it with exactly one ack or nack.
    ///
    /// Returns `Err` only when the settlement itself fails.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Result<RelayOutcome, NotificationError> {
        let outcome = match TaskNotification::from_slice(&delivery.body) {
            Err(e) => {
                warn!(
                    tag = delivery.tag,
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "dropping malformed task notification"
                );
                self.broker.nack(delivery.tag, false).await?;
                RelayOutcome::DeadLettered
            }
            Ok(notification) => match self.sink.dispatch(notification.to_message()).await {
                Ok(receipts) => {
                    self.broker.ack(delivery.tag).await?;
                    debug!(
                        tag = delivery.tag,
                        task_id = %notification.task_id,
                        receipts = receipts.len(),
                        "task notification delivered"
                    );
                    RelayOutcome::Acked
                }
                Err(e) if !e.is_transient() => {
                    warn!(
                        tag = delivery.tag,
                        task_id = %notification.task_id,
                        code = %e.code(),
                        error = %e,
                        "task notification cannot be delivered, dead-lettering"
                    );
                    self.broker.nack(delivery.tag, false).await?;
                    RelayOutcome::DeadLettered
                }
                Err(e) if delivery.retry_count >= self.config.max_redeliveries => {
                    warn!(
                        tag = delivery.tag,
                        task_id = %notification.task_id,
                        retry_count = delivery.retry_count,
                        error = %e,
                        "redelivery limit reached, dead-lettering"
                    );
                    self.broker.nack(delivery.tag, false).await?;
                    RelayOutcome::DeadLettered
                }
                Err(e) => {
                    warn!(
                        tag = delivery.tag,
                        task_id = %notification.task_id,
                        retry_count = delivery.retry_count,
                        error = %e,
                        "task notification delivery failed, requeueing"
                    );
                    self.broker.nack(delivery.tag, true).await?;
                    RelayOutcome::Requeued
                }
            },
        };
        taskbell_prometheus::record_relay_outcome(outcome.as_str());
        Ok(outcome)
    }

    /// Consumes the queue one delivery at a time until `cancel` fires or the
    /// broker closes the consumer.
    ///
    /// After a requeue the loop pauses for `redelivery_delay` before taking
    /// the next delivery; cancellation interrupts the pause.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), NotificationError> {
        let mut deliveries = self.broker.consume(&self.config.queue).await?;
        info!(queue = %self.config.queue, "task relay consuming");
        loop {
            let delivery = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = deliveries.next() => match next {
                    Some(delivery) => delivery,
                    None => {
                        warn!(queue = %self.config.queue, "broker closed the consumer");
                        return Ok(());
                    }
                },
            };

            let requeued = match self.handle_delivery(&delivery).await {
                Ok(outcome) => outcome == RelayOutcome::Requeued,
                Err(e) => {
                    warn!(tag = delivery.tag, error = %e, "failed to settle delivery");
                    false
                }
            };

            if requeued {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(self.config.redelivery_delay()) => {}
                }
            }
            tokio::task::yield_now().await;
        }
        info!("task relay stopping");
        Ok(())
    }
}

impl std::fmt::Debug for TaskRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRelay")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
