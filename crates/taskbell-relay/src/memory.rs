// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process broker with AMQP-style topic routing and ack/nack settlement.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use taskbell_core::NotificationError;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::broker::{
    Broker, Delivery, DeliveryStream, ExchangeKind, MessageProperties, topic_matches,
};

/// A message rejected without requeue.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub queue: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub properties: MessageProperties,
    pub retry_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Envelope {
    exchange: String,
    routing_key: String,
    body: Vec<u8>,
    properties: MessageProperties,
    redelivered: bool,
    retry_count: u32,
}

#[derive(Debug)]
struct Exchange {
    kind: ExchangeKind,
    durable: bool,
    bindings: Vec<(String, String)>,
}

impl Exchange {
    fn routes(&self, pattern: &str, routing_key: &str) -> bool {
        match self.kind {
            ExchangeKind::Direct => pattern == routing_key,
            ExchangeKind::Topic => topic_matches(pattern, routing_key),
            ExchangeKind::Fanout => true,
        }
    }
}

#[derive(Debug)]
struct Queue {
    durable: bool,
    ready: VecDeque<Envelope>,
    available: Arc<Notify>,
}

#[derive(Debug, Default)]
struct State {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
    unacked: HashMap<u64, (String, Envelope)>,
    next_tag: u64,
    acked: u64,
    requeued: u64,
    dead_letters: Vec<DeadLetter>,
    closed: bool,
}

/// A broker living entirely in process memory.
///
/// Cloning shares the same exchanges and queues.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulates a lost connection: every later operation fails.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    /// Messages waiting for a consumer in `queue`.
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.ready.len())
    }

    pub fn is_durable_queue(&self, queue: &str) -> bool {
        self.lock().queues.get(queue).is_some_and(|q| q.durable)
    }

    pub fn exchange_kind(&self, exchange: &str) -> Option<(ExchangeKind, bool)> {
        self.lock()
            .exchanges
            .get(exchange)
            .map(|e| (e.kind, e.durable))
    }

    /// Deliveries handed out but not yet settled.
    pub fn unacked_count(&self) -> usize {
        self.lock().unacked.len()
    }

    pub fn acked_count(&self) -> u64 {
        self.lock().acked
    }

    pub fn requeued_count(&self) -> u64 {
        self.lock().requeued
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.clone()
    }

    /// Pops the next ready message of `queue` and registers it as unacked.
    fn take(&self, queue: &str) -> Result<Option<Delivery>, NotificationError> {
        let mut state = self.lock();
        if state.closed {
            return Err(closed());
        }
        let Some(envelope) = state
            .queues
            .get_mut(queue)
            .and_then(|q| q.ready.pop_front())
        else {
            return Ok(None);
        };
        state.next_tag += 1;
        let tag = state.next_tag;
        let delivery = Delivery {
            tag,
            exchange: envelope.exchange.clone(),
            routing_key: envelope.routing_key.clone(),
            body: envelope.body.clone(),
            properties: envelope.properties.clone(),
            redelivered: envelope.redelivered,
            retry_count: envelope.retry_count,
        };
        state.unacked.insert(tag, (queue.to_string(), envelope));
        Ok(Some(delivery))
    }

    fn settle(&self, tag: u64) -> Result<(String, Envelope), NotificationError> {
        let mut state = self.lock();
        if state.closed {
            return Err(closed());
        }
        state.unacked.remove(&tag).ok_or_else(|| NotificationError::Queue {
            message: format!("unknown delivery tag {tag}"),
            source: None,
        })
    }
}

fn closed() -> NotificationError {
    NotificationError::Queue {
        message: "broker connection is closed".to_string(),
        source: None,
    }
}

fn not_declared(what: &str, name: &str) -> NotificationError {
    NotificationError::Queue {
        message: format!("{what} `{name}` is not declared"),
        source: None,
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), NotificationError> {
        let mut state = self.lock();
        if state.closed {
            return Err(closed());
        }
        let existing = state.exchanges.get(name).map(|e| (e.kind, e.durable));
        match existing {
            Some(settings) if settings != (kind, durable) => {
                Err(NotificationError::Queue {
                    message: format!("exchange `{name}` already declared with different settings"),
                    source: None,
                })
            }
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(
                    name.to_string(),
                    Exchange {
                        kind,
                        durable,
                        bindings: Vec::new(),
                    },
                );
                debug!(exchange = name, ?kind, durable, "exchange declared");
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), NotificationError> {
        let mut state = self.lock();
        if state.closed {
            return Err(closed());
        }
        state.queues.entry(name.to_string()).or_insert_with(|| {
            debug!(queue = name, durable, "queue declared");
            Queue {
                durable,
                ready: VecDeque::new(),
                available: Arc::new(Notify::new()),
            }
        });
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), NotificationError> {
        let mut state = self.lock();
        if state.closed {
            return Err(closed());
        }
        if !state.queues.contains_key(queue) {
            return Err(not_declared("queue", queue));
        }
        let exchange_state = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| not_declared("exchange", exchange))?;
        let binding = (queue.to_string(), pattern.to_string());
        if !exchange_state.bindings.contains(&binding) {
            exchange_state.bindings.push(binding);
        }
        debug!(queue, exchange, pattern, "queue bound");
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<(), NotificationError> {
        let mut state = self.lock();
        if state.closed {
            return Err(closed());
        }
        let targets: Vec<String> = {
            let exchange_state = state
                .exchanges
                .get(exchange)
                .ok_or_else(|| not_declared("exchange", exchange))?;
            exchange_state
                .bindings
                .iter()
                .filter(|(_, pattern)| exchange_state.routes(pattern, routing_key))
                .map(|(queue, _)| queue.clone())
                .collect()
        };
        if targets.is_empty() {
            debug!(exchange, routing_key, "message unroutable, dropped");
            return Ok(());
        }
        for queue in targets {
            if let Some(q) = state.queues.get_mut(&queue) {
                q.ready.push_back(Envelope {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    body: body.clone(),
                    properties: properties.clone(),
                    redelivered: false,
                    retry_count: 0,
                });
                q.available.notify_one();
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream, NotificationError> {
        let available = {
            let state = self.lock();
            if state.closed {
                return Err(closed());
            }
            state
                .queues
                .get(queue)
                .map(|q| Arc::clone(&q.available))
                .ok_or_else(|| not_declared("queue", queue))?
        };
        let broker = self.clone();
        let queue = queue.to_string();
        let stream = futures::stream::unfold(
            (broker, queue, available),
            |(broker, queue, available)| async move {
                loop {
                    match broker.take(&queue) {
                        Ok(Some(delivery)) => return Some((delivery, (broker, queue, available))),
                        Ok(None) => available.notified().await,
                        Err(e) => {
                            warn!(queue = %queue, error = %e, "consumer stopped");
                            return None;
                        }
                    }
                }
            },
        );
        Ok(stream.boxed())
    }

    async fn ack(&self, tag: u64) -> Result<(), NotificationError> {
        self.settle(tag)?;
        self.lock().acked += 1;
        Ok(())
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), NotificationError> {
        let (queue, mut envelope) = self.settle(tag)?;
        let mut state = self.lock();
        if requeue {
            envelope.redelivered = true;
            envelope.retry_count += 1;
            state.requeued += 1;
            if let Some(q) = state.queues.get_mut(&queue) {
                q.ready.push_back(envelope);
                q.available.notify_one();
            }
        } else {
            state.dead_letters.push(DeadLetter {
                queue,
                routing_key: envelope.routing_key,
                body: envelope.body,
                properties: envelope.properties,
                retry_count: envelope.retry_count,
                dead_lettered_at: Utc::now(),
            });
        }
        Ok(())
    }
}
