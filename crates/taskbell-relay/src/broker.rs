// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message broker abstraction with topic exchanges and ack/nack delivery.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use taskbell_core::NotificationError;

/// How an exchange routes a publish to its bound queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    /// Exact routing key match.
    Direct,
    /// Dot-separated patterns with `*` (one word) and `#` (zero or more words).
    Topic,
    /// Every bound queue.
    Fanout,
}

/// Broker-level metadata travelling with a message body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageProperties {
    pub message_id: Option<String>,
    /// Message type, e.g. `task.created`.
    pub kind: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Survives a broker restart when the queue is durable.
    pub persistent: bool,
}

/// One message handed to a consumer. Must be settled with exactly one
/// [`Broker::ack`] or [`Broker::nack`] using its `tag`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub properties: MessageProperties,
    pub redelivered: bool,
    /// Times this message was requeued before this delivery.
    pub retry_count: u32,
}

pub type DeliveryStream = BoxStream<'static, Delivery>;

/// The subset of AMQP-style broker operations the relay needs.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), NotificationError>;

    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), NotificationError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), NotificationError>;

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<(), NotificationError>;

    /// Deliveries from `queue`, one at a time as the stream is polled.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream, NotificationError>;

    /// Removes the delivery from the broker.
    async fn ack(&self, tag: u64) -> Result<(), NotificationError>;

    /// Rejects the delivery: back onto its queue when `requeue`, otherwise
    /// to the dead-letter store.
    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), NotificationError>;

    /// Closes the broker connection once the relay has stopped.
    async fn shutdown(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Whether a topic `pattern` matches a dot-separated `routing_key`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && match_words(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && match_words(rest, &key[1..]),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn topic_wildcards() {
        assert!(topic_matches("#", "task.created"));
        assert!(topic_matches("#", ""));
        assert!(topic_matches("task.*", "task.created"));
        assert!(!topic_matches("task.*", "task.created.late"));
        assert!(topic_matches("task.#", "task"));
        assert!(topic_matches("task.#", "task.created.late"));
        assert!(topic_matches("*.created", "task.created"));
        assert!(!topic_matches("task.created", "task.deleted"));
        assert!(topic_matches("#.late", "task.created.late"));
    }

    proptest! {
        #[test]
        fn hash_matches_every_key(words in proptest::collection::vec("[a-z]{1,8}", 0..5)) {
            let key = words.join(".");
            prop_assert!(topic_matches("#", &key));
        }

        #[test]
        fn literal_pattern_matches_only_itself(
            a in "[a-z]{1,6}",
            b in "[a-z]{1,6}",
        ) {
            let key = format!("{a}.{b}");
            prop_assert!(topic_matches(&key, &key));
            let other = format!("{a}.{b}x");
            prop_assert!(!topic_matches(&key, &other));
        }
    }
}
