// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The outbound notification message and its delivery lifecycle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observer::Observers;
use crate::types::{ChannelType, Embed, MessageId, Priority, RetryConfig};

/// Content of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub embed: Option<Embed>,
}

/// How and where a message should be delivered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    #[serde(default)]
    pub priority: Priority,
    /// Overrides the provider retry policy for this message.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Pins delivery to one registered channel instance.
    #[serde(default)]
    pub target_channel: Option<String>,
    /// Restricts delivery to one kind of channel.
    #[serde(default)]
    pub channel_type: Option<ChannelType>,
    /// Platform-level destination, e.g. a Discord channel snowflake.
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Render as rich content (embed) where the platform supports it.
    #[serde(default)]
    pub rich: bool,
    #[serde(default)]
    pub track_delivery: bool,
    #[serde(default)]
    pub track_read: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Delivered,
    Failed,
    Retrying,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub channel_id: Option<String>,
}

/// Emitted to the message's observers on every status change.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub message_id: MessageId,
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
    pub attempts: u32,
}

/// A notification travelling through providers, handlers and channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub payload: MessagePayload,
    #[serde(default)]
    pub options: DeliveryOptions,
    #[serde(default)]
    pub delivery: DeliveryInfo,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(skip)]
    events: Observers<MessageEvent>,
}

impl Message {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            payload: MessagePayload {
                subject: None,
                content: content.into(),
                timestamp: Utc::now(),
                priority: Priority::Normal,
                embed: None,
            },
            options: DeliveryOptions::default(),
            delivery: DeliveryInfo::default(),
            metadata: HashMap::new(),
            events: Observers::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.payload.subject = Some(subject.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.payload.priority = priority;
        self.options.priority = priority;
        self
    }

    /// Attaches rich content and marks the message for rich rendering.
    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.payload.embed = Some(embed);
        self.options.rich = true;
        self
    }

    pub fn to_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.options.target_channel = Some(channel_id.into());
        self
    }

    pub fn with_channel_type(mut self, channel_type: ChannelType) -> Self {
        self.options.channel_type = Some(channel_type);
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.options.destination = Some(destination.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.options.retry = Some(retry);
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.options.expires_at = Some(at);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.options
            .expires_at
            .is_some_and(|expires| expires <= Utc::now())
    }

    /// Observers notified on every delivery status change.
    pub fn events(&self) -> &Observers<MessageEvent> {
        &self.events
    }

    /// Counts a new delivery attempt.
    pub fn begin_attempt(&mut self) -> u32 {
        self.delivery.attempts += 1;
        self.delivery.attempts
    }

    pub fn mark_retrying(&mut self) {
        self.transition(DeliveryStatus::Retrying);
    }

    pub fn mark_delivered(&mut self, channel_id: impl Into<String>) {
        self.delivery.delivered_at = Some(Utc::now());
        self.delivery.channel_id = Some(channel_id.into());
        self.delivery.last_error = None;
        self.transition(DeliveryStatus::Delivered);
    }

    pub fn mark_failed(&mut self, error: impl ToString) {
        self.delivery.last_error = Some(error.to_string());
        self.transition(DeliveryStatus::Failed);
    }

    fn transition(&mut self, to: DeliveryStatus) {
        let from = self.delivery.status;
        self.delivery.status = to;
        self.events.emit(&MessageEvent {
            message_id: self.id.clone(),
            from,
            to,
            attempts: self.delivery.attempts,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn new_message_is_pending() {
        let msg = Message::new("hello");
        assert_eq!(msg.delivery.status, DeliveryStatus::Pending);
        assert_eq!(msg.delivery.attempts, 0);
        assert!(!msg.is_expired());
        assert!(!msg.id.0.is_empty());
    }

    #[test]
    fn transitions_are_observed_in_order() {
        let mut msg = Message::new("hi");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        msg.events().subscribe(move |e: &MessageEvent| {
            sink.lock().unwrap().push((e.from, e.to));
        });

        msg.begin_attempt();
        msg.mark_failed("boom");
        msg.mark_retrying();
        msg.begin_attempt();
        msg.mark_delivered("c1");

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (DeliveryStatus::Pending, DeliveryStatus::Failed),
                (DeliveryStatus::Failed, DeliveryStatus::Retrying),
                (DeliveryStatus::Retrying, DeliveryStatus::Delivered),
            ]
        );
        assert_eq!(msg.delivery.attempts, 2);
        assert_eq!(msg.delivery.channel_id.as_deref(), Some("c1"));
        assert!(msg.delivery.last_error.is_none());
    }

    #[test]
    fn expired_message_detected() {
        let msg = Message::new("late").expires_at(Utc::now() - chrono::Duration::seconds(1));
        assert!(msg.is_expired());
    }

    #[test]
    fn serializes_without_observers() {
        let msg = Message::new("body").with_subject("subj").with_destination("123");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["payload"]["subject"], "subj");
        assert_eq!(json["options"]["destination"], "123");
        assert!(json.get("events").is_none());
    }
}
