// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue-backed task relay for the Taskbell notification engine.
//!
//! Task lifecycle events are published to a durable topic exchange and
//! consumed back into a [`NotificationSink`](taskbell_core::NotificationSink)
//! with at-least-once ack/nack semantics. The `amqp` feature adds an
//! AMQP-backed broker; [`InMemoryBroker`] runs everything in process.

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod broker;
pub mod memory;
pub mod notification;
pub mod relay;

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
pub use broker::{Broker, Delivery, DeliveryStream, ExchangeKind, MessageProperties, topic_matches};
pub use memory::{DeadLetter, InMemoryBroker};
pub use notification::TaskNotification;
pub use relay::{RelayOutcome, TaskRelay};
