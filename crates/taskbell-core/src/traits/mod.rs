// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams of the notification engine.
//!
//! All async traits use `#[async_trait]` so they can be held as trait objects.

pub mod balancer;
pub mod channel;
pub mod provider;
pub mod sink;
pub mod transport;

pub use balancer::{BalancerStats, LoadBalancer, Selection};
pub use channel::ChannelStrategy;
pub use provider::{NotificationProvider, ProviderAuth};
pub use sink::NotificationSink;
pub use transport::ChannelTransport;
