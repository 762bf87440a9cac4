// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Load balancing strategy trait.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::NotificationError;
use crate::message::Message;
use crate::traits::channel::ChannelStrategy;

/// The channel picked for a message.
#[derive(Clone)]
pub struct Selection {
    pub channel: Arc<dyn ChannelStrategy>,
    pub estimated_latency: Duration,
    pub queue_position: Option<usize>,
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("channel", &self.channel.id())
            .field("estimated_latency", &self.estimated_latency)
            .field("queue_position", &self.queue_position)
            .finish()
    }
}

/// Selection counters kept by a balancer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BalancerStats {
    pub strategy: String,
    pub total_selections: u64,
    pub overloaded_rejections: u64,
    pub selections: BTreeMap<String, u64>,
}

/// Picks one channel from a candidate set given current load.
pub trait LoadBalancer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fails with `ChannelUnavailable` for an empty candidate list and
    /// `ChannelOverloaded` when every candidate is at capacity.
    fn select(
        &self,
        candidates: &[Arc<dyn ChannelStrategy>],
        message: &Message,
    ) -> Result<Selection, NotificationError>;

    fn stats(&self) -> BalancerStats;
}
