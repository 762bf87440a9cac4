// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Load balancing strategies used by the channel handler.

mod least_loaded;
mod round_robin;

use std::sync::Arc;
use std::time::Duration;

use taskbell_config::{BalancingStrategy, DispatchConfig};
use taskbell_core::{ChannelStrategy, LoadBalancer, NotificationError};

pub use least_loaded::LeastLoadedBalancer;
pub use round_robin::RoundRobinBalancer;

/// Defaults shared by both strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalancerConfig {
    /// Capacity for channels that do not set their own `max_queue_size`.
    pub max_queue_size: usize,
    /// Throughput (msgs/sec) treated as a load of 1.0.
    pub target_throughput: f64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            target_throughput: 10.0,
        }
    }
}

impl From<&DispatchConfig> for BalancerConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            target_throughput: config.target_throughput,
        }
    }
}

/// Builds the balancer named by the dispatch config.
pub fn from_config(config: &DispatchConfig) -> Arc<dyn LoadBalancer> {
    let defaults = BalancerConfig::from(config);
    match config.strategy {
        BalancingStrategy::RoundRobin => Arc::new(RoundRobinBalancer::new(defaults)),
        BalancingStrategy::LeastLoaded => Arc::new(LeastLoadedBalancer::new(defaults)),
    }
}

fn capacity(channel: &dyn ChannelStrategy, default: usize) -> usize {
    channel.config().max_queue_size.unwrap_or(default).max(1)
}

fn no_candidates() -> NotificationError {
    NotificationError::ChannelUnavailable {
        message: "no candidate channels to balance across".to_string(),
        channel_id: None,
    }
}

/// Overload error carrying the aggregate queue size and capacity of `candidates`.
fn overloaded(candidates: &[Arc<dyn ChannelStrategy>], default: usize) -> NotificationError {
    let (total_queue_size, capacity) = candidates.iter().fold((0, 0), |(queued, cap), c| {
        (
            queued + c.load_metrics().queue_size,
            cap + capacity(c.as_ref(), default),
        )
    });
    NotificationError::ChannelOverloaded {
        total_queue_size,
        capacity,
    }
}

fn average_latency(channel: &dyn ChannelStrategy) -> Duration {
    Duration::from_secs_f64(channel.metrics().average_latency_ms.max(0.0) / 1000.0)
}
