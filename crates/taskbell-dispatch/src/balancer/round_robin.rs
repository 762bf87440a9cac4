// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use taskbell_core::{
    BalancerStats, ChannelStrategy, LoadBalancer, Message, NotificationError, Selection,
};
use tracing::{debug, warn};

use super::{BalancerConfig, average_latency, capacity, no_candidates, overloaded};

struct State {
    next: usize,
    stats: BalancerStats,
}

/// Rotates through candidates, skipping any whose queue is full.
///
/// The walk starts at the slot after the previous pick and wraps at most
/// once around the candidate list.
pub struct RoundRobinBalancer {
    config: BalancerConfig,
    state: Mutex<State>,
}

impl RoundRobinBalancer {
    pub fn new(config: BalancerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                next: 0,
                stats: BalancerStats {
                    strategy: "round_robin".to_string(),
                    ..BalancerStats::default()
                },
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select(
        &self,
        candidates: &[Arc<dyn ChannelStrategy>],
        message: &Message,
    ) -> Result<Selection, NotificationError> {
        if candidates.is_empty() {
            return Err(no_candidates());
        }

        let mut state = self.state();
        let len = candidates.len();
        let start = state.next % len;

        for offset in 0..len {
            let index = (start + offset) % len;
            let channel = &candidates[index];
            let queue_size = channel.load_metrics().queue_size;
            if queue_size >= capacity(channel.as_ref(), self.config.max_queue_size) {
                continue;
            }

            state.next = (index + 1) % len;
            state.stats.total_selections += 1;
            *state
                .stats
                .selections
                .entry(channel.id().to_string())
                .or_default() += 1;

            debug!(
                channel_id = channel.id(),
                message_id = %message.id,
                queue_size,
                "round robin selected channel"
            );
            return Ok(Selection {
                channel: Arc::clone(channel),
                estimated_latency: average_latency(channel.as_ref()),
                queue_position: Some(queue_size),
            });
        }

        state.stats.overloaded_rejections += 1;
        drop(state);
        let err = overloaded(candidates, self.config.max_queue_size);
        warn!(message_id = %message.id, error = %err, "every candidate channel is full");
        Err(err)
    }

    fn stats(&self) -> BalancerStats {
        self.state().stats.clone()
    }
}
