// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use taskbell_core::{
    BalancerStats, ChannelStrategy, LoadBalancer, Message, NotificationError, Selection,
};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{BalancerConfig, average_latency, capacity, no_candidates, overloaded};

/// Cache entries not updated for this long are dropped, which also resets
/// the speculative load they carried.
pub const LOAD_CACHE_TTL: Duration = Duration::from_secs(60);

const CURRENT_WEIGHT: f64 = 0.6;
const PREDICTED_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone)]
struct LoadEntry {
    predicted_load: f64,
    queue_size: usize,
    last_updated: Instant,
}

struct State {
    cache: HashMap<String, LoadEntry>,
    stats: BalancerStats,
}

/// Picks the channel with the lowest effective load:
/// `(0.6 * current + 0.4 * predicted) * (1 + queue / max_queue)`, where
/// `current = throughput / target_throughput`.
///
/// Each pick bumps the winner's predicted load and queue size so that
/// back-to-back selections spread out before real metrics catch up.
pub struct LeastLoadedBalancer {
    config: BalancerConfig,
    state: Mutex<State>,
}

impl LeastLoadedBalancer {
    pub fn new(config: BalancerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                cache: HashMap::new(),
                stats: BalancerStats {
                    strategy: "least_loaded".to_string(),
                    ..BalancerStats::default()
                },
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn target(&self) -> f64 {
        if self.config.target_throughput > 0.0 {
            self.config.target_throughput
        } else {
            1.0
        }
    }

    /// Number of channels with a live cache entry.
    pub fn cached_channels(&self) -> usize {
        self.state().cache.len()
    }
}

impl LoadBalancer for LeastLoadedBalancer {
    fn name(&self) -> &'static str {
        "least_loaded"
    }

    fn select(
        &self,
        candidates: &[Arc<dyn ChannelStrategy>],
        message: &Message,
    ) -> Result<Selection, NotificationError> {
        if candidates.is_empty() {
            return Err(no_candidates());
        }

        let now = Instant::now();
        let target = self.target();
        let mut state = self.state();
        state
            .cache
            .retain(|_, entry| now.duration_since(entry.last_updated) <= LOAD_CACHE_TTL);

        let mut best: Option<(usize, f64, usize)> = None;
        for (index, channel) in candidates.iter().enumerate() {
            let load = channel.load_metrics();
            let max_queue = capacity(channel.as_ref(), self.config.max_queue_size);
            let current_load = load.throughput / target;

            let entry = state
                .cache
                .entry(channel.id().to_string())
                .or_insert_with(|| LoadEntry {
                    predicted_load: current_load,
                    queue_size: load.queue_size,
                    last_updated: now,
                });

            if load.queue_size >= max_queue {
                continue;
            }

            let queue_size = load.queue_size.max(entry.queue_size);
            let effective = (CURRENT_WEIGHT * current_load + PREDICTED_WEIGHT * entry.predicted_load)
                * (1.0 + queue_size as f64 / max_queue as f64);

            if best.is_none_or(|(_, lowest, _)| effective < lowest) {
                best = Some((index, effective, queue_size));
            }
        }

        let Some((index, effective, queue_size)) = best else {
            state.stats.overloaded_rejections += 1;
            drop(state);
            let err = overloaded(candidates, self.config.max_queue_size);
            warn!(message_id = %message.id, error = %err, "every candidate channel is full");
            return Err(err);
        };

        let channel = &candidates[index];
        if let Some(entry) = state.cache.get_mut(channel.id()) {
            entry.predicted_load += 1.0 / target;
            entry.queue_size = queue_size + 1;
            entry.last_updated = now;
        }
        state.stats.total_selections += 1;
        *state
            .stats
            .selections
            .entry(channel.id().to_string())
            .or_default() += 1;
        drop(state);

        debug!(
            channel_id = channel.id(),
            message_id = %message.id,
            effective_load = effective,
            "least loaded selected channel"
        );
        let latency = average_latency(channel.as_ref());
        Ok(Selection {
            channel: Arc::clone(channel),
            estimated_latency: latency.mul_f64(1.0 + effective),
            queue_position: Some(queue_size),
        })
    }

    fn stats(&self) -> BalancerStats {
        self.state().stats.clone()
    }
}
