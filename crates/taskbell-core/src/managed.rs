// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ManagedChannel`] applies the channel contract on top of a transport.
//!
//! The wrapper owns everything that is common to every channel kind:
//! compatibility gating, rate limiting, per-operation timeouts, running
//! metrics, the health state machine, in-flight accounting for load
//! balancers, and idempotent disposal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::NotificationError;
use crate::message::Message;
use crate::rate_limit::RateLimiter;
use crate::traits::{ChannelStrategy, ChannelTransport};
use crate::types::{
    ChannelConfig, ChannelHealth, ChannelMetrics, ChannelStatus, ChannelType, DeliveryReceipt,
    LoadBalancingMetrics,
};

/// Consecutive connectivity failures that escalate a channel to `Error`.
pub const ERROR_ESCALATION_THRESHOLD: u32 = 3;

/// Trailing window used for throughput.
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(60);

struct ChannelState {
    metrics: ChannelMetrics,
    health: ChannelHealth,
    limiter: RateLimiter,
    recent_sends: VecDeque<Instant>,
}

/// A channel strategy built from a [`ChannelTransport`].
pub struct ManagedChannel<T: ChannelTransport> {
    config: ChannelConfig,
    transport: T,
    state: Mutex<ChannelState>,
    in_flight: AtomicUsize,
    disposed: AtomicBool,
}

/// Decrements the in-flight counter when a send finishes, however it ends.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T: ChannelTransport> ManagedChannel<T> {
    /// Wraps `transport`. Fails if the config type differs from the transport's.
    pub fn new(config: ChannelConfig, transport: T) -> Result<Self, NotificationError> {
        if config.channel_type != transport.channel_type() {
            return Err(NotificationError::ChannelCreation {
                channel_id: config.id.clone(),
                message: format!(
                    "config type {} does not match transport type {}",
                    config.channel_type,
                    transport.channel_type()
                ),
                source: None,
            });
        }
        let limiter = RateLimiter::new(config.id.clone(), config.rate_limits.clone());
        Ok(Self {
            config,
            transport,
            state: Mutex::new(ChannelState {
                metrics: ChannelMetrics::default(),
                health: ChannelHealth::default(),
                limiter,
                recent_sends: VecDeque::new(),
            }),
            in_flight: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ChannelStatus, message: Option<String>) {
        let mut state = self.state();
        state.health.status = status;
        state.health.message = message;
    }

    fn record_success(&self, latency: Duration) {
        let now = Instant::now();
        let mut state = self.state();
        state
            .metrics
            .record_success(latency.as_secs_f64() * 1000.0);
        state.recent_sends.push_back(now);
        prune(&mut state.recent_sends, now);
    }

    fn record_failure(&self) {
        self.state().metrics.record_failure();
    }
}

fn prune(sends: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = sends.front() {
        if now.duration_since(*front) > THROUGHPUT_WINDOW {
            sends.pop_front();
        } else {
            break;
        }
    }
}

#[async_trait]
impl<T: ChannelTransport> ChannelStrategy for ManagedChannel<T> {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn channel_type(&self) -> ChannelType {
        self.config.channel_type
    }

    fn config(&self) -> &ChannelConfig {
        &self.config
    }

    async fn initialize(&self) -> Result<(), NotificationError> {
        let timeout = self.config.timeout();
        let result = match tokio::time::timeout(timeout, self.transport.connect()).await {
            Ok(result) => result,
            Err(_) => Err(NotificationError::ChannelUnavailable {
                message: format!("connect timeout after {}ms", timeout.as_millis()),
                channel_id: Some(self.config.id.clone()),
            }),
        };

        match result {
            Ok(()) => {
                self.set_status(ChannelStatus::Operational, None);
                info!(channel_id = %self.config.id, channel_type = %self.config.channel_type, "channel initialized");
                Ok(())
            }
            Err(e) => {
                self.set_status(ChannelStatus::Error, Some(e.to_string()));
                warn!(channel_id = %self.config.id, error = %e, "channel initialization failed");
                Err(e)
            }
        }
    }

    fn can_handle(&self, message: &Message) -> bool {
        if !self.config.enabled || self.disposed.load(Ordering::SeqCst) || message.is_expired() {
            return false;
        }
        if message
            .options
            .channel_type
            .is_some_and(|t| t != self.config.channel_type)
        {
            return false;
        }
        if message
            .options
            .target_channel
            .as_deref()
            .is_some_and(|target| target != self.config.id)
        {
            return false;
        }
        self.transport.accepts(message)
    }

    async fn send(&self, message: &Message) -> Result<DeliveryReceipt, NotificationError> {
        if !self.can_handle(message) {
            return Err(NotificationError::ChannelIncompatible {
                channel_id: self.config.id.clone(),
                message_id: message.id.0.clone(),
            });
        }

        {
            let mut state = self.state();
            match state.limiter.try_acquire(Instant::now()) {
                Ok(()) => {
                    if state.health.status == ChannelStatus::RateLimited {
                        state.health.status = ChannelStatus::Operational;
                        state.health.message = None;
                        debug!(channel_id = %self.config.id, "rate limit window cleared");
                    }
                }
                Err(e) => {
                    state.health.status = ChannelStatus::RateLimited;
                    state.health.message = Some(e.to_string());
                    drop(state);
                    warn!(channel_id = %self.config.id, message_id = %message.id, "channel rate limited");
                    return Err(e);
                }
            }
        }

        let _in_flight = InFlight::enter(&self.in_flight);
        let timeout = self.config.timeout();
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.transport.deliver(message)).await;
        let latency = started.elapsed();

        match outcome {
            Ok(Ok(external_id)) => {
                self.record_success(latency);
                debug!(
                    channel_id = %self.config.id,
                    message_id = %message.id,
                    latency_ms = latency.as_millis() as u64,
                    "message delivered"
                );
                Ok(DeliveryReceipt {
                    message_id: message.id.clone(),
                    channel_id: self.config.id.clone(),
                    external_id,
                    latency_ms: latency.as_secs_f64() * 1000.0,
                    delivered_at: Utc::now(),
                })
            }
            Ok(Err(e)) => {
                self.record_failure();
                warn!(channel_id = %self.config.id, message_id = %message.id, error = %e, "delivery failed");
                Err(e)
            }
            Err(_) => {
                self.record_failure();
                warn!(channel_id = %self.config.id, message_id = %message.id, "delivery timed out");
                Err(NotificationError::MessageSend {
                    message: format!("send timeout after {}ms", timeout.as_millis()),
                    channel_id: Some(self.config.id.clone()),
                    message_id: Some(message.id.0.clone()),
                    attempts: None,
                    source: None,
                })
            }
        }
    }

    async fn check_health(&self) -> ChannelHealth {
        if self.disposed.load(Ordering::SeqCst) {
            let mut state = self.state();
            state.health.status = ChannelStatus::Down;
            state.health.last_checked = Some(Utc::now());
            return state.health.clone();
        }

        let result = self.test_connection().await;
        let mut state = self.state();
        state.health.last_checked = Some(Utc::now());
        match result {
            Ok(latency) => {
                state.health.status = ChannelStatus::Operational;
                state.health.consecutive_errors = 0;
                state.health.latency_ms = Some(latency.as_secs_f64() * 1000.0);
                state.health.message = None;
            }
            Err(e) => {
                state.health.consecutive_errors += 1;
                state.health.status =
                    if state.health.consecutive_errors >= ERROR_ESCALATION_THRESHOLD {
                        ChannelStatus::Error
                    } else {
                        ChannelStatus::Degraded
                    };
                state.health.message = Some(e.to_string());
                warn!(
                    channel_id = %self.config.id,
                    consecutive_errors = state.health.consecutive_errors,
                    status = %state.health.status,
                    error = %e,
                    "connectivity test failed"
                );
            }
        }
        state.health.clone()
    }

    async fn test_connection(&self) -> Result<Duration, NotificationError> {
        let timeout = self.config.timeout();
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.transport.ping()).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(NotificationError::ChannelUnavailable {
                message: format!("connectivity test timeout after {}ms", timeout.as_millis()),
                channel_id: Some(self.config.id.clone()),
            }),
        }
    }

    fn metrics(&self) -> ChannelMetrics {
        self.state().metrics.clone()
    }

    fn health(&self) -> ChannelHealth {
        self.state().health.clone()
    }

    fn load_metrics(&self) -> LoadBalancingMetrics {
        let now = Instant::now();
        let mut state = self.state();
        prune(&mut state.recent_sends, now);
        let queue_size = self.in_flight.load(Ordering::SeqCst);
        LoadBalancingMetrics {
            active_connections: queue_size,
            queue_size,
            throughput: state.recent_sends.len() as f64 / THROUGHPUT_WINDOW.as_secs_f64(),
            last_balanced: Some(Utc::now()),
        }
    }

    async fn dispose(&self) -> Result<(), NotificationError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.set_status(ChannelStatus::Down, Some("disposed".into()));
        info!(channel_id = %self.config.id, "channel disposed");
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::error::ErrorCode;
    use crate::types::RateLimits;

    /// Transport whose ping and deliver outcomes are scripted per call.
    #[derive(Default)]
    struct ScriptedTransport {
        pings: Mutex<VecDeque<bool>>,
        delivers: Mutex<VecDeque<Result<Duration, ()>>>,
        closes: AtomicU32,
        reject_all: bool,
    }

    impl ScriptedTransport {
        fn with_pings(pings: &[bool]) -> Self {
            Self {
                pings: Mutex::new(pings.iter().copied().collect()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ChannelTransport for Arc<ScriptedTransport> {
        fn channel_type(&self) -> ChannelType {
            ChannelType::Webhook
        }

        async fn connect(&self) -> Result<(), NotificationError> {
            Ok(())
        }

        fn accepts(&self, _message: &Message) -> bool {
            !self.reject_all
        }

        async fn deliver(&self, _message: &Message) -> Result<Option<String>, NotificationError> {
            let next = self.delivers.lock().unwrap().pop_front().unwrap_or(Ok(Duration::ZERO));
            match next {
                Ok(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(Some("ext-1".into()))
                }
                Err(()) => Err(NotificationError::send_failed("remote rejected")),
            }
        }

        async fn ping(&self) -> Result<(), NotificationError> {
            if self.pings.lock().unwrap().pop_front().unwrap_or(true) {
                Ok(())
            } else {
                Err(NotificationError::ChannelUnavailable {
                    message: "connection refused".into(),
                    channel_id: None,
                })
            }
        }

        async fn close(&self) -> Result<(), NotificationError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn channel(transport: Arc<ScriptedTransport>) -> ManagedChannel<Arc<ScriptedTransport>> {
        ManagedChannel::new(ChannelConfig::new("hook", ChannelType::Webhook), transport).unwrap()
    }

    #[tokio::test]
    async fn type_mismatch_is_rejected() {
        let err = ManagedChannel::new(
            ChannelConfig::new("x", ChannelType::Discord),
            Arc::new(ScriptedTransport::default()),
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), ErrorCode::ChannelCreationFailed);
    }

    #[tokio::test]
    async fn initialize_sets_operational() {
        let ch = channel(Arc::new(ScriptedTransport::default()));
        assert_eq!(ch.health().status, ChannelStatus::Initializing);
        ch.initialize().await.unwrap();
        assert_eq!(ch.health().status, ChannelStatus::Operational);
    }

    #[tokio::test(start_paused = true)]
    async fn average_latency_is_mean_of_successes() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.delivers.lock().unwrap().extend([
            Ok(Duration::from_millis(10)),
            Ok(Duration::from_millis(20)),
            Ok(Duration::from_millis(60)),
        ]);
        let ch = channel(transport);
        ch.initialize().await.unwrap();
        let msg = Message::new("hi");
        for _ in 0..3 {
            ch.send(&msg).await.unwrap();
        }
        let metrics = ch.metrics();
        assert_eq!(metrics.messages_sent, 3);
        assert!((metrics.average_latency_ms - 30.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn failure_updates_error_rate() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .delivers
            .lock()
            .unwrap()
            .extend([Ok(Duration::ZERO), Err(())]);
        let ch = channel(transport);
        ch.initialize().await.unwrap();
        let msg = Message::new("hi");
        ch.send(&msg).await.unwrap();
        assert!(ch.send(&msg).await.is_err());
        let m = ch.metrics();
        assert_eq!(m.messages_failed, 1);
        assert!((m.error_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn incompatible_message_fails_without_touching_metrics() {
        let transport = Arc::new(ScriptedTransport {
            reject_all: true,
            ..Default::default()
        });
        let ch = channel(transport);
        let err = ch.send(&Message::new("x")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ChannelIncompatible);
        assert_eq!(ch.metrics().messages_failed, 0);
    }

    #[tokio::test]
    async fn targeting_and_type_filters() {
        let ch = channel(Arc::new(ScriptedTransport::default()));
        assert!(ch.can_handle(&Message::new("a").to_channel("hook")));
        assert!(!ch.can_handle(&Message::new("a").to_channel("other")));
        assert!(!ch.can_handle(&Message::new("a").with_channel_type(ChannelType::Discord)));
    }

    #[tokio::test]
    async fn three_failed_checks_escalate_to_error_and_success_resets() {
        let ch = channel(Arc::new(ScriptedTransport::with_pings(&[
            false, false, true, false, false, false,
        ])));
        ch.initialize().await.unwrap();

        assert_eq!(ch.check_health().await.status, ChannelStatus::Degraded);
        assert_eq!(ch.check_health().await.status, ChannelStatus::Degraded);
        let h = ch.check_health().await;
        assert_eq!(h.status, ChannelStatus::Operational);
        assert_eq!(h.consecutive_errors, 0);

        assert_eq!(ch.check_health().await.status, ChannelStatus::Degraded);
        assert_eq!(ch.check_health().await.status, ChannelStatus::Degraded);
        let h = ch.check_health().await;
        assert_eq!(h.status, ChannelStatus::Error);
        assert_eq!(h.consecutive_errors, 3);
        assert!(h.last_checked.is_some());
    }

    #[tokio::test]
    async fn test_connection_surfaces_failure() {
        let ch = channel(Arc::new(ScriptedTransport::with_pings(&[false])));
        let err = ch.test_connection().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ChannelUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_marks_channel() {
        let transport = Arc::new(ScriptedTransport::default());
        let config = ChannelConfig::new("hook", ChannelType::Webhook).with_rate_limits(RateLimits {
            per_second: Some(1),
            ..Default::default()
        });
        let ch = ManagedChannel::new(config, transport).unwrap();
        ch.initialize().await.unwrap();
        let msg = Message::new("x");
        ch.send(&msg).await.unwrap();
        let err = ch.send(&msg).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RateLimitExceeded);
        assert_eq!(ch.health().status, ChannelStatus::RateLimited);
    }

    #[tokio::test(start_paused = true)]
    async fn admitted_send_clears_rate_limited_status() {
        let transport = Arc::new(ScriptedTransport::default());
        let config = ChannelConfig::new("hook", ChannelType::Webhook).with_rate_limits(RateLimits {
            per_second: Some(1),
            ..Default::default()
        });
        let ch = ManagedChannel::new(config, transport).unwrap();
        ch.initialize().await.unwrap();
        let msg = Message::new("x");
        ch.send(&msg).await.unwrap();
        assert!(ch.send(&msg).await.is_err());
        assert_eq!(ch.health().status, ChannelStatus::RateLimited);

        tokio::time::advance(Duration::from_secs(2)).await;
        ch.send(&msg).await.unwrap();
        let health = ch.health();
        assert_eq!(health.status, ChannelStatus::Operational);
        assert_eq!(health.message, None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_delivery_times_out_as_send_failure() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .delivers
            .lock()
            .unwrap()
            .push_back(Ok(Duration::from_secs(30)));
        let config =
            ChannelConfig::new("hook", ChannelType::Webhook).with_timeout(Duration::from_millis(50));
        let ch = ManagedChannel::new(config, transport).unwrap();
        let err = ch.send(&Message::new("x")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MessageSendFailed);
        assert!(err.to_string().contains("timeout"));
        assert_eq!(ch.load_metrics().queue_size, 0);
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let transport = Arc::new(ScriptedTransport::default());
        let ch = channel(Arc::clone(&transport));
        ch.dispose().await.unwrap();
        ch.dispose().await.unwrap();
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert_eq!(ch.health().status, ChannelStatus::Down);
        assert!(!ch.can_handle(&Message::new("x")));
    }
}
