// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by channels, balancers, providers and the relay.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of delivery backend a channel talks to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Discord,
    Webhook,
    Email,
    Sms,
    Push,
}

/// Health state of a channel or rolled-up provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Initializing,
    Operational,
    Degraded,
    Error,
    Down,
    RateLimited,
    Maintenance,
}

impl ChannelStatus {
    /// Min-health-wins rollup: any `Down` is down, any other non-operational
    /// status is degraded, otherwise operational. An empty set is operational.
    pub fn rollup<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ChannelStatus>,
    {
        let mut overall = ChannelStatus::Operational;
        for status in statuses {
            match status {
                ChannelStatus::Down => return ChannelStatus::Down,
                ChannelStatus::Operational => {}
                _ => overall = ChannelStatus::Degraded,
            }
        }
        overall
    }

    /// Numeric encoding used for gauges.
    pub fn as_gauge(self) -> f64 {
        match self {
            ChannelStatus::Operational => 1.0,
            ChannelStatus::Degraded | ChannelStatus::RateLimited => 0.5,
            ChannelStatus::Initializing | ChannelStatus::Maintenance => 0.25,
            ChannelStatus::Error | ChannelStatus::Down => 0.0,
        }
    }
}

/// Message priority, used for ordering hints and embed colouring.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Retry-with-backoff policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the zero-based `retry`-th failure:
    /// `initial_delay * backoff_factor^retry`, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(retry as i32);
        let delay_ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Sliding-window send limits. `None` means unlimited for that window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimits {
    #[serde(default)]
    pub per_second: Option<u32>,
    #[serde(default)]
    pub per_minute: Option<u32>,
    #[serde(default)]
    pub per_hour: Option<u32>,
}

impl RateLimits {
    pub fn is_unlimited(&self) -> bool {
        self.per_second.is_none() && self.per_minute.is_none() && self.per_hour.is_none()
    }
}

/// Configuration for a single channel instance.
///
/// `channel_type` is fixed at construction; handlers enforce per-type caps on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    pub id: String,

    #[serde(rename = "type")]
    pub channel_type: ChannelType,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub rate_limits: RateLimits,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-operation timeout for sends and connectivity tests.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Queue capacity used by load balancers; falls back to the balancer default.
    #[serde(default)]
    pub max_queue_size: Option<usize>,

    /// Transport-specific settings (tokens, URLs, headers).
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl ChannelConfig {
    pub fn new(id: impl Into<String>, channel_type: ChannelType) -> Self {
        Self {
            id: id.into(),
            channel_type,
            enabled: true,
            rate_limits: RateLimits::default(),
            retry: RetryConfig::default(),
            timeout_ms: default_timeout_ms(),
            max_queue_size: None,
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_max_queue_size(mut self, max: usize) -> Self {
        self.max_queue_size = Some(max);
        self
    }

    pub fn with_rate_limits(mut self, limits: RateLimits) -> Self {
        self.rate_limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Cumulative send counters for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelMetrics {
    pub messages_sent: u64,
    pub messages_failed: u64,
    pub average_latency_ms: f64,
    pub error_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl Default for ChannelMetrics {
    fn default() -> Self {
        Self {
            messages_sent: 0,
            messages_failed: 0,
            average_latency_ms: 0.0,
            error_rate: 0.0,
            last_updated: Utc::now(),
        }
    }
}

impl ChannelMetrics {
    /// Running mean over successful sends: `(prev * (n - 1) + latency) / n`.
    pub fn record_success(&mut self, latency_ms: f64) {
        self.messages_sent += 1;
        let n = self.messages_sent as f64;
        self.average_latency_ms = (self.average_latency_ms * (n - 1.0) + latency_ms) / n;
        self.error_rate = self.messages_failed as f64 / self.messages_sent.max(1) as f64;
        self.last_updated = Utc::now();
    }

    pub fn record_failure(&mut self) {
        self.messages_failed += 1;
        self.error_rate = self.messages_failed as f64 / self.messages_sent.max(1) as f64;
        self.last_updated = Utc::now();
    }
}

/// Last observed health of a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelHealth {
    pub status: ChannelStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl Default for ChannelHealth {
    fn default() -> Self {
        Self {
            status: ChannelStatus::Initializing,
            last_checked: None,
            consecutive_errors: 0,
            latency_ms: None,
            message: None,
        }
    }
}

/// Load snapshot consumed by load balancers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadBalancingMetrics {
    pub active_connections: usize,
    pub queue_size: usize,
    /// Successful sends per second over the trailing window.
    pub throughput: f64,
    pub last_balanced: Option<DateTime<Utc>>,
}

/// Rich chat-platform content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Proof of a successful delivery through one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReceipt {
    pub message_id: MessageId,
    pub channel_id: String,
    /// Identifier assigned by the remote platform, if any.
    pub external_id: Option<String>,
    pub latency_ms: f64,
    pub delivered_at: DateTime<Utc>,
}

/// Global and per-channel rate limit policy of a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderRateLimits {
    #[serde(default)]
    pub global: RateLimits,
    #[serde(default)]
    pub per_channel: HashMap<String, RateLimits>,
}

/// Provider identity and policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub supported_channels: Vec<ChannelType>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limits: ProviderRateLimits,
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, supported: Vec<ChannelType>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            supported_channels: supported,
            retry: RetryConfig::default(),
            rate_limits: ProviderRateLimits::default(),
        }
    }

    pub fn supports(&self, channel_type: ChannelType) -> bool {
        self.supported_channels.contains(&channel_type)
    }
}

/// Rolled-up provider health with the per-channel detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub status: ChannelStatus,
    pub channels: BTreeMap<String, ChannelHealth>,
    pub checked_at: DateTime<Utc>,
    pub message: Option<String>,
}

/// Delivery timings observed by the performance decorator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub deliveries: u64,
    pub failures: u64,
    pub average_delivery_ms: f64,
    pub sla_breaches: u64,
    pub failure_rate: f64,
}

/// Aggregated provider counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderMetrics {
    pub provider_id: String,
    pub messages_sent: u64,
    pub messages_failed: u64,
    pub average_latency_ms: f64,
    pub error_rate: f64,
    pub channels: BTreeMap<String, ChannelMetrics>,
    pub performance: Option<PerformanceStats>,
}

impl ProviderMetrics {
    /// Sums counters and computes the sent-weighted mean latency.
    pub fn aggregate(provider_id: &str, channels: BTreeMap<String, ChannelMetrics>) -> Self {
        let sent: u64 = channels.values().map(|m| m.messages_sent).sum();
        let failed: u64 = channels.values().map(|m| m.messages_failed).sum();
        let weighted: f64 = channels
            .values()
            .map(|m| m.average_latency_ms * m.messages_sent as f64)
            .sum();
        Self {
            provider_id: provider_id.to_string(),
            messages_sent: sent,
            messages_failed: failed,
            average_latency_ms: if sent == 0 { 0.0 } else { weighted / sent as f64 },
            error_rate: failed as f64 / sent.max(1) as f64,
            channels,
            performance: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollup_min_health_wins() {
        use ChannelStatus::*;
        assert_eq!(ChannelStatus::rollup([Operational, Operational]), Operational);
        assert_eq!(ChannelStatus::rollup([Operational, RateLimited]), Degraded);
        assert_eq!(ChannelStatus::rollup([Error, Down, Operational]), Down);
        assert_eq!(ChannelStatus::rollup(Vec::new()), Operational);
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 100,
            backoff_factor: 2.0,
            max_delay_ms: 350,
        };
        assert_eq!(retry.delay_for(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for(2), Duration::from_millis(350));
        assert_eq!(retry.delay_for(9), Duration::from_millis(350));
    }

    #[test]
    fn channel_config_parses_type_field() {
        let json = r#"{"id":"alerts","type":"webhook","settings":{"url":"http://x"}}"#;
        let config: ChannelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.channel_type, ChannelType::Webhook);
        assert!(config.enabled);
        assert_eq!(config.setting("url"), Some("http://x"));
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn error_rate_is_failures_over_sent() {
        let mut m = ChannelMetrics::default();
        m.record_success(10.0);
        m.record_success(30.0);
        m.record_failure();
        assert_eq!(m.messages_sent, 2);
        assert_eq!(m.messages_failed, 1);
        assert!((m.error_rate - 0.5).abs() < f64::EPSILON);
        assert!((m.average_latency_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_weights_latency_by_sent() {
        let mut a = ChannelMetrics::default();
        a.record_success(10.0);
        let mut b = ChannelMetrics::default();
        for _ in 0..3 {
            b.record_success(50.0);
        }
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), a);
        map.insert("b".to_string(), b);
        let agg = ProviderMetrics::aggregate("p", map);
        assert_eq!(agg.messages_sent, 4);
        assert!((agg.average_latency_ms - 40.0).abs() < 1e-9);
    }

    proptest::proptest! {
        #[test]
        fn running_average_matches_arithmetic_mean(latencies in proptest::collection::vec(0.0f64..10_000.0, 1..64)) {
            let mut m = ChannelMetrics::default();
            for l in &latencies {
                m.record_success(*l);
            }
            let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
            proptest::prop_assert!((m.average_latency_ms - mean).abs() < 1e-6);
        }
    }
}
