// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Taskbell.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskbell_core::{ChannelConfig, ChannelType, ProviderConfig, ProviderRateLimits, RateLimits, RetryConfig};

/// Top-level Taskbell configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskbellConfig {
    /// Bot identity and logging.
    #[serde(default)]
    pub bot: BotConfig,

    /// Discord credentials shared by Discord channels.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Notification provider identity and policy.
    #[serde(default)]
    pub provider: ProviderSection,

    /// Channel handler and load balancer settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Retry decorator policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Performance decorator thresholds.
    #[serde(default)]
    pub sla: SlaConfig,

    /// Queue-backed task relay topology.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Prometheus endpoint settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Channel instances registered at startup.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_bot_name() -> String {
    "taskbell".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Discord bot credentials.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordConfig {
    /// Bot token. Channels may override it with a `bot_token` setting.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Channel used when a message carries no destination.
    #[serde(default)]
    pub default_channel_id: Option<String>,
}

/// Provider section; converted into a [`ProviderConfig`] at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    #[serde(default = "default_provider_id")]
    pub id: String,

    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_supported_channels")]
    pub supported_channels: Vec<ChannelType>,

    /// Limit applied across every channel of the provider.
    #[serde(default)]
    pub global_rate_limits: RateLimits,

    /// Per-channel overrides keyed by channel id.
    #[serde(default)]
    pub channel_rate_limits: HashMap<String, RateLimits>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            id: default_provider_id(),
            name: default_provider_name(),
            enabled: true,
            supported_channels: default_supported_channels(),
            global_rate_limits: RateLimits::default(),
            channel_rate_limits: HashMap::new(),
        }
    }
}

impl TaskbellConfig {
    /// Builds the provider config from the provider and retry sections.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            id: self.provider.id.clone(),
            name: self.provider.name.clone(),
            enabled: self.provider.enabled,
            supported_channels: self.provider.supported_channels.clone(),
            retry: self.retry.clone(),
            rate_limits: ProviderRateLimits {
                global: self.provider.global_rate_limits.clone(),
                per_channel: self.provider.channel_rate_limits.clone(),
            },
        }
    }

    /// Serializes the effective configuration back to TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn default_provider_id() -> String {
    "taskbell".to_string()
}

fn default_provider_name() -> String {
    "Taskbell notifications".to_string()
}

fn default_supported_channels() -> Vec<ChannelType> {
    vec![ChannelType::Discord, ChannelType::Webhook]
}

fn default_true() -> bool {
    true
}

/// Load balancing algorithm used by the channel handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancingStrategy {
    #[default]
    RoundRobin,
    LeastLoaded,
}

/// Channel handler settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    #[serde(default)]
    pub strategy: BalancingStrategy,

    /// Maximum registered channels of one type.
    #[serde(default = "default_max_channels_per_type")]
    pub max_channels_per_type: usize,

    /// Delay between the end of one health sweep and the start of the next.
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    /// Queue capacity for channels without their own `max_queue_size`.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Throughput (msgs/sec) considered full load by the least-loaded balancer.
    #[serde(default = "default_target_throughput")]
    pub target_throughput: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: BalancingStrategy::default(),
            max_channels_per_type: default_max_channels_per_type(),
            health_check_interval_secs: default_health_check_interval_secs(),
            max_queue_size: default_max_queue_size(),
            target_throughput: default_target_throughput(),
        }
    }
}

fn default_max_channels_per_type() -> usize {
    5
}

fn default_health_check_interval_secs() -> u64 {
    30
}

fn default_max_queue_size() -> usize {
    100
}

fn default_target_throughput() -> f64 {
    10.0
}

/// Performance decorator thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SlaConfig {
    /// Deliveries slower than this raise an SLA breach.
    #[serde(default = "default_sla_threshold_ms")]
    pub threshold_ms: u64,

    /// Observed failure rate above which health is forced to degraded.
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            threshold_ms: default_sla_threshold_ms(),
            max_failure_rate: default_max_failure_rate(),
        }
    }
}

fn default_sla_threshold_ms() -> u64 {
    5_000
}

fn default_max_failure_rate() -> f64 {
    0.10
}

/// Queue-backed task relay topology.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Durable topic exchange task events are published to.
    #[serde(default = "default_exchange")]
    pub exchange: String,

    /// Durable queue the relay consumes from.
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Binding pattern between queue and exchange.
    #[serde(default = "default_binding_key")]
    pub binding_key: String,

    /// Where consumed task events are dispatched.
    #[serde(default)]
    pub route: RelayRoute,

    /// AMQP broker URL (`amqp://` or `amqps://`). Unset runs the relay on
    /// the in-process broker.
    #[serde(default)]
    pub url: Option<String>,

    /// Unacknowledged deliveries the broker may hand out at once.
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    /// Requeues allowed per message before a transient failure is
    /// dead-lettered.
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,

    /// Pause before a failed delivery is requeued.
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,
}

impl RelayConfig {
    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }
}

/// Delivery path for relayed task events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayRoute {
    /// One load-balanced channel through the channel handler.
    #[default]
    Handler,
    /// Every eligible channel through the retrying provider stack.
    Provider,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exchange: default_exchange(),
            queue: default_queue(),
            binding_key: default_binding_key(),
            route: RelayRoute::default(),
            url: None,
            prefetch_count: default_prefetch_count(),
            max_redeliveries: default_max_redeliveries(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
        }
    }
}

fn default_exchange() -> String {
    "notifications".to_string()
}

fn default_queue() -> String {
    "task-notifications".to_string()
}

fn default_binding_key() -> String {
    "#".to_string()
}

fn default_prefetch_count() -> u16 {
    1
}

fn default_max_redeliveries() -> u32 {
    5
}

fn default_redelivery_delay_ms() -> u64 {
    1_000
}

/// Prometheus and health endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_bind")]
    pub bind_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_metrics_bind(),
        }
    }
}

fn default_metrics_bind() -> String {
    "127.0.0.1:9464".to_string()
}
