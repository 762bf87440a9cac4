// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder collects these.

use std::time::Duration;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use taskbell_core::{ChannelStatus, ChannelType};

/// Registers all Taskbell metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "taskbell_messages_sent_total",
        "Channel sends by channel and outcome"
    );
    describe_counter!("taskbell_retries_total", "Delivery retries scheduled");
    describe_counter!(
        "taskbell_sla_breaches_total",
        "Deliveries slower than the SLA threshold"
    );
    describe_counter!(
        "taskbell_relay_deliveries_total",
        "Relay deliveries by acknowledgement outcome"
    );
    describe_histogram!(
        "taskbell_delivery_latency_seconds",
        "Channel delivery latency in seconds"
    );
    describe_gauge!("taskbell_channel_queue_size", "In-flight sends per channel");
    describe_gauge!(
        "taskbell_channel_health",
        "Channel health gauge, 1 when operational and 0 when errored or down"
    );
}

/// Records one channel send; latency is only recorded for successes.
pub fn record_send(channel_id: &str, channel_type: ChannelType, ok: bool, latency: Option<Duration>) {
    let outcome = if ok { "success" } else { "failure" };
    metrics::counter!(
        "taskbell_messages_sent_total",
        "channel" => channel_id.to_string(),
        "type" => channel_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    if let Some(latency) = latency {
        metrics::histogram!(
            "taskbell_delivery_latency_seconds",
            "channel" => channel_id.to_string()
        )
        .record(latency.as_secs_f64());
    }
}

pub fn record_retry(provider_id: &str) {
    metrics::counter!("taskbell_retries_total", "provider" => provider_id.to_string()).increment(1);
}

pub fn record_sla_breach(provider_id: &str) {
    metrics::counter!("taskbell_sla_breaches_total", "provider" => provider_id.to_string())
        .increment(1);
}

/// `outcome` is `ack`, `nack_requeue` or `nack_drop`.
pub fn record_relay_outcome(outcome: &'static str) {
    metrics::counter!("taskbell_relay_deliveries_total", "outcome" => outcome).increment(1);
}

pub fn set_queue_size(channel_id: &str, size: usize) {
    metrics::gauge!("taskbell_channel_queue_size", "channel" => channel_id.to_string())
        .set(size as f64);
}

pub fn set_channel_health(channel_id: &str, status: ChannelStatus) {
    metrics::gauge!("taskbell_channel_health", "channel" => channel_id.to_string())
        .set(status.as_gauge());
}
