// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Latency and SLA tracking decorator.
//!
//! Breaches are observational: they are counted, logged and published to
//! [`PerformanceProvider::breaches`], never returned from `send`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use taskbell_config::SlaConfig;
use taskbell_core::{
    ChannelConfig, ChannelStatus, DeliveryOptions, DeliveryReceipt, Message, NotificationError,
    NotificationProvider, Observers, PerformanceStats, ProviderAuth, ProviderConfig,
    ProviderHealth, ProviderMetrics, Template,
};
use tokio::time::Instant;
use tracing::warn;

pub struct PerformanceProvider<P> {
    inner: P,
    sla: SlaConfig,
    stats: Mutex<PerformanceStats>,
    breaches: Observers<NotificationError>,
}

impl<P: NotificationProvider> PerformanceProvider<P> {
    pub fn new(inner: P, sla: SlaConfig) -> Self {
        Self {
            inner,
            sla,
            stats: Mutex::new(PerformanceStats::default()),
            breaches: Observers::new(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Receives an `SlaThresholdExceeded` error for every slow delivery.
    pub fn breaches(&self) -> &Observers<NotificationError> {
        &self.breaches
    }

    pub fn stats(&self) -> PerformanceStats {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, PerformanceStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, ok: bool, elapsed_ms: f64) -> bool {
        let mut stats = self.lock();
        let breached = ok && elapsed_ms > self.sla.threshold_ms as f64;
        if ok {
            stats.deliveries += 1;
            let n = stats.deliveries as f64;
            stats.average_delivery_ms = (stats.average_delivery_ms * (n - 1.0) + elapsed_ms) / n;
        } else {
            stats.failures += 1;
        }
        if breached {
            stats.sla_breaches += 1;
        }
        stats.failure_rate = stats.failures as f64 / (stats.deliveries + stats.failures) as f64;
        breached
    }
}

#[async_trait]
impl<P: NotificationProvider> NotificationProvider for PerformanceProvider<P> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn config(&self) -> &ProviderConfig {
        self.inner.config()
    }

    async fn initialize(&self, auth: ProviderAuth) -> Result<(), NotificationError> {
        self.inner.initialize(auth).await
    }

    async fn register_channel(&self, config: ChannelConfig) -> Result<(), NotificationError> {
        self.inner.register_channel(config).await
    }

    async fn unregister_channel(&self, channel_id: &str) -> Result<(), NotificationError> {
        self.inner.unregister_channel(channel_id).await
    }

    async fn register_template(&self, template: Template) -> Result<(), NotificationError> {
        self.inner.register_template(template).await
    }

    async fn send(&self, message: &mut Message) -> Result<Vec<DeliveryReceipt>, NotificationError> {
        let started = Instant::now();
        let result = self.inner.send(message).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if self.record(result.is_ok(), elapsed_ms) {
            let breach = NotificationError::SlaThresholdExceeded {
                provider_id: self.id().to_string(),
                message_id: Some(message.id.0.clone()),
                target_ms: self.sla.threshold_ms,
                actual_ms: elapsed_ms as u64,
            };
            warn!(
                provider_id = self.id(),
                message_id = %message.id,
                target_ms = self.sla.threshold_ms,
                actual_ms = elapsed_ms as u64,
                "delivery exceeded SLA threshold"
            );
            taskbell_prometheus::record_sla_breach(self.id());
            self.breaches.emit(&breach);
        }
        result
    }

    async fn render_template(
        &self,
        template_id: &str,
        variables: &HashMap<String, String>,
        options: DeliveryOptions,
    ) -> Result<Message, NotificationError> {
        self.inner.render_template(template_id, variables, options).await
    }

    /// Inner health, degraded when the observed failure rate is too high.
    async fn check_health(&self) -> ProviderHealth {
        let mut health = self.inner.check_health().await;
        let failure_rate = self.lock().failure_rate;
        if failure_rate > self.sla.max_failure_rate && health.status == ChannelStatus::Operational {
            health.status = ChannelStatus::Degraded;
            health.message = Some(format!(
                "failure rate {:.1}% exceeds {:.1}%",
                failure_rate * 100.0,
                self.sla.max_failure_rate * 100.0
            ));
        }
        health
    }

    fn metrics(&self) -> ProviderMetrics {
        let mut metrics = self.inner.metrics();
        metrics.performance = Some(self.stats());
        metrics
    }

    async fn shutdown(&self) -> Result<(), NotificationError> {
        self.inner.shutdown().await
    }
}
