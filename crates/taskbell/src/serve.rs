// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `taskbell serve` and `taskbell check` command implementations.
//!
//! `serve` wires the delivery pipeline, the task relay over the configured
//! broker and the HTTP endpoints, then runs until SIGINT or SIGTERM. With
//! `relay.url` set the relay consumes from that AMQP broker; otherwise it
//! runs on the in-process broker fed only by `POST /v1/tasks`.

use std::sync::Arc;

use taskbell_config::{RelayConfig, TaskbellConfig};
use taskbell_core::NotificationError;
use taskbell_prometheus::PrometheusExporter;
use taskbell_relay::{Broker, InMemoryBroker, TaskRelay};
use tracing::{debug, error, info, warn};

use crate::http::{self, AppState};
use crate::pipeline::{Pipeline, is_healthy};
use crate::shutdown;

/// Runs the `taskbell serve` command.
pub async fn run_serve(config: TaskbellConfig) -> Result<(), NotificationError> {
    init_tracing(&config.bot.log_level);
    info!(name = %config.bot.name, "starting taskbell serve");

    let exporter = if config.metrics.enabled {
        match PrometheusExporter::install() {
            Ok(exporter) => Some(exporter),
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };

    let pipeline = Arc::new(Pipeline::build(&config).await?);
    let cancel = shutdown::install_signal_handler();

    let (relay, broker) = if config.relay.enabled {
        let broker = connect_broker(&config.relay).await?;
        let relay = Arc::new(TaskRelay::new(
            Arc::clone(&broker),
            pipeline.sink(),
            config.relay.clone(),
        ));
        relay.setup().await?;
        (Some(relay), Some(broker))
    } else {
        info!("task relay disabled");
        (None, None)
    };

    let state = AppState {
        pipeline: Arc::clone(&pipeline),
        relay: relay.clone(),
        exporter,
    };
    let bind_address = config.metrics.bind_address.clone();
    let http_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = http::serve(&bind_address, state, http_cancel.clone()).await {
            error!(error = %e, "http server stopped");
            // Without the HTTP surface nothing can publish; take the process down.
            http_cancel.cancel();
        }
    });

    let outcome = match &relay {
        Some(relay) => relay.run(cancel.clone()).await,
        None => {
            cancel.cancelled().await;
            Ok(())
        }
    };
    cancel.cancel();

    if let Err(e) = server.await {
        warn!(error = %e, "http server task ended abnormally");
    }
    if let Some(broker) = broker
        && let Err(e) = broker.shutdown().await
    {
        warn!(error = %e, "broker shutdown failed");
    }
    pipeline.shutdown().await;

    info!("taskbell serve shutdown complete");
    outcome
}

/// Connects the broker named by `relay.url`, or the in-process one.
async fn connect_broker(relay: &RelayConfig) -> Result<Arc<dyn Broker>, NotificationError> {
    match relay.url.as_deref() {
        Some(url) => connect_amqp(url, relay.prefetch_count).await,
        None => {
            info!("relay.url not set, using the in-process broker");
            Ok(Arc::new(InMemoryBroker::new()))
        }
    }
}

#[cfg(feature = "amqp")]
async fn connect_amqp(
    url: &str,
    prefetch_count: u16,
) -> Result<Arc<dyn Broker>, NotificationError> {
    let broker = taskbell_relay::AmqpBroker::connect(url, prefetch_count).await?;
    Ok(Arc::new(broker))
}

#[cfg(not(feature = "amqp"))]
async fn connect_amqp(
    _url: &str,
    _prefetch_count: u16,
) -> Result<Arc<dyn Broker>, NotificationError> {
    Err(NotificationError::InvalidConfig(
        "relay.url is set but taskbell was built without the `amqp` feature".to_string(),
    ))
}

/// Runs the `taskbell check` command: builds every channel, pings it once
/// and prints the rollup as JSON. Returns whether the rollup is operational.
pub async fn run_check(config: TaskbellConfig) -> Result<bool, NotificationError> {
    init_tracing(&config.bot.log_level);

    let pipeline = Pipeline::build(&config).await?;
    let health = pipeline.check().await;
    pipeline.shutdown().await;

    let rendered = serde_json::to_string_pretty(&health)
        .map_err(|e| NotificationError::Internal(format!("failed to render health: {e}")))?;
    println!("{rendered}");
    Ok(is_healthy(&health))
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("taskbell={log_level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_url_the_broker_is_in_process() {
        let broker = connect_broker(&RelayConfig::default()).await.unwrap();
        broker.declare_queue("q", true).await.unwrap();
        broker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_amqp_url_fails_startup() {
        let relay = RelayConfig {
            url: Some("amqp://127.0.0.1:1/%2f".to_string()),
            ..RelayConfig::default()
        };
        assert!(connect_broker(&relay).await.is_err());
    }
}
