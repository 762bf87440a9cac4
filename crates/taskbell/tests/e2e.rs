// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete Taskbell pipeline.
//!
//! Each test builds an isolated in-memory pipeline: broker, task relay,
//! decorated provider or channel handler, and mock transports. Tests are
//! independent and order-insensitive.

use std::sync::Arc;

use futures::StreamExt;
use taskbell_config::{BalancingStrategy, DispatchConfig, RelayConfig};
use taskbell_core::{ChannelType, NotificationSink};
use taskbell_dispatch::ChannelHandler;
use taskbell_relay::{Broker, InMemoryBroker, RelayOutcome, TaskNotification, TaskRelay};
use taskbell_test_utils::{MockFailure, MockTransport, TestHarness};

fn created(task_id: &str, title: &str) -> TaskNotification {
    TaskNotification::new(task_id, title, "created", "c1", "g1")
}

// ---- Test 1: Task event to chat send ----

#[tokio::test]
async fn test_task_created_is_sent_and_acked() {
    let mut harness = TestHarness::builder()
        .with_channel("c1", ChannelType::Discord)
        .build()
        .await
        .unwrap();

    let raw = serde_json::json!({
        "type": "task.created",
        "taskId": "t1",
        "taskTitle": "Test",
        "action": "created",
        "channelId": "c1",
        "guildId": "g1"
    });
    harness
        .publish_raw("task.created", raw.to_string().as_bytes())
        .await
        .unwrap();

    let outcome = harness.process_next().await.unwrap();
    assert_eq!(outcome, Some(RelayOutcome::Acked));

    let sent = harness.transport("c1").unwrap().delivered();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].payload.content.contains("Test"));
    assert!(sent[0].payload.content.contains("created"));
    assert_eq!(sent[0].options.destination.as_deref(), Some("c1"));

    let entries = harness.journal().entries();
    let send_at = entries.iter().position(|e| e.starts_with("send:c1:")).unwrap();
    let ack_at = entries.iter().position(|e| e.starts_with("ack:")).unwrap();
    assert!(send_at < ack_at, "send must precede ack: {entries:?}");
    assert!(harness.journal().matching("nack:").is_empty());
}

#[tokio::test]
async fn test_published_notification_round_trips_through_exchange() {
    let mut harness = TestHarness::builder()
        .with_channel("c1", ChannelType::Discord)
        .build()
        .await
        .unwrap();

    harness
        .publish(&created("t2", "Write docs").with_user("42"))
        .await
        .unwrap();
    assert_eq!(harness.journal().matching("publish:"), vec!["publish:task.created"]);

    assert_eq!(harness.process_next().await.unwrap(), Some(RelayOutcome::Acked));
    let sent = harness.transport("c1").unwrap().delivered();
    let embed = sent[0].payload.embed.as_ref().unwrap();
    assert!(embed.fields.iter().any(|f| f.value == "<@42>"));
    assert_eq!(harness.process_next().await.unwrap(), None);
}

#[tokio::test]
async fn test_fan_out_reaches_every_channel() {
    let mut harness = TestHarness::builder()
        .with_channel("c1", ChannelType::Discord)
        .with_channel("hook", ChannelType::Webhook)
        .build()
        .await
        .unwrap();

    harness.publish(&created("t3", "Ship it")).await.unwrap();
    assert_eq!(harness.process_next().await.unwrap(), Some(RelayOutcome::Acked));

    assert_eq!(harness.transport("c1").unwrap().delivered().len(), 1);
    assert_eq!(harness.transport("hook").unwrap().delivered().len(), 1);
    assert_eq!(harness.broker().inner().acked_count(), 1);
}

// ---- Test 2: Malformed payloads ----

#[tokio::test]
async fn test_invalid_json_is_dead_lettered() {
    let mut harness = TestHarness::builder()
        .with_channel("c1", ChannelType::Discord)
        .build()
        .await
        .unwrap();

    harness.publish_raw("task.created", b"not json").await.unwrap();
    let outcome = harness.process_next().await.unwrap();
    assert_eq!(outcome, Some(RelayOutcome::DeadLettered));

    assert_eq!(harness.transport("c1").unwrap().attempts(), 0);
    let dead = harness.broker().inner().dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body, b"not json");
    assert_eq!(harness.process_next().await.unwrap(), None);
}

#[tokio::test]
async fn test_missing_channel_is_dead_lettered() {
    let mut harness = TestHarness::builder()
        .with_channel("c1", ChannelType::Discord)
        .build()
        .await
        .unwrap();

    let raw = serde_json::json!({
        "type": "task.created",
        "taskId": "t1",
        "taskTitle": "Test",
        "action": "created",
        "channelId": "",
        "guildId": "g1"
    });
    harness
        .publish_raw("task.created", raw.to_string().as_bytes())
        .await
        .unwrap();
    assert_eq!(
        harness.process_next().await.unwrap(),
        Some(RelayOutcome::DeadLettered)
    );
    assert!(harness.journal().matching("send:").is_empty());
}

// ---- Test 3: Transient failures ----

#[tokio::test]
async fn test_retry_decorator_absorbs_transient_failures() {
    let mut harness = TestHarness::builder()
        .with_channel("c1", ChannelType::Discord)
        .build()
        .await
        .unwrap();
    let transport = harness.transport("c1").unwrap();
    transport.fail_next(2, MockFailure::SendFailed);

    harness.publish(&created("t4", "Flaky")).await.unwrap();
    assert_eq!(harness.process_next().await.unwrap(), Some(RelayOutcome::Acked));
    assert_eq!(transport.attempts(), 3);
    assert_eq!(transport.delivered().len(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_requeue_then_redeliver() {
    let mut harness = TestHarness::builder()
        .with_channel("c1", ChannelType::Discord)
        .build()
        .await
        .unwrap();
    let transport = harness.transport("c1").unwrap();
    transport.fail_next(3, MockFailure::Unavailable);

    harness.publish(&created("t5", "Outage")).await.unwrap();
    assert_eq!(
        harness.process_next().await.unwrap(),
        Some(RelayOutcome::Requeued)
    );
    assert!(transport.delivered().is_empty());
    assert_eq!(harness.broker().inner().requeued_count(), 1);

    assert_eq!(harness.process_next().await.unwrap(), Some(RelayOutcome::Acked));
    assert_eq!(transport.delivered().len(), 1);
    assert_eq!(transport.attempts(), 4);
}

// ---- Test 4: Load-balanced handler behind the relay ----

#[tokio::test]
async fn test_least_loaded_handler_spreads_relayed_tasks() {
    let dispatch = DispatchConfig {
        strategy: BalancingStrategy::LeastLoaded,
        ..DispatchConfig::default()
    };
    let handler = Arc::new(ChannelHandler::from_config("e2e", &dispatch));
    let a = MockTransport::discord().with_label("a");
    let b = MockTransport::discord().with_label("b");
    handler.register(a.channel("a")).await.unwrap();
    handler.register(b.channel("b")).await.unwrap();

    let (relay, broker) = handler_relay(&handler).await;
    let mut deliveries = broker.consume(&relay.config().queue).await.unwrap();

    for i in 0..4 {
        relay
            .publish(&created(&format!("t{i}"), "Balanced"))
            .await
            .unwrap();
    }
    for _ in 0..4 {
        let delivery = deliveries.next().await.unwrap();
        assert_eq!(
            relay.handle_delivery(&delivery).await.unwrap(),
            RelayOutcome::Acked
        );
    }

    let (sent_a, sent_b) = (a.delivered().len(), b.delivered().len());
    assert_eq!(sent_a + sent_b, 4);
    assert!(sent_a >= 1 && sent_b >= 1, "a={sent_a} b={sent_b}");
    assert_eq!(handler.load_stats().balancer.total_selections, 4);
    assert_eq!(broker.acked_count(), 4);

    handler.shutdown().await.unwrap();
}

async fn handler_relay(handler: &Arc<ChannelHandler>) -> (TaskRelay, InMemoryBroker) {
    let broker = InMemoryBroker::new();
    let relay = TaskRelay::new(
        Arc::new(broker.clone()),
        Arc::clone(handler) as Arc<dyn NotificationSink>,
        RelayConfig::default(),
    );
    relay.setup().await.unwrap();
    (relay, broker)
}

#[tokio::test]
async fn test_handler_with_unhealthy_channel_requeues() {
    let handler = Arc::new(ChannelHandler::from_config("e2e", &DispatchConfig::default()));
    let transport = MockTransport::discord();
    transport.set_connect_ok(false);
    handler.register(transport.channel("c1")).await.unwrap();
    let (relay, broker) = handler_relay(&handler).await;
    let mut deliveries = broker.consume(&relay.config().queue).await.unwrap();

    relay.publish(&created("t9", "Later")).await.unwrap();
    let delivery = deliveries.next().await.unwrap();
    assert_eq!(
        relay.handle_delivery(&delivery).await.unwrap(),
        RelayOutcome::Requeued
    );
    assert_eq!(broker.queue_depth(&relay.config().queue), 1);
    assert!(transport.delivered().is_empty());
}

#[tokio::test]
async fn test_handler_without_channels_dead_letters() {
    let handler = Arc::new(ChannelHandler::from_config("e2e", &DispatchConfig::default()));
    let (relay, broker) = handler_relay(&handler).await;
    let mut deliveries = broker.consume(&relay.config().queue).await.unwrap();

    relay.publish(&created("t10", "Nowhere")).await.unwrap();
    let delivery = deliveries.next().await.unwrap();
    assert_eq!(
        relay.handle_delivery(&delivery).await.unwrap(),
        RelayOutcome::DeadLettered
    );
    assert_eq!(broker.queue_depth(&relay.config().queue), 0);
    assert_eq!(broker.dead_letters().len(), 1);
}
