// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel handler registry, routing, events and health monitoring.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskbell_core::{
    ChannelConfig, ChannelStatus, ChannelStrategy, ChannelType, Message, NotificationError, NotificationSink,
    RateLimits,
};
use taskbell_dispatch::{
    BalancerConfig, ChannelHandler, HandlerConfig, HandlerEvent, LeastLoadedBalancer,
    RoundRobinBalancer,
};
use taskbell_test_utils::{MockChannel, MockTransport};

fn handler(max_per_type: usize) -> Arc<ChannelHandler> {
    Arc::new(ChannelHandler::new(
        "test",
        HandlerConfig {
            max_channels_per_type: max_per_type,
            health_check_interval: Duration::from_secs(30),
        },
        Arc::new(RoundRobinBalancer::new(BalancerConfig::default())),
    ))
}

fn capture_events(handler: &ChannelHandler) -> Arc<Mutex<Vec<HandlerEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    handler
        .events()
        .subscribe(move |e: &HandlerEvent| sink.lock().unwrap().push(e.clone()));
    events
}

// ---- Registry ----

#[tokio::test]
async fn test_register_rejects_duplicates_and_enforces_type_cap() {
    let handler = handler(2);
    handler
        .register(Arc::new(MockChannel::operational("a")))
        .await
        .unwrap();
    let dup = handler
        .register(Arc::new(MockChannel::operational("a")))
        .await
        .unwrap_err();
    assert!(matches!(dup, NotificationError::ChannelCreation { .. }));

    handler
        .register(Arc::new(MockChannel::operational("b")))
        .await
        .unwrap();
    let capped = handler
        .register(Arc::new(MockChannel::operational("c")))
        .await
        .unwrap_err();
    assert!(capped.to_string().contains("maximum of 2"));

    // The cap is per type.
    handler
        .register(Arc::new(MockChannel::new("hook", ChannelType::Webhook)))
        .await
        .unwrap();
    assert_eq!(handler.channel_ids(), ["a", "b", "hook"]);
}

#[tokio::test]
async fn test_register_initializes_channel() {
    let handler = handler(5);
    let channel = Arc::new(MockChannel::new("a", ChannelType::Discord));
    assert_eq!(channel.health().status, ChannelStatus::Initializing);
    handler.register(channel.clone()).await.unwrap();
    assert_eq!(channel.health().status, ChannelStatus::Operational);
}

#[tokio::test]
async fn test_failed_initialization_keeps_channel_in_error() {
    let handler = handler(5);
    let transport = MockTransport::discord();
    transport.set_connect_ok(false);
    handler.register(transport.channel("a")).await.unwrap();

    let channel = handler.channel("a").unwrap();
    assert_eq!(channel.health().status, ChannelStatus::Error);
    let err = handler.send(&Message::new("hi")).await.unwrap_err();
    assert!(matches!(err, NotificationError::ChannelUnavailable { .. }));
}

#[tokio::test]
async fn test_unregister_disposes_channel() {
    let handler = handler(5);
    let channel = Arc::new(MockChannel::operational("a"));
    handler.register(channel.clone()).await.unwrap();

    handler.unregister("a").await.unwrap();
    assert_eq!(channel.disposals(), 1);
    assert!(handler.is_empty());
    assert!(handler.unregister("a").await.is_err());
}

// ---- Routing ----

#[tokio::test]
async fn test_send_routes_and_emits_sent_event() {
    let handler = handler(5);
    let events = capture_events(&handler);
    let a = Arc::new(MockChannel::operational("a"));
    let b = Arc::new(MockChannel::operational("b"));
    handler.register(a.clone()).await.unwrap();
    handler.register(b.clone()).await.unwrap();

    let first = Message::new("one");
    let second = Message::new("two");
    assert_eq!(handler.send(&first).await.unwrap().channel_id, "a");
    assert_eq!(handler.send(&second).await.unwrap().channel_id, "b");
    assert_eq!(a.sent(), vec![first.id.clone()]);
    assert_eq!(b.sent(), vec![second.id.clone()]);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.name() == "message:sent"));
}

#[tokio::test]
async fn test_send_honors_target_channel() {
    let handler = handler(5);
    handler
        .register(Arc::new(MockChannel::operational("a")))
        .await
        .unwrap();
    handler
        .register(Arc::new(MockChannel::operational("b")))
        .await
        .unwrap();

    for _ in 0..3 {
        let receipt = handler
            .send(&Message::new("hi").to_channel("b"))
            .await
            .unwrap();
        assert_eq!(receipt.channel_id, "b");
    }
}

#[tokio::test]
async fn test_unmatched_target_is_incompatible() {
    let handler = handler(5);
    handler
        .register(Arc::new(MockChannel::operational("a")))
        .await
        .unwrap();

    let err = handler
        .send(&Message::new("hi").to_channel("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, NotificationError::ChannelIncompatible { .. }));
    assert!(!err.is_transient());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_channel_recovers_after_window() {
    let handler = handler(5);
    let transport = MockTransport::discord();
    let config = ChannelConfig::new("a", ChannelType::Discord).with_rate_limits(RateLimits {
        per_second: Some(1),
        ..Default::default()
    });
    handler.register(transport.channel_with(config)).await.unwrap();

    handler.send(&Message::new("first")).await.unwrap();
    let err = handler.send(&Message::new("second")).await.unwrap_err();
    assert!(matches!(err, NotificationError::RateLimitExceeded { .. }));
    assert_eq!(
        handler.channel("a").unwrap().health().status,
        ChannelStatus::RateLimited
    );

    tokio::time::advance(Duration::from_secs(10)).await;
    let receipt = handler.send(&Message::new("third")).await.unwrap();
    assert_eq!(receipt.channel_id, "a");
    assert_eq!(
        handler.channel("a").unwrap().health().status,
        ChannelStatus::Operational
    );
    assert_eq!(transport.delivered().len(), 2);
}

#[tokio::test]
async fn test_operational_channels_win_over_rate_limited() {
    let handler = handler(5);
    let a = Arc::new(MockChannel::operational("a"));
    let b = Arc::new(MockChannel::operational("b"));
    handler.register(a.clone()).await.unwrap();
    handler.register(b.clone()).await.unwrap();
    a.set_status(ChannelStatus::RateLimited);

    for _ in 0..3 {
        assert_eq!(handler.send(&Message::new("hi")).await.unwrap().channel_id, "b");
    }
}

#[tokio::test]
async fn test_send_skips_non_operational_channels() {
    let handler = handler(5);
    let a = Arc::new(MockChannel::operational("a"));
    handler.register(a.clone()).await.unwrap();
    handler
        .register(Arc::new(MockChannel::operational("b")))
        .await
        .unwrap();
    a.set_status(ChannelStatus::Degraded);

    for _ in 0..3 {
        assert_eq!(handler.send(&Message::new("hi")).await.unwrap().channel_id, "b");
    }
}

#[tokio::test]
async fn test_no_operational_channel_emits_failed_event() {
    let handler = handler(5);
    let events = capture_events(&handler);
    let a = Arc::new(MockChannel::operational("a"));
    handler.register(a.clone()).await.unwrap();
    a.set_status(ChannelStatus::Down);

    let err = handler.send(&Message::new("hi")).await.unwrap_err();
    assert!(matches!(err, NotificationError::ChannelUnavailable { .. }));
    let events = events.lock().unwrap();
    assert!(matches!(
        &events[..],
        [HandlerEvent::MessageFailed { channel_id: None, .. }]
    ));
}

#[tokio::test]
async fn test_channel_failure_is_surfaced_without_retry() {
    let handler = handler(5);
    let events = capture_events(&handler);
    let a = Arc::new(MockChannel::operational("a"));
    a.set_failing(true);
    handler.register(a.clone()).await.unwrap();

    let err = handler.send(&Message::new("hi")).await.unwrap_err();
    assert!(matches!(err, NotificationError::MessageSend { .. }));
    assert_eq!(a.metrics().messages_failed, 1);
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        HandlerEvent::MessageFailed { channel_id, .. } => {
            assert_eq!(channel_id.as_deref(), Some("a"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_least_loaded_handler_avoids_full_channel() {
    let handler = ChannelHandler::new(
        "least",
        HandlerConfig::default(),
        Arc::new(LeastLoadedBalancer::new(BalancerConfig::default())),
    );
    let a = Arc::new(MockChannel::operational("a").with_max_queue_size(1));
    a.set_queue_size(1);
    let b = Arc::new(MockChannel::operational("b").with_max_queue_size(1));
    handler.register(a.clone()).await.unwrap();
    handler.register(b.clone()).await.unwrap();

    let receipt = handler.send(&Message::new("hi")).await.unwrap();
    assert_eq!(receipt.channel_id, "b");
    assert!(a.sent().is_empty());
}

#[tokio::test]
async fn test_handler_is_a_notification_sink() {
    let handler = handler(5);
    handler
        .register(Arc::new(MockChannel::operational("a")))
        .await
        .unwrap();
    let sink: Arc<dyn NotificationSink> = handler;
    let receipts = sink.dispatch(Message::new("hi")).await.unwrap();
    assert_eq!(receipts.len(), 1);
}

// ---- Health and stats ----

#[tokio::test]
async fn test_health_rollup_and_load_stats() {
    let handler = handler(5);
    let a = Arc::new(MockChannel::operational("a"));
    let b = Arc::new(MockChannel::operational("b"));
    handler.register(a.clone()).await.unwrap();
    handler.register(b.clone()).await.unwrap();
    assert_eq!(handler.health().status, ChannelStatus::Operational);

    a.set_queue_size(3);
    a.set_throughput(1.5);
    b.set_queue_size(2);
    b.set_status(ChannelStatus::RateLimited);
    assert_eq!(handler.health().status, ChannelStatus::Degraded);

    let stats = handler.load_stats();
    assert_eq!(stats.total_queue_size, 5);
    assert!((stats.total_throughput - 1.5).abs() < f64::EPSILON);
    assert_eq!(stats.balancer.strategy, "round_robin");
}

#[tokio::test(start_paused = true)]
async fn test_health_monitor_escalates_failing_channel() {
    let handler = handler(5);
    let transport = MockTransport::discord();
    handler.register(transport.channel("a")).await.unwrap();
    transport.set_ping_ok(false);

    handler.start_health_monitor();
    // Sweeps at 30s, 60s and 90s.
    tokio::time::sleep(Duration::from_secs(95)).await;

    let health = handler.channel("a").unwrap().health();
    assert_eq!(health.consecutive_errors, 3);
    assert_eq!(health.status, ChannelStatus::Error);
    assert_eq!(handler.health().status, ChannelStatus::Degraded);

    transport.set_ping_ok(true);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(
        handler.channel("a").unwrap().health().status,
        ChannelStatus::Operational
    );

    handler.stop_health_monitor().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_monitor_and_disposes() {
    let handler = handler(5);
    let transport = MockTransport::discord();
    handler.register(transport.channel("a")).await.unwrap();
    handler.start_health_monitor();

    handler.shutdown().await.unwrap();
    assert!(handler.is_empty());
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn test_check_all_health_checks_every_channel() {
    let handler = handler(5);
    let ok = MockTransport::discord();
    let bad = MockTransport::discord();
    bad.set_ping_ok(false);
    handler.register(ok.channel("ok")).await.unwrap();
    handler.register(bad.channel("bad")).await.unwrap();

    let results = handler.check_all_health().await;
    assert_eq!(results["ok"].status, ChannelStatus::Operational);
    assert_eq!(results["bad"].status, ChannelStatus::Degraded);
}
