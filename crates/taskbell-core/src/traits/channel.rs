// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel strategy trait held by handlers and providers.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::NotificationError;
use crate::message::Message;
use crate::types::{
    ChannelConfig, ChannelHealth, ChannelMetrics, ChannelType, DeliveryReceipt,
    LoadBalancingMetrics,
};

/// One deliverable channel instance with its own metrics and health.
#[async_trait]
pub trait ChannelStrategy: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn channel_type(&self) -> ChannelType;

    fn config(&self) -> &ChannelConfig;

    /// Establishes connectivity; health becomes operational or error.
    async fn initialize(&self) -> Result<(), NotificationError>;

    /// Whether this channel is able to deliver `message`.
    fn can_handle(&self, message: &Message) -> bool;

    /// Delivers `message`. Fails with `ChannelIncompatible` when
    /// [`can_handle`](Self::can_handle) is false.
    async fn send(&self, message: &Message) -> Result<DeliveryReceipt, NotificationError>;

    /// Timed connectivity test that downgrades status instead of failing.
    async fn check_health(&self) -> ChannelHealth;

    /// Timed connectivity test that surfaces the failure.
    async fn test_connection(&self) -> Result<Duration, NotificationError>;

    fn metrics(&self) -> ChannelMetrics;

    /// Health as of the last check or send.
    fn health(&self) -> ChannelHealth;

    fn load_metrics(&self) -> LoadBalancingMetrics;

    /// Releases channel resources. Safe to call more than once.
    async fn dispose(&self) -> Result<(), NotificationError>;
}
