// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform-specific delivery backend wrapped by [`ManagedChannel`](crate::ManagedChannel).

use async_trait::async_trait;

use crate::error::NotificationError;
use crate::message::Message;
use crate::types::ChannelType;

/// The raw I/O half of a channel: connect, deliver, ping, close.
///
/// Metrics, health, rate limiting and timeouts are applied by the wrapping
/// [`ManagedChannel`](crate::ManagedChannel), so transports only talk to
/// their platform.
#[async_trait]
pub trait ChannelTransport: Send + Sync + 'static {
    fn channel_type(&self) -> ChannelType;

    /// Establishes connectivity (credential check, client setup).
    async fn connect(&self) -> Result<(), NotificationError>;

    /// Transport-specific eligibility, e.g. a resolvable destination.
    fn accepts(&self, _message: &Message) -> bool {
        true
    }

    /// Delivers one message, returning the platform's id for it if any.
    async fn deliver(&self, message: &Message) -> Result<Option<String>, NotificationError>;

    /// Cheap connectivity test used by health checks.
    async fn ping(&self) -> Result<(), NotificationError>;

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}
