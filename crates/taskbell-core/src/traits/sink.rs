// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Destination for messages produced outside the engine (e.g. the task relay).

use async_trait::async_trait;

use crate::error::NotificationError;
use crate::message::Message;
use crate::types::DeliveryReceipt;

/// Anything that can take ownership of a message and deliver it.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn dispatch(&self, message: Message) -> Result<Vec<DeliveryReceipt>, NotificationError>;
}
