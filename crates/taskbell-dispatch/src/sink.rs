// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use taskbell_core::{DeliveryReceipt, Message, NotificationError, NotificationProvider, NotificationSink};

/// Adapts a shared provider (usually the decorated one) into a sink.
pub struct ProviderSink<P: ?Sized> {
    provider: Arc<P>,
}

impl<P: NotificationProvider + ?Sized> ProviderSink<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }
}

#[async_trait]
impl<P: NotificationProvider + ?Sized + 'static> NotificationSink for ProviderSink<P> {
    async fn dispatch(&self, mut message: Message) -> Result<Vec<DeliveryReceipt>, NotificationError> {
        self.provider.send(&mut message).await
    }
}
