// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scriptable [`ChannelTransport`] for driving `ManagedChannel` in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use taskbell_core::{
    ChannelStrategy, ChannelTransport, ChannelType, ManagedChannel, Message, NotificationError,
};
use taskbell_dispatch::ChannelFactoryRegistry;

use crate::MockFailure;
use crate::journal::Journal;

struct Inner {
    label: Mutex<String>,
    channel_type: ChannelType,
    delivered: Mutex<Vec<Message>>,
    failures: Mutex<VecDeque<MockFailure>>,
    delay: Mutex<Duration>,
    connect_ok: AtomicBool,
    ping_ok: AtomicBool,
    deliveries: AtomicUsize,
    closes: AtomicUsize,
    destination: Mutex<Option<String>>,
    journal: Mutex<Option<Journal>>,
}

/// A transport that records deliveries and fails on demand.
///
/// Clones share state, so a test can keep one handle while a
/// `ManagedChannel` owns another.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new(channel_type: ChannelType) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: Mutex::new(format!("mock-{channel_type}")),
                channel_type,
                delivered: Mutex::new(Vec::new()),
                failures: Mutex::new(VecDeque::new()),
                delay: Mutex::new(Duration::ZERO),
                connect_ok: AtomicBool::new(true),
                ping_ok: AtomicBool::new(true),
                deliveries: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                destination: Mutex::new(None),
                journal: Mutex::new(None),
            }),
        }
    }

    pub fn discord() -> Self {
        Self::new(ChannelType::Discord)
    }

    pub fn webhook() -> Self {
        Self::new(ChannelType::Webhook)
    }

    /// Name used in scripted errors and journal entries.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        *lock(&self.inner.label) = label.into();
        self
    }

    /// Only accept messages addressed to `destination`.
    pub fn only_destination(self, destination: impl Into<String>) -> Self {
        *lock(&self.inner.destination) = Some(destination.into());
        self
    }

    /// Records `send:<label>:<content>` for each delivery.
    pub fn with_journal(self, journal: Journal) -> Self {
        *lock(&self.inner.journal) = Some(journal);
        self
    }

    /// Fails the next `times` deliveries with `failure`.
    pub fn fail_next(&self, times: usize, failure: MockFailure) {
        let mut failures = lock(&self.inner.failures);
        failures.extend(std::iter::repeat_n(failure, times));
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.inner.delay) = delay;
    }

    pub fn set_connect_ok(&self, ok: bool) {
        self.inner.connect_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_ping_ok(&self, ok: bool) {
        self.inner.ping_ok.store(ok, Ordering::SeqCst);
    }

    /// Successfully delivered messages, in order.
    pub fn delivered(&self) -> Vec<Message> {
        lock(&self.inner.delivered).clone()
    }

    /// Every `deliver` call, successful or not.
    pub fn attempts(&self) -> usize {
        self.inner.deliveries.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    fn label(&self) -> String {
        lock(&self.inner.label).clone()
    }

    /// Wraps a clone of this transport in a `ManagedChannel`.
    pub fn channel(&self, id: &str) -> Arc<ManagedChannel<MockTransport>> {
        self.channel_with(taskbell_core::ChannelConfig::new(id, self.inner.channel_type))
    }

    pub fn channel_with(
        &self,
        config: taskbell_core::ChannelConfig,
    ) -> Arc<ManagedChannel<MockTransport>> {
        match ManagedChannel::new(config, self.clone()) {
            Ok(channel) => Arc::new(channel),
            Err(e) => panic!("mock channel config must match transport type: {e}"),
        }
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    fn channel_type(&self) -> ChannelType {
        self.inner.channel_type
    }

    async fn connect(&self) -> Result<(), NotificationError> {
        if self.inner.connect_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NotificationError::ChannelUnavailable {
                message: "mock connect refused".to_string(),
                channel_id: Some(self.label()),
            })
        }
    }

    fn accepts(&self, message: &Message) -> bool {
        match lock(&self.inner.destination).as_deref() {
            Some(expected) => message.options.destination.as_deref() == Some(expected),
            None => true,
        }
    }

    async fn deliver(&self, message: &Message) -> Result<Option<String>, NotificationError> {
        self.inner.deliveries.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.inner.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = lock(&self.inner.failures).pop_front();
        if let Some(failure) = failure {
            return Err(failure.to_error(&self.label()));
        }
        if let Some(journal) = lock(&self.inner.journal).as_ref() {
            journal.record(format!("send:{}:{}", self.label(), message.payload.content));
        }
        lock(&self.inner.delivered).push(message.clone());
        Ok(Some(format!("mock-{}", uuid::Uuid::new_v4())))
    }

    async fn ping(&self) -> Result<(), NotificationError> {
        if self.inner.ping_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NotificationError::ChannelUnavailable {
                message: "mock ping failed".to_string(),
                channel_id: Some(self.label()),
            })
        }
    }

    async fn close(&self) -> Result<(), NotificationError> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one [`MockTransport`] per channel id to provider factories,
/// keeping handles so tests can inspect them after registration.
#[derive(Clone, Default)]
pub struct MockTransportPool {
    transports: Arc<Mutex<HashMap<String, MockTransport>>>,
    journal: Option<Journal>,
}

impl MockTransportPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// The transport for `channel_id`, created on first use.
    pub fn get(&self, channel_id: &str, channel_type: ChannelType) -> MockTransport {
        lock(&self.transports)
            .entry(channel_id.to_string())
            .or_insert_with(|| {
                let transport = MockTransport::new(channel_type).with_label(channel_id);
                match &self.journal {
                    Some(journal) => transport.with_journal(journal.clone()),
                    None => transport,
                }
            })
            .clone()
    }

    /// Transport for an already-built channel.
    pub fn transport(&self, channel_id: &str) -> Option<MockTransport> {
        lock(&self.transports).get(channel_id).cloned()
    }

    /// Factories for every given type that build `ManagedChannel`s over
    /// pooled mock transports.
    pub fn factory_registry(&self, types: &[ChannelType]) -> ChannelFactoryRegistry {
        let mut registry = ChannelFactoryRegistry::new();
        for &channel_type in types {
            let pool = self.clone();
            registry.register(channel_type, move |config| {
                let transport = pool.get(&config.id, config.channel_type);
                let channel = ManagedChannel::new(config.clone(), transport)?;
                Ok(Arc::new(channel) as Arc<dyn ChannelStrategy>)
            });
        }
        registry
    }
}
