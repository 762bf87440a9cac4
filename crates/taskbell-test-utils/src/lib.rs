// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Taskbell integration tests.
//!
//! Provides mock transports, channels, providers and sinks plus a harness
//! that wires the full relay-to-channel pipeline in memory, so tests run
//! without Discord, HTTP endpoints or a broker.

pub mod harness;
pub mod journal;
pub mod mock_channel;
pub mod mock_provider;
pub mod mock_transport;
pub mod recording_broker;
pub mod recording_sink;

use taskbell_core::NotificationError;

pub use harness::{HarnessProvider, TestHarness, TestHarnessBuilder};
pub use journal::Journal;
pub use mock_channel::MockChannel;
pub use mock_provider::MockProvider;
pub use mock_transport::{MockTransport, MockTransportPool};
pub use recording_broker::RecordingBroker;
pub use recording_sink::RecordingSink;

/// Kind of error a mock should produce on a scripted failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// `message-send-failed`, retryable.
    SendFailed,
    /// `provider-unavailable`, retryable.
    Unavailable,
    /// `channel-unavailable` mentioning a connection timeout, retryable by text.
    ConnectionTimeout,
    /// `provider-auth-failed`, never retried.
    Auth,
    /// `template-validation-failed`, never retried.
    Template,
}

impl MockFailure {
    pub fn to_error(self, scope: &str) -> NotificationError {
        match self {
            MockFailure::SendFailed => NotificationError::MessageSend {
                message: format!("{scope}: mock send failure"),
                channel_id: Some(scope.to_string()),
                message_id: None,
                attempts: None,
                source: None,
            },
            MockFailure::Unavailable => NotificationError::ProviderUnavailable {
                provider_id: scope.to_string(),
                message: "mock outage".to_string(),
            },
            MockFailure::ConnectionTimeout => NotificationError::ChannelUnavailable {
                message: "mock connection timeout".to_string(),
                channel_id: Some(scope.to_string()),
            },
            MockFailure::Auth => NotificationError::ProviderAuth {
                provider_id: scope.to_string(),
                message: "mock credentials rejected".to_string(),
            },
            MockFailure::Template => NotificationError::TemplateValidation {
                template_id: scope.to_string(),
                message: "mock template error".to_string(),
            },
        }
    }
}
