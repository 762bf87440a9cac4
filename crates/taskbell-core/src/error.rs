// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the Taskbell notification engine.
//!
//! Every error maps to a stable [`ErrorCode`] so that decorators and the queue
//! relay can classify failures without matching on message text, and exposes
//! an [`ErrorContext`] for structured logging.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Boxed error used as the `source` of wrapped failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const TRANSIENT_HINTS: &[&str] = &["timeout", "timed out", "network", "connection"];

/// Stable, serializable error code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    ProviderInitFailed,
    ProviderAuthFailed,
    ProviderUnavailable,
    ChannelCreationFailed,
    ChannelIncompatible,
    ChannelUnavailable,
    ChannelOverloaded,
    MessageSendFailed,
    TemplateValidationFailed,
    RateLimitExceeded,
    SlaThresholdExceeded,
    InvalidConfig,
    QueueFailed,
    Internal,
}

/// Structured metadata attached to an error for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    pub provider_id: Option<String>,
    pub channel_id: Option<String>,
    pub message_id: Option<String>,
    pub attempt: Option<u32>,
    pub sla_target_ms: Option<u64>,
    pub sla_actual_ms: Option<u64>,
}

/// The error type shared by channels, balancers, providers, decorators and the relay.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("provider {provider_id} failed to initialize: {message}")]
    ProviderInit {
        provider_id: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("provider {provider_id} authentication failed: {message}")]
    ProviderAuth { provider_id: String, message: String },

    #[error("provider {provider_id} unavailable: {message}")]
    ProviderUnavailable { provider_id: String, message: String },

    #[error("failed to create channel {channel_id}: {message}")]
    ChannelCreation {
        channel_id: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("channel {channel_id} cannot handle message {message_id}")]
    ChannelIncompatible {
        channel_id: String,
        message_id: String,
    },

    #[error("channel unavailable: {message}")]
    ChannelUnavailable {
        message: String,
        channel_id: Option<String>,
    },

    /// Every candidate channel is at or above its queue capacity.
    #[error("all channels overloaded: {total_queue_size} queued against capacity {capacity}")]
    ChannelOverloaded {
        total_queue_size: usize,
        capacity: usize,
    },

    #[error("message send failed: {message}")]
    MessageSend {
        message: String,
        channel_id: Option<String>,
        message_id: Option<String>,
        attempts: Option<u32>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("template {template_id} validation failed: {message}")]
    TemplateValidation {
        template_id: String,
        message: String,
    },

    #[error("rate limit exceeded for {scope}: {limit} per {window}")]
    RateLimitExceeded {
        scope: String,
        limit: u32,
        window: &'static str,
    },

    #[error("SLA threshold exceeded for provider {provider_id}: {actual_ms}ms > {target_ms}ms")]
    SlaThresholdExceeded {
        provider_id: String,
        message_id: Option<String>,
        target_ms: u64,
        actual_ms: u64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Broker connection, topology, or publish failures.
    #[error("queue error: {message}")]
    Queue {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl NotificationError {
    /// Shorthand for a send failure without channel or message metadata.
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::MessageSend {
            message: message.into(),
            channel_id: None,
            message_id: None,
            attempts: None,
            source: None,
        }
    }

    /// Shorthand for a broker failure wrapping its cause.
    pub fn queue(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Queue {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Whether another immediate attempt is worth making.
    ///
    /// Send failures and unavailable providers are retried, as is any other
    /// error whose text points at a transient network condition. Auth,
    /// template and config errors never are.
    pub fn is_retryable(&self) -> bool {
        match self.code() {
            ErrorCode::MessageSendFailed | ErrorCode::ProviderUnavailable => true,
            ErrorCode::ProviderAuthFailed
            | ErrorCode::TemplateValidationFailed
            | ErrorCode::InvalidConfig => false,
            _ => {
                let text = self.to_string().to_lowercase();
                TRANSIENT_HINTS.iter().any(|hint| text.contains(hint))
            }
        }
    }

    /// Whether the same message may succeed if delivered again later.
    ///
    /// Wider than [`is_retryable`](Self::is_retryable): capacity and health
    /// conditions clear with time even when an immediate retry would not help.
    pub fn is_transient(&self) -> bool {
        self.is_retryable()
            || matches!(
                self.code(),
                ErrorCode::ChannelUnavailable
                    | ErrorCode::ChannelOverloaded
                    | ErrorCode::RateLimitExceeded
            )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ProviderInit { .. } => ErrorCode::ProviderInitFailed,
            Self::ProviderAuth { .. } => ErrorCode::ProviderAuthFailed,
            Self::ProviderUnavailable { .. } => ErrorCode::ProviderUnavailable,
            Self::ChannelCreation { .. } => ErrorCode::ChannelCreationFailed,
            Self::ChannelIncompatible { .. } => ErrorCode::ChannelIncompatible,
            Self::ChannelUnavailable { .. } => ErrorCode::ChannelUnavailable,
            Self::ChannelOverloaded { .. } => ErrorCode::ChannelOverloaded,
            Self::MessageSend { .. } => ErrorCode::MessageSendFailed,
            Self::TemplateValidation { .. } => ErrorCode::TemplateValidationFailed,
            Self::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            Self::SlaThresholdExceeded { .. } => ErrorCode::SlaThresholdExceeded,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::Queue { .. } => ErrorCode::QueueFailed,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn context(&self) -> ErrorContext {
        let mut ctx = ErrorContext::default();
        match self {
            Self::ProviderInit { provider_id, .. }
            | Self::ProviderAuth { provider_id, .. }
            | Self::ProviderUnavailable { provider_id, .. } => {
                ctx.provider_id = Some(provider_id.clone());
            }
            Self::ChannelCreation { channel_id, .. } => {
                ctx.channel_id = Some(channel_id.clone());
            }
            Self::ChannelIncompatible {
                channel_id,
                message_id,
            } => {
                ctx.channel_id = Some(channel_id.clone());
                ctx.message_id = Some(message_id.clone());
            }
            Self::ChannelUnavailable { channel_id, .. } => {
                ctx.channel_id = channel_id.clone();
            }
            Self::MessageSend {
                channel_id,
                message_id,
                attempts,
                ..
            } => {
                ctx.channel_id = channel_id.clone();
                ctx.message_id = message_id.clone();
                ctx.attempt = *attempts;
            }
            Self::RateLimitExceeded { scope, .. } => {
                ctx.channel_id = Some(scope.clone());
            }
            Self::SlaThresholdExceeded {
                provider_id,
                message_id,
                target_ms,
                actual_ms,
            } => {
                ctx.provider_id = Some(provider_id.clone());
                ctx.message_id = message_id.clone();
                ctx.sla_target_ms = Some(*target_ms);
                ctx.sla_actual_ms = Some(*actual_ms);
            }
            Self::ChannelOverloaded { .. }
            | Self::TemplateValidation { .. }
            | Self::InvalidConfig(_)
            | Self::Queue { .. }
            | Self::Internal(_) => {}
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::str::FromStr;

    use super::*;

    #[test]
    fn codes_render_kebab_case() {
        assert_eq!(ErrorCode::MessageSendFailed.to_string(), "message-send-failed");
        assert_eq!(
            ErrorCode::from_str("sla-threshold-exceeded").unwrap(),
            ErrorCode::SlaThresholdExceeded
        );
        let json = serde_json::to_string(&ErrorCode::ChannelOverloaded).unwrap();
        assert_eq!(json, "\"channel-overloaded\"");
    }

    #[test]
    fn send_failure_keeps_source_and_attempts() {
        let inner = NotificationError::ProviderUnavailable {
            provider_id: "discord".into(),
            message: "gateway closed".into(),
        };
        let err = NotificationError::MessageSend {
            message: "failed after 3 attempts".into(),
            channel_id: Some("c1".into()),
            message_id: Some("m1".into()),
            attempts: Some(3),
            source: Some(Box::new(inner)),
        };

        assert_eq!(err.code(), ErrorCode::MessageSendFailed);
        let ctx = err.context();
        assert_eq!(ctx.attempt, Some(3));
        assert_eq!(ctx.channel_id.as_deref(), Some("c1"));
        let source = err.source().expect("source preserved");
        assert!(source.to_string().contains("gateway closed"));
    }

    #[test]
    fn sla_context_carries_target_and_actual() {
        let err = NotificationError::SlaThresholdExceeded {
            provider_id: "p".into(),
            message_id: Some("m".into()),
            target_ms: 100,
            actual_ms: 250,
        };
        let ctx = err.context();
        assert_eq!(ctx.sla_target_ms, Some(100));
        assert_eq!(ctx.sla_actual_ms, Some(250));
        assert!(err.to_string().contains("250ms > 100ms"));
    }

    #[test]
    fn classifies_by_code_then_text() {
        assert!(NotificationError::send_failed("boom").is_retryable());
        assert!(NotificationError::ProviderUnavailable {
            provider_id: "p".into(),
            message: "down".into(),
        }
        .is_retryable());
        assert!(NotificationError::ChannelUnavailable {
            message: "connect timeout after 10ms".into(),
            channel_id: None,
        }
        .is_retryable());
        assert!(!NotificationError::ChannelOverloaded {
            total_queue_size: 3,
            capacity: 3,
        }
        .is_retryable());
        assert!(!NotificationError::ProviderAuth {
            provider_id: "p".into(),
            message: "connection refused".into(),
        }
        .is_retryable());
        assert!(!NotificationError::InvalidConfig("network section missing".into()).is_retryable());
    }

    #[test]
    fn capacity_and_health_errors_are_transient_but_auth_is_not() {
        let rate_limited = NotificationError::RateLimitExceeded {
            scope: "c1".into(),
            limit: 1,
            window: "second",
        };
        assert!(!rate_limited.is_retryable());
        assert!(rate_limited.is_transient());
        assert!(NotificationError::ChannelUnavailable {
            message: "no operational channel can handle message m1".into(),
            channel_id: None,
        }
        .is_transient());

        for permanent in [
            NotificationError::ProviderAuth {
                provider_id: "p".into(),
                message: "rejected".into(),
            },
            NotificationError::TemplateValidation {
                template_id: "t".into(),
                message: "bad".into(),
            },
            NotificationError::ChannelIncompatible {
                channel_id: "*".into(),
                message_id: "m1".into(),
            },
            NotificationError::InvalidConfig("x".into()),
        ] {
            assert!(!permanent.is_transient(), "{permanent}");
        }
    }

    #[test]
    fn overloaded_message_reports_capacity() {
        let err = NotificationError::ChannelOverloaded {
            total_queue_size: 4,
            capacity: 4,
        };
        assert_eq!(err.code(), ErrorCode::ChannelOverloaded);
        assert!(err.to_string().contains("4 queued against capacity 4"));
    }
}
