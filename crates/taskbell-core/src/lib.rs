// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Taskbell notification engine.
//!
//! This crate provides the data model, error taxonomy and trait seams shared
//! by every other Taskbell crate. Channel transports implement
//! [`ChannelTransport`] and are wrapped by [`ManagedChannel`], which applies
//! the common channel contract (metrics, health, rate limits, timeouts).

pub mod error;
pub mod managed;
pub mod message;
pub mod observer;
pub mod rate_limit;
pub mod template;
pub mod traits;
pub mod types;

pub use error::{BoxError, ErrorCode, ErrorContext, NotificationError};
pub use managed::ManagedChannel;
pub use message::{DeliveryInfo, DeliveryOptions, DeliveryStatus, Message, MessageEvent, MessagePayload};
pub use observer::Observers;
pub use rate_limit::RateLimiter;
pub use template::{RenderedTemplate, Template};
pub use traits::{
    BalancerStats, ChannelStrategy, ChannelTransport, LoadBalancer, NotificationProvider,
    NotificationSink, ProviderAuth, Selection,
};
pub use types::{
    ChannelConfig, ChannelHealth, ChannelMetrics, ChannelStatus, ChannelType, DeliveryReceipt,
    Embed, EmbedField, LoadBalancingMetrics, MessageId, PerformanceStats, Priority, ProviderConfig,
    ProviderHealth, ProviderMetrics, ProviderRateLimits, RateLimits, RetryConfig,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_trait_seams_are_exported() {
        fn _assert_strategy<T: ChannelStrategy + ?Sized>() {}
        fn _assert_transport<T: ChannelTransport>() {}
        fn _assert_balancer<T: LoadBalancer + ?Sized>() {}
        fn _assert_provider<T: NotificationProvider + ?Sized>() {}
        fn _assert_sink<T: NotificationSink + ?Sized>() {}
        _assert_strategy::<dyn ChannelStrategy>();
        _assert_balancer::<dyn LoadBalancer>();
        _assert_provider::<dyn NotificationProvider>();
        _assert_sink::<dyn NotificationSink>();
    }

    #[test]
    fn channel_type_round_trips_through_strings() {
        use std::str::FromStr;
        for t in [
            ChannelType::Discord,
            ChannelType::Webhook,
            ChannelType::Email,
            ChannelType::Sms,
            ChannelType::Push,
        ] {
            assert_eq!(ChannelType::from_str(&t.to_string()).unwrap(), t);
        }
    }
}
