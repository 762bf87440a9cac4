// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification dispatch for Taskbell.
//!
//! - [`ChannelHandler`]: channel registry with health monitoring and
//!   load-balanced routing through a [`LoadBalancer`](taskbell_core::LoadBalancer).
//! - [`ChannelProvider`]: channels and templates under one backend, with
//!   parallel fan-out delivery.
//! - [`RetryingProvider`] and [`PerformanceProvider`]: decorators that add
//!   retry-with-backoff and SLA tracking to any provider.

pub mod balancer;
pub mod factory;
pub mod handler;
pub mod performance;
pub mod provider;
pub mod retry;
pub mod sink;

pub use balancer::{BalancerConfig, LeastLoadedBalancer, RoundRobinBalancer};
pub use factory::{ChannelFactory, ChannelFactoryRegistry};
pub use handler::{ChannelHandler, HandlerConfig, HandlerEvent, HandlerLoadStats};
pub use performance::PerformanceProvider;
pub use provider::ChannelProvider;
pub use retry::RetryingProvider;
pub use sink::ProviderSink;
