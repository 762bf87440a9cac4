// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds the delivery side of the service from configuration.
//!
//! Channels come from a [`ChannelFactoryRegistry`] populated with the
//! compiled-in transports. Depending on `relay.route`, they are registered
//! with a load-balancing [`ChannelHandler`] or with the decorated provider
//! stack.

use std::sync::Arc;

use taskbell_config::{RelayRoute, TaskbellConfig};
use taskbell_core::{
    ChannelStatus, NotificationError, NotificationProvider, NotificationSink, ProviderAuth,
    ProviderHealth,
};
use taskbell_dispatch::{
    ChannelFactoryRegistry, ChannelHandler, ChannelProvider, PerformanceProvider, ProviderSink,
    RetryingProvider,
};
use tracing::{info, warn};

/// The decorated provider stack used by the provider route.
pub type ServiceProvider = PerformanceProvider<RetryingProvider<ChannelProvider>>;

/// Registers a factory for every transport compiled into this binary.
pub fn channel_factories(config: &TaskbellConfig) -> ChannelFactoryRegistry {
    #[allow(unused_mut)]
    let mut registry = ChannelFactoryRegistry::new();

    #[cfg(feature = "discord")]
    {
        let discord = config.discord.clone();
        registry.register(taskbell_core::ChannelType::Discord, move |channel| {
            taskbell_discord::build_channel(channel, &discord)
        });
    }

    #[cfg(feature = "webhook")]
    registry.register(
        taskbell_core::ChannelType::Webhook,
        taskbell_webhook::build_channel,
    );

    #[cfg(not(feature = "discord"))]
    let _ = config;

    registry
}

/// The configured delivery path.
pub enum Pipeline {
    Handler(Arc<ChannelHandler>),
    Provider(Arc<ServiceProvider>),
}

impl Pipeline {
    /// Builds the pipeline and registers every enabled channel.
    ///
    /// A channel that fails to register is logged and skipped so one bad
    /// endpoint does not keep the rest of the service down.
    pub async fn build(config: &TaskbellConfig) -> Result<Self, NotificationError> {
        let factories = channel_factories(config);
        let channels = config.channels.iter().filter(|c| c.enabled);

        match config.relay.route {
            RelayRoute::Handler => {
                let handler = Arc::new(ChannelHandler::from_config(
                    config.bot.name.clone(),
                    &config.dispatch,
                ));
                for channel_config in channels {
                    let registered = match factories.create(channel_config) {
                        Ok(channel) => handler.register(channel).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = registered {
                        warn!(channel_id = %channel_config.id, error = %e, "channel skipped");
                    }
                }
                handler.start_health_monitor();
                info!(channels = handler.len(), strategy = ?config.dispatch.strategy, "channel handler ready");
                Ok(Self::Handler(handler))
            }
            RelayRoute::Provider => {
                let provider = ChannelProvider::new(config.provider_config(), factories);
                let auth = ProviderAuth {
                    token: config.discord.bot_token.clone(),
                    ..ProviderAuth::default()
                };
                provider.initialize(auth).await?;
                for channel_config in channels {
                    if let Err(e) = provider.register_channel(channel_config.clone()).await {
                        warn!(channel_id = %channel_config.id, error = %e, "channel skipped");
                    }
                }
                let count = provider.channel_ids().len();
                let provider = Arc::new(PerformanceProvider::new(
                    RetryingProvider::new(provider),
                    config.sla.clone(),
                ));
                info!(channels = count, provider_id = provider.id(), "provider stack ready");
                Ok(Self::Provider(provider))
            }
        }
    }

    /// The sink the task relay dispatches into.
    pub fn sink(&self) -> Arc<dyn NotificationSink> {
        match self {
            Self::Handler(handler) => Arc::clone(handler) as Arc<dyn NotificationSink>,
            Self::Provider(provider) => Arc::new(ProviderSink::new(Arc::clone(provider))),
        }
    }

    /// Last known health for the handler, a fresh check for the provider.
    pub async fn health(&self) -> ProviderHealth {
        match self {
            Self::Handler(handler) => handler.health(),
            Self::Provider(provider) => provider.check_health().await,
        }
    }

    /// Checks every channel now and returns the rollup.
    pub async fn check(&self) -> ProviderHealth {
        match self {
            Self::Handler(handler) => {
                handler.check_all_health().await;
                handler.health()
            }
            Self::Provider(provider) => provider.check_health().await,
        }
    }

    pub async fn shutdown(&self) {
        let result = match self {
            Self::Handler(handler) => handler.shutdown().await,
            Self::Provider(provider) => provider.shutdown().await,
        };
        if let Err(e) = result {
            warn!(error = %e, "pipeline shutdown failed");
        }
    }
}

/// Whether a rollup should count as healthy for `taskbell check`.
pub fn is_healthy(health: &ProviderHealth) -> bool {
    health.status == ChannelStatus::Operational
}
