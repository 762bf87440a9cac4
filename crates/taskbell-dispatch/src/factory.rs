// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registration table from channel type to constructor.

use std::collections::HashMap;
use std::sync::Arc;

use taskbell_core::{ChannelConfig, ChannelStrategy, ChannelType, NotificationError};

/// Builds a channel strategy from its config.
pub type ChannelFactory =
    Box<dyn Fn(&ChannelConfig) -> Result<Arc<dyn ChannelStrategy>, NotificationError> + Send + Sync>;

/// Maps each channel type to the constructor for it.
#[derive(Default)]
pub struct ChannelFactoryRegistry {
    factories: HashMap<ChannelType, ChannelFactory>,
}

impl ChannelFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the constructor for `channel_type`.
    pub fn register<F>(&mut self, channel_type: ChannelType, factory: F)
    where
        F: Fn(&ChannelConfig) -> Result<Arc<dyn ChannelStrategy>, NotificationError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(channel_type, Box::new(factory));
    }

    pub fn with<F>(mut self, channel_type: ChannelType, factory: F) -> Self
    where
        F: Fn(&ChannelConfig) -> Result<Arc<dyn ChannelStrategy>, NotificationError>
            + Send
            + Sync
            + 'static,
    {
        self.register(channel_type, factory);
        self
    }

    pub fn supports(&self, channel_type: ChannelType) -> bool {
        self.factories.contains_key(&channel_type)
    }

    /// Constructs a channel; the result's type must match the config.
    pub fn create(&self, config: &ChannelConfig) -> Result<Arc<dyn ChannelStrategy>, NotificationError> {
        let factory = self.factories.get(&config.channel_type).ok_or_else(|| {
            NotificationError::ChannelCreation {
                channel_id: config.id.clone(),
                message: format!("no factory registered for {} channels", config.channel_type),
                source: None,
            }
        })?;
        let channel = factory(config)?;
        if channel.channel_type() != config.channel_type || channel.id() != config.id {
            return Err(NotificationError::ChannelCreation {
                channel_id: config.id.clone(),
                message: format!(
                    "factory produced {} channel `{}`",
                    channel.channel_type(),
                    channel.id()
                ),
                source: None,
            });
        }
        Ok(channel)
    }
}

impl std::fmt::Debug for ChannelFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFactoryRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
