// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discord channel transport for the Taskbell notification engine.
//!
//! Sends through Discord's REST API with serenity's HTTP client; no gateway
//! connection is opened. The destination is a Discord channel snowflake taken
//! from the message's `destination`, falling back to the channel's
//! `channel_id` setting and then `discord.default_channel_id`.

pub mod render;

use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use taskbell_config::DiscordConfig;
use taskbell_core::{
    ChannelConfig, ChannelStrategy, ChannelTransport, ChannelType, ManagedChannel, Message,
    NotificationError,
};
use tracing::{debug, info};

/// Delivers messages to Discord text channels over the REST API.
pub struct DiscordTransport {
    http: Arc<Http>,
    default_channel: Option<ChannelId>,
    label: String,
}

impl DiscordTransport {
    /// Creates a transport for `token`. The token is only checked on
    /// [`connect`](ChannelTransport::connect).
    pub fn new(
        label: impl Into<String>,
        token: &str,
        default_channel: Option<&str>,
    ) -> Result<Self, NotificationError> {
        if token.trim().is_empty() {
            return Err(NotificationError::InvalidConfig(
                "discord bot token cannot be empty".into(),
            ));
        }
        let default_channel = match default_channel {
            Some(raw) => Some(parse_channel_id(raw).ok_or_else(|| {
                NotificationError::InvalidConfig(format!("`{raw}` is not a Discord channel id"))
            })?),
            None => None,
        };
        Ok(Self {
            http: Arc::new(Http::new(token)),
            default_channel,
            label: label.into(),
        })
    }

    /// Builds a transport from a channel config, falling back to the global
    /// `[discord]` section for the token and default channel.
    pub fn from_config(
        config: &ChannelConfig,
        discord: &DiscordConfig,
    ) -> Result<Self, NotificationError> {
        let token = config
            .setting("bot_token")
            .or(discord.bot_token.as_deref())
            .ok_or_else(|| {
                NotificationError::InvalidConfig(format!(
                    "discord channel `{}` has no bot token",
                    config.id
                ))
            })?;
        let default_channel = config
            .setting("channel_id")
            .or(discord.default_channel_id.as_deref());
        Self::new(config.id.clone(), token, default_channel)
    }

    pub fn http(&self) -> &Arc<Http> {
        &self.http
    }

    fn resolve(&self, message: &Message) -> Option<ChannelId> {
        match message.options.destination.as_deref() {
            Some(raw) => parse_channel_id(raw),
            None => self.default_channel,
        }
    }
}

/// Parses a Discord snowflake; zero is not a valid id.
pub fn parse_channel_id(raw: &str) -> Option<ChannelId> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(ChannelId::new)
}

fn is_unauthorized(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(e) => e.status_code().is_some_and(|s| s.as_u16() == 401),
        _ => false,
    }
}

#[async_trait]
impl ChannelTransport for DiscordTransport {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Discord
    }

    async fn connect(&self) -> Result<(), NotificationError> {
        let user = self.http.get_current_user().await.map_err(|e| {
            if is_unauthorized(&e) {
                NotificationError::ProviderAuth {
                    provider_id: "discord".to_string(),
                    message: "bot token was rejected".to_string(),
                }
            } else {
                NotificationError::ChannelUnavailable {
                    message: format!("discord login failed: {e}"),
                    channel_id: Some(self.label.clone()),
                }
            }
        })?;
        info!(channel_id = %self.label, bot = %user.name, "discord transport connected");
        Ok(())
    }

    fn accepts(&self, message: &Message) -> bool {
        self.resolve(message).is_some()
    }

    async fn deliver(&self, message: &Message) -> Result<Option<String>, NotificationError> {
        let Some(target) = self.resolve(message) else {
            return Err(NotificationError::MessageSend {
                message: "message has no resolvable discord destination".to_string(),
                channel_id: Some(self.label.clone()),
                message_id: Some(message.id.0.clone()),
                attempts: None,
                source: None,
            });
        };

        let builder = render::create_message(message);
        let sent = target
            .send_message(&*self.http, builder)
            .await
            .map_err(|e| {
                if is_unauthorized(&e) {
                    NotificationError::ProviderAuth {
                        provider_id: "discord".to_string(),
                        message: "bot token was rejected".to_string(),
                    }
                } else {
                    NotificationError::MessageSend {
                        message: format!("discord send to {target} failed: {e}"),
                        channel_id: Some(self.label.clone()),
                        message_id: Some(message.id.0.clone()),
                        attempts: None,
                        source: Some(Box::new(e)),
                    }
                }
            })?;
        debug!(channel_id = %self.label, target = %target, discord_message_id = %sent.id, "discord message sent");
        Ok(Some(sent.id.to_string()))
    }

    async fn ping(&self) -> Result<(), NotificationError> {
        self.http
            .get_current_user()
            .await
            .map(|_| ())
            .map_err(|e| NotificationError::ChannelUnavailable {
                message: format!("discord connection test failed: {e}"),
                channel_id: Some(self.label.clone()),
            })
    }
}

/// Builds a managed Discord channel; used as the Discord channel factory.
pub fn build_channel(
    config: &ChannelConfig,
    discord: &DiscordConfig,
) -> Result<Arc<dyn ChannelStrategy>, NotificationError> {
    let transport = DiscordTransport::from_config(config, discord)?;
    let channel = ManagedChannel::new(config.clone(), transport)?;
    Ok(Arc::new(channel) as Arc<dyn ChannelStrategy>)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discord(token: Option<&str>) -> DiscordConfig {
        DiscordConfig {
            bot_token: token.map(str::to_string),
            default_channel_id: Some("42".to_string()),
        }
    }

    #[test]
    fn parses_snowflakes() {
        assert_eq!(parse_channel_id("123456789"), Some(ChannelId::new(123456789)));
        assert_eq!(parse_channel_id(" 7 "), Some(ChannelId::new(7)));
        assert_eq!(parse_channel_id("0"), None);
        assert_eq!(parse_channel_id("general"), None);
    }

    #[test]
    fn channel_setting_overrides_global_section() {
        let config = ChannelConfig::new("d1", ChannelType::Discord)
            .with_setting("bot_token", "channel-token")
            .with_setting("channel_id", "99");
        let transport = DiscordTransport::from_config(&config, &discord(Some("global"))).unwrap();
        assert_eq!(transport.default_channel, Some(ChannelId::new(99)));
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let config = ChannelConfig::new("d1", ChannelType::Discord);
        let err = DiscordTransport::from_config(&config, &discord(None))
            .err()
            .unwrap();
        assert!(matches!(err, NotificationError::InvalidConfig(_)));
    }

    #[test]
    fn destination_wins_over_default_channel() {
        let config = ChannelConfig::new("d1", ChannelType::Discord);
        let transport = DiscordTransport::from_config(&config, &discord(Some("t"))).unwrap();

        let routed = Message::new("hi").with_destination("1234");
        assert_eq!(transport.resolve(&routed), Some(ChannelId::new(1234)));
        assert_eq!(transport.resolve(&Message::new("hi")), Some(ChannelId::new(42)));
        assert!(!transport.accepts(&Message::new("hi").with_destination("not-a-snowflake")));
    }

    #[test]
    fn bad_default_channel_is_rejected() {
        let err = DiscordTransport::new("d1", "token", Some("zero")).err().unwrap();
        assert!(err.to_string().contains("zero"));
    }
}
