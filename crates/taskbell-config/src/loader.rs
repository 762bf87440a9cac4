// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./taskbell.toml` > `~/.config/taskbell/taskbell.toml`
//! > `/etc/taskbell/taskbell.toml`, with environment variable overrides via the
//! `TASKBELL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TaskbellConfig;

/// Sections that environment variables may address.
const ENV_SECTIONS: &[&str] = &[
    "bot", "discord", "provider", "dispatch", "retry", "sla", "relay", "metrics",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/taskbell/taskbell.toml`
/// 3. `~/.config/taskbell/taskbell.toml`
/// 4. `./taskbell.toml`
/// 5. `TASKBELL_*` environment variables
pub fn load_config() -> Result<TaskbellConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML string (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<TaskbellConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TaskbellConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TaskbellConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TaskbellConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TaskbellConfig::default()))
        .merge(Toml::file("/etc/taskbell/taskbell.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("taskbell/taskbell.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("taskbell.toml"))
        .merge(env_provider())
}

/// Maps `TASKBELL_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `TASKBELL_DISCORD_BOT_TOKEN` maps to `discord.bot_token`.
fn env_provider() -> Env {
    Env::prefixed("TASKBELL_").map(|key| {
        let key_str = key.as_str();
        let mapped = ENV_SECTIONS
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or_else(|| key_str.to_string());
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TASKBELL_DISCORD_BOT_TOKEN", "abc.def");
            jail.set_env("TASKBELL_DISPATCH_MAX_QUEUE_SIZE", "7");
            jail.set_env("TASKBELL_RELAY_EXCHANGE", "events");
            let config = load_config().expect("config loads");
            assert_eq!(config.discord.bot_token.as_deref(), Some("abc.def"));
            assert_eq!(config.dispatch.max_queue_size, 7);
            assert_eq!(config.relay.exchange, "events");
            Ok(())
        });
    }

    #[test]
    fn local_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "taskbell.toml",
                r#"
[bot]
name = "local"

[dispatch]
strategy = "least_loaded"
"#,
            )?;
            let config = load_config().expect("config loads");
            assert_eq!(config.bot.name, "local");
            assert_eq!(
                config.dispatch.strategy,
                crate::model::BalancingStrategy::LeastLoaded
            );
            Ok(())
        });
    }
}
