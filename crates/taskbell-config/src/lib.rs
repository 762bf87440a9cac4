// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Taskbell notification engine.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, `TASKBELL_*` environment overrides, and miette
//! diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use taskbell_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("Channels: {}", config.channels.len());
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    BalancingStrategy, BotConfig, DiscordConfig, DispatchConfig, MetricsConfig, ProviderSection,
    RelayConfig, RelayRoute, SlaConfig, TaskbellConfig,
};

/// Loads configuration from the XDG hierarchy and validates it.
///
/// Extraction failures are converted into diagnostics with source spans
/// where the offending file can be found.
pub fn load_and_validate() -> Result<TaskbellConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &collect_toml_sources(),
        )),
    }
}

/// Loads a specific file (plus env overrides) and validates it.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<TaskbellConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = std::fs::read_to_string(path)
                .map(|content| vec![(path.display().to_string(), content)])
                .unwrap_or_default();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Loads an inline TOML string and validates it.
pub fn load_and_validate_str(toml_content: &str) -> Result<TaskbellConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::path::PathBuf::from("/etc/taskbell/taskbell.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("taskbell/taskbell.toml"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("taskbell.toml"));
    }

    candidates
        .into_iter()
        .filter_map(|path| {
            std::fs::read_to_string(&path)
                .ok()
                .map(|content| (path.display().to_string(), content))
        })
        .collect()
}
