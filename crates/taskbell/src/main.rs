// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Taskbell - task notification relay and multi-channel dispatch.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod http;
mod pipeline;
mod serve;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use taskbell_config::TaskbellConfig;

/// Taskbell - task notification relay and multi-channel dispatch.
#[derive(Parser, Debug)]
#[command(name = "taskbell", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay, dispatch pipeline and HTTP endpoints.
    Serve,
    /// Print the effective configuration as TOML.
    Config,
    /// Build every channel, ping it once and print the health rollup.
    Check,
}

fn load_config(path: Option<&std::path::Path>) -> Option<TaskbellConfig> {
    let loaded = match path {
        Some(path) => taskbell_config::load_and_validate_path(path),
        None => taskbell_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => Some(config),
        Err(errors) => {
            taskbell_config::render_errors(&errors);
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(config) = load_config(cli.config.as_deref()) else {
        return ExitCode::FAILURE;
    };

    match cli.command {
        Some(Commands::Serve) => match serve::run_serve(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        Some(Commands::Config) => match config.to_toml_string() {
            Ok(rendered) => {
                print!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: failed to render configuration: {e}");
                ExitCode::FAILURE
            }
        },
        Some(Commands::Check) => match serve::run_check(config).await {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        None => {
            println!("taskbell: use --help for available commands");
            ExitCode::SUCCESS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["taskbell", "--config", "/tmp/t.toml", "check"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Check)));
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/t.toml")));

        let cli = Cli::try_parse_from(["taskbell", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert!(Cli::try_parse_from(["taskbell", "bogus"]).is_err());
    }

    #[test]
    fn default_config_renders_as_toml() {
        let config = TaskbellConfig::default();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("[relay]"));
        assert!(rendered.contains("task-notifications"));
    }
}
