//! # crashgate CLI
//!
//! Exercises the crash controller end to end and acts as the external viewer
//! for payloads handed off by a command surface.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crashgate_config::logging::{init_logging, LogLevel};
use crashgate_config::Config;

mod config_cmd;
mod demo;
mod view;

/// crashgate - process-wide panic interception
#[derive(Parser)]
#[command(name = "crashgate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the controller, then panic on several threads at once
    Demo(demo::DemoArgs),

    /// Render a crash payload file
    View(view::ViewArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: config_cmd::ConfigCommands,
    },
}

fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            crashgate_config::reload().context("Failed to load config")?;
            Ok(crashgate_config::config().clone())
        }
    }
}

fn main() -> Result<()> {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let level = config
        .logging
        .level
        .parse::<LogLevel>()
        .unwrap_or(LogLevel::Warn);
    init_logging(level);

    match cli.command {
        Commands::Demo(args) => demo::run(args, config),
        Commands::View(args) => view::run(args),
        Commands::Config { command } => config_cmd::run(command, &config),
    }
}
