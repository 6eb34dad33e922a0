//! # Config
//!
//! Inspect and scaffold crashgate configuration files.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use crashgate_config::{Config, PROJECT_CONFIG_PATH};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the configuration file locations
    Path,

    /// Write a default project configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(command: ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let rendered =
                toml::to_string_pretty(config).context("Failed to render configuration")?;
            print!("{rendered}");
        }
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(path) => println!("global:  {}", path.display()),
                None => println!("global:  (no home directory)"),
            }
            println!("project: {PROJECT_CONFIG_PATH}");
        }
        ConfigCommands::Init { force } => init(Path::new(PROJECT_CONFIG_PATH), force)?,
    }
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let contents = Config::default_toml()?;
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
