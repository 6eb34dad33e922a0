//! # View
//!
//! Renders a payload written by a command surface. This is the viewer the
//! `demo` command is usually pointed at.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use crashgate_core::{Payload, TerminalSurface};

#[derive(Args, Debug)]
pub struct ViewArgs {
    /// Payload JSON file
    payload: PathBuf,
}

pub fn run(args: ViewArgs) -> Result<()> {
    let payload = Payload::load(&args.payload)
        .with_context(|| format!("Failed to read payload {}", args.payload.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    TerminalSurface::render(&payload, &mut out).context("Failed to render payload")?;
    Ok(())
}
