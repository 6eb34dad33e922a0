//! # Demo
//!
//! Installs a controller into the std panic hook and then panics on several
//! threads at once. Exactly one report should appear before the process dies.

use std::sync::{Arc, Barrier};
use std::thread;

use anyhow::{Context, Result};
use clap::Args;
use crashgate_config::{log_cli_debug, log_cli_info, Config};
use crashgate_core::{CrashController, Installed, ProcessHost, StdPanicRegistry};

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Number of threads that panic together
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Presentation mode (log-page or dialog-url)
    #[arg(long)]
    mode: Option<String>,

    /// Hand the fault to the previously installed hook after presenting it
    #[arg(long)]
    pass_to_prior: bool,

    /// Viewer command; the payload file path is appended as the last argument
    #[arg(long, value_name = "CMD")]
    viewer: Option<String>,

    /// Dialog title
    #[arg(long)]
    title: Option<String>,

    /// Dialog message
    #[arg(long)]
    message: Option<String>,

    /// Link offered by the dialog
    #[arg(long)]
    url: Option<String>,
}

impl DemoArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(mode) = &self.mode {
            config.controller.mode = mode.clone();
        }
        if self.pass_to_prior {
            config.controller.pass_to_prior = true;
        }
        if let Some(viewer) = &self.viewer {
            config.presentation.viewer = viewer.split_whitespace().map(String::from).collect();
        }
        if let Some(title) = &self.title {
            config.dialog.title = Some(title.clone());
        }
        if let Some(message) = &self.message {
            config.dialog.message = Some(message.clone());
        }
        if let Some(url) = &self.url {
            config.dialog.url = Some(url.clone());
        }
    }
}

pub fn run(args: DemoArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config);

    let host = ProcessHost::from_config(
        env!("CARGO_CRATE_NAME"),
        env!("CARGO_PKG_VERSION"),
        &config,
    )
    .with_label("crashgate demo");

    let controller = CrashController::builder(Arc::new(host))
        .apply_config(&config)
        .build_global()
        .context("Failed to build crash controller")?;

    match controller
        .install(&StdPanicRegistry)
        .context("Failed to install crash controller")?
    {
        Installed::Installed => log_cli_info!("Crash controller installed"),
        Installed::AlreadyCurrent => log_cli_debug!("Crash controller already installed"),
        Installed::Skipped => {
            log_cli_info!("Another crash controller owns this process, not raising faults");
            return Ok(());
        }
    }

    let threads = args.threads.max(1);
    let barrier = Arc::new(Barrier::new(threads));
    let workers = (0..threads)
        .map(|i| {
            let barrier = barrier.clone();
            thread::Builder::new()
                .name(format!("demo-worker-{i}"))
                .spawn(move || {
                    barrier.wait();
                    raise_fault(i);
                })
                .context("Failed to spawn demo worker")
        })
        .collect::<Result<Vec<_>>>()?;

    for worker in workers {
        // Only reached if the terminator returned
        let _ = worker.join();
    }
    Ok(())
}

#[inline(never)]
fn raise_fault(worker: usize) {
    panic!("demo fault on worker {worker}");
}
