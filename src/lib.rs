#![forbid(unsafe_code)]

pub mod adapters;
pub mod app;
pub mod commands;
pub mod domain;
pub mod infrastructure;
pub mod ports;

use anyhow::Context;
use clap::Parser;

pub use app::AppController;

/// Parse the command line and run it to completion.
pub fn run() -> anyhow::Result<()> {
    let cli = commands::Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(commands::execute(cli))
}
