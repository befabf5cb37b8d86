// CLI subcommand dispatch.

use std::future::Future;

use anyhow::Context;
use clap::Subcommand;

use crate::exit_code::ExitCode;

pub mod check;
pub mod sign;
pub mod sync;

#[derive(Subcommand)]
pub enum Command {
    /// Print the signature header value for a payload
    Sign(sign::SignArgs),
    /// Run one sync against the configured working tree
    Sync(sync::SyncArgs),
    /// Verify the configured target without changing it
    Check(check::CheckArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<ExitCode> {
    match cmd {
        Command::Sign(args) => sign::run(args),
        Command::Sync(args) => sync::run(args),
        Command::Check(args) => check::run(args),
    }
}

/// Drive a future to completion on a fresh current-thread runtime.
fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
