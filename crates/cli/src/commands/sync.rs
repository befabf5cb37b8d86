// `pushsync sync`: run one sync of the configured working tree by hand.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use pushsync_common::outcome::SyncOutcome;
use pushsync_daemon::config::DaemonConfig;
use pushsync_daemon::git::worker::CommandExecutor;
use pushsync_daemon::sync::Synchronizer;
use serde::Serialize;

use super::block_on;
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub log_path: Option<PathBuf>,
    pub transcript: Vec<String>,
}

pub fn run(args: SyncArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);

    let result = DaemonConfig::from_env()
        .context("failed to load configuration")
        .and_then(|config| block_on(execute(&Synchronizer::new(config.target))));

    match result {
        Ok(report) => {
            output::print_output(format, &report, format_human)?;
            Ok(if report.outcome.is_success() { ExitCode::Success } else { ExitCode::Error })
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

/// Run the sync phase once, bypassing signature and branch checks.
pub async fn execute<E: CommandExecutor>(sync: &Synchronizer<E>) -> SyncReport {
    let mut log = sync.open_log();
    let branch = sync.target().branch.clone();
    log.record("manual sync requested from the command line");

    let outcome = match sync.sync(&mut log).await {
        Ok(commit) => SyncOutcome::success(branch, commit),
        Err(error) => SyncOutcome::failed(branch, error.message()),
    };

    SyncReport { outcome, log_path: log.path().map(Path::to_path_buf), transcript: log.lines() }
}

fn format_human(report: &SyncReport) -> String {
    let mut lines = report.transcript.clone();
    lines.push(String::new());
    let summary = match (&report.outcome.commit, report.outcome.is_success()) {
        (Some(commit), true) => format!("{} on {} at {commit}", report.outcome.message, report.outcome.branch),
        (None, true) => format!("{} on {}", report.outcome.message, report.outcome.branch),
        (_, false) => format!("Sync failed on {}: {}", report.outcome.branch, report.outcome.message),
    };
    lines.push(summary);
    if let Some(path) = &report.log_path {
        lines.push(format!("Log: {}", path.display()));
    }
    lines.join("\n")
}
