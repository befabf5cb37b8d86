// `pushsync check`: verify the configured target without touching it.

use std::fs::{self, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;

use anyhow::Context;
use clap::Args;
use pushsync_daemon::config::{DaemonConfig, SyncTarget};
use pushsync_daemon::git::worker::{CommandExecutor, GitWorker};
use serde::Serialize;

use super::block_on;
use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};

const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetCheck {
    name: &'static str,
    status: CheckStatus,
    detail: String,
}

impl TargetCheck {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, detail: detail.into() }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, detail: detail.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    repo_path: String,
    branch: String,
    remote: String,
    ok: bool,
    checks: Vec<TargetCheck>,
}

pub fn run(args: CheckArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);

    let result = DaemonConfig::from_env().context("failed to load configuration").and_then(|config| {
        let worker = GitWorker::new(
            config.target.repo_path.clone(),
            config.target.git_program.clone(),
            config.target.command_timeout,
        );
        block_on(collect_checks(&config.target, &worker))
    });

    match result {
        Ok(report) => {
            output::print_output(format, &report, |report| {
                format_human(report, std::io::stdout().is_terminal())
            })?;
            Ok(if report.ok { ExitCode::Success } else { ExitCode::Error })
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

async fn collect_checks<E: CommandExecutor>(
    target: &SyncTarget,
    worker: &GitWorker<E>,
) -> CheckReport {
    let mut checks = Vec::new();
    let repo = &target.repo_path;

    checks.push(if repo.is_dir() {
        TargetCheck::pass("repository_path", repo.display().to_string())
    } else {
        TargetCheck::fail("repository_path", format!("{} is not a directory", repo.display()))
    });

    checks.push(if repo.join(".git").exists() {
        TargetCheck::pass("git_metadata", "found .git")
    } else {
        TargetCheck::fail("git_metadata", format!("no .git in {}", repo.display()))
    });

    checks.push(match worker.version().await {
        Ok(output) if output.success() => TargetCheck::pass("git_executable", output.stdout.trim()),
        Ok(output) => TargetCheck::fail("git_executable", output.text().trim().to_string()),
        Err(error) => TargetCheck::fail("git_executable", error.to_string()),
    });

    checks.push(check_log_path(&target.log_path));

    let ok = checks.iter().all(|check| check.status == CheckStatus::Pass);
    CheckReport {
        repo_path: repo.display().to_string(),
        branch: target.branch.clone(),
        remote: target.remote.clone(),
        ok,
        checks,
    }
}

/// An existing log must open for appending; otherwise its directory must be
/// writable. Nothing is created.
fn check_log_path(path: &Path) -> TargetCheck {
    if path.exists() {
        return match OpenOptions::new().append(true).open(path) {
            Ok(_) => TargetCheck::pass("log_path", path.display().to_string()),
            Err(error) => TargetCheck::fail("log_path", format!("{}: {error}", path.display())),
        };
    }

    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty()).unwrap_or(Path::new("."));
    match fs::metadata(parent) {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => {
            TargetCheck::pass("log_path", format!("{} (will be created)", path.display()))
        }
        Ok(_) => TargetCheck::fail("log_path", format!("{} is not writable", parent.display())),
        Err(error) => TargetCheck::fail("log_path", format!("{}: {error}", parent.display())),
    }
}

fn format_human(report: &CheckReport, is_tty: bool) -> String {
    let mut lines = vec![format!(
        "Target {} ({}/{})",
        report.repo_path, report.remote, report.branch
    )];
    for check in &report.checks {
        let label = match (check.status, is_tty) {
            (CheckStatus::Pass, true) => format!("{ANSI_GREEN}PASS{ANSI_RESET}"),
            (CheckStatus::Fail, true) => format!("{ANSI_RED}FAIL{ANSI_RESET}"),
            (CheckStatus::Pass, false) => "PASS".to_string(),
            (CheckStatus::Fail, false) => "FAIL".to_string(),
        };
        lines.push(format!("  {label} {:<16} {}", check.name, check.detail));
    }
    lines.join("\n")
}
