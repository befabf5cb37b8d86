// Push-triggered working-tree synchronizer.
//
// One call to `handle` walks a request through
//
//   RECEIVED -> AUTHENTICATED -> BRANCH_FILTERED -> SYNCING -> SUCCEEDED | FAILED
//
// with REJECTED (method, signature, payload) and SKIPPED (other branch) as
// early exits. SYNCING mirrors the remote branch: local drift is discarded,
// then pull --rebase, and if git reports trouble the branch is forced to the
// remote tip. A second round of trouble fails the request; there is no third
// tier and nothing is rolled back.

pub mod attempt_log;
pub mod lock;

use std::sync::Arc;

use axum::http::Method;
use pushsync_common::classify::{classify_output, ESCALATION_MARKERS, INTEGRATION_MARKERS};
use pushsync_common::outcome::SyncOutcome;
use pushsync_common::payload::{PayloadError, PushEvent};
use pushsync_common::signature;
use tracing::{error, info, warn};

use crate::config::SyncTarget;
use crate::error::{ErrorCode, WebhookError};
use crate::git::worker::{
    CommandExecutor, GitCommandError, GitCommandOutput, GitWorker, ProcessCommandExecutor,
};

pub use attempt_log::{AttemptLog, LogEntry};
pub use lock::TargetLocks;

pub struct Synchronizer<E = ProcessCommandExecutor> {
    target: Arc<SyncTarget>,
    worker: GitWorker<E>,
    locks: TargetLocks,
}

impl Synchronizer<ProcessCommandExecutor> {
    pub fn new(target: SyncTarget) -> Self {
        Self::with_executor(target, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> Synchronizer<E> {
    pub fn with_executor(target: SyncTarget, executor: E) -> Self {
        let worker = GitWorker::with_executor(
            target.repo_path.clone(),
            target.git_program.clone(),
            target.command_timeout,
            executor,
        );
        Self { target: Arc::new(target), worker, locks: TargetLocks::default() }
    }

    /// Share a lock registry with other synchronizers in the process.
    pub fn with_locks(mut self, locks: TargetLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// Open the configured attempt log for one request.
    pub fn open_log(&self) -> AttemptLog {
        AttemptLog::open(&self.target.log_path)
    }

    /// Process one inbound push notification.
    ///
    /// `Ok` is either a completed sync or a skip for an unmonitored branch;
    /// every other terminal state is an `Err` carrying the caller-facing code.
    pub async fn handle(
        &self,
        method: &Method,
        token: Option<&str>,
        body: &[u8],
        log: &mut AttemptLog,
    ) -> Result<SyncOutcome, WebhookError> {
        log.record(format!("{method} webhook request received ({} bytes)", body.len()));

        if method != Method::POST {
            log.record("rejected: method not allowed");
            return Err(WebhookError::from_code(ErrorCode::MethodNotAllowed));
        }

        if let Err(reason) = signature::verify(self.target.secret.as_bytes(), body, token) {
            warn!(%reason, "rejecting webhook with invalid signature");
            log.record(format!("rejected: {reason}"));
            return Err(WebhookError::from_code(ErrorCode::Forbidden));
        }
        log.record("signature verified");

        let event = match PushEvent::parse(body) {
            Ok(event) => event,
            Err(reason) => {
                log.record(format!("rejected: {reason}"));
                let message = match reason {
                    PayloadError::Malformed(_) => "Invalid JSON payload",
                    PayloadError::NotAPush => "Not a push event",
                };
                return Err(WebhookError::new(ErrorCode::BadRequest, message));
            }
        };

        log.record(format!(
            "push to {} on {} by {} (head {})",
            event.git_ref,
            event.repository_name().unwrap_or("unknown repository"),
            event.pusher_name().unwrap_or("unknown pusher"),
            event.head_commit_id().unwrap_or("unknown"),
        ));

        let branch = event.branch();
        if branch != self.target.branch {
            info!(branch, monitored = %self.target.branch, "ignoring push to unmonitored branch");
            log.record(format!(
                "skipped: {branch} is not the monitored branch ({})",
                self.target.branch
            ));
            return Ok(SyncOutcome::skipped(branch));
        }

        let commit = self.sync(log).await?;
        Ok(SyncOutcome::success(branch, commit))
    }

    /// Drive the working tree to the tip of the monitored remote branch.
    /// Returns the resulting HEAD when git reports one.
    pub async fn sync(&self, log: &mut AttemptLog) -> Result<Option<String>, WebhookError> {
        let target = Arc::clone(&self.target);
        let _guard = self.locks.acquire(&target.repo_path).await;

        info!(repo = %target.repo_path.display(), branch = %target.branch, "starting sync");
        log.record(format!(
            "syncing {} to {}",
            target.repo_path.display(),
            target.remote_branch()
        ));

        self.check_preconditions(log).await?;

        let status = step(log, self.worker.status_porcelain().await)?;
        if status.stdout.trim().is_empty() {
            log.record("working tree clean");
        } else {
            log.record("local changes detected; discarding them");
            step(log, self.worker.reset_hard("HEAD").await)?;
            step(log, self.worker.clean().await)?;
        }

        step(log, self.worker.fetch(&target.remote).await)?;
        let pull = step(log, self.worker.pull_rebase(&target.remote, &target.branch).await)?;

        if classify_output(&pull.text(), INTEGRATION_MARKERS).is_suspect() {
            warn!(branch = %target.branch, "pull reported problems; forcing branch to remote tip");
            log.record(format!("pull reported problems; forcing sync to {}", target.remote_branch()));

            if self.worker.rebase_in_progress() {
                step(log, self.worker.rebase_abort().await)?;
            }
            let reset = step(log, self.worker.reset_hard(&target.remote_branch()).await)?;

            if classify_output(&reset.text(), ESCALATION_MARKERS).is_suspect() {
                error!(branch = %target.branch, "forced sync failed");
                log.record("failed: forced sync reported errors");
                return Err(WebhookError::from_code(ErrorCode::DeployFailed));
            }
            log.record("forced sync succeeded");
        }

        step(log, self.worker.status().await)?;
        let head = step(log, self.worker.rev_parse_head().await)?;
        let commit = Some(head.stdout.trim())
            .filter(|sha| head.success() && !sha.is_empty())
            .map(ToOwned::to_owned);

        info!(commit = commit.as_deref().unwrap_or("unknown"), "sync completed");
        log.record(format!("deploy completed at {}", commit.as_deref().unwrap_or("unknown commit")));
        Ok(commit)
    }

    async fn check_preconditions(&self, log: &mut AttemptLog) -> Result<(), WebhookError> {
        let path = &self.target.repo_path;

        if !path.is_dir() {
            return Err(fail_environment(
                log,
                format!("Repository path does not exist: {}", path.display()),
            ));
        }
        if !path.join(".git").exists() {
            return Err(fail_environment(
                log,
                format!("Not a git repository: {}", path.display()),
            ));
        }

        match self.worker.version().await {
            Ok(output) if output.success() => {
                log.record_output(&output);
                Ok(())
            }
            Ok(output) => {
                log.record_output(&output);
                Err(fail_environment(log, "Git is not available".to_string()))
            }
            Err(reason) => {
                log.record(format!("{reason}"));
                Err(fail_environment(log, "Git is not available".to_string()))
            }
        }
    }
}

/// Record a git step's output before anything branches on it.
fn step(
    log: &mut AttemptLog,
    result: Result<GitCommandOutput, GitCommandError>,
) -> Result<GitCommandOutput, WebhookError> {
    match result {
        Ok(output) => {
            log.record_output(&output);
            Ok(output)
        }
        Err(reason) => {
            let message = match &reason {
                GitCommandError::NotFound { .. } => "Git is not available".to_string(),
                GitCommandError::TimedOut { command, timeout } => {
                    format!("Git command timed out after {}s: {command}", timeout.as_secs())
                }
                GitCommandError::SpawnFailed { .. } => "Failed to run git".to_string(),
            };
            log.record(format!("{reason}"));
            Err(fail_environment(log, message))
        }
    }
}

fn fail_environment(log: &mut AttemptLog, message: String) -> WebhookError {
    error!(%message, "sync aborted");
    log.record(format!("failed: {message}"));
    WebhookError::new(ErrorCode::ServerError, message)
}
