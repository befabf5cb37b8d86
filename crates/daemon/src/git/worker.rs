use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Captured result of one git invocation. Non-zero exits are not errors at
/// this layer; callers inspect the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub command: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitCommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, as a shell `2>&1` would interleave them
    /// for commands that write to only one stream.
    pub fn text(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GitCommandError {
    #[error("`{program}` was not found on PATH")]
    NotFound { program: String },

    #[error("failed to run `{command}`: {message}")]
    SpawnFailed { command: String, message: String },

    #[error("`{command}` did not finish within {}s", timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program to completion. The only way this crate touches
/// the working tree.
pub trait CommandExecutor: Send + Sync + 'static {
    /// Run `program` in `cwd`. Expiry of `timeout` surfaces as
    /// `io::ErrorKind::TimedOut`; the child must not outlive the call.
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandResult, io::Error>> + Send;
}

/// Spawns real processes with a C locale and terminal prompts disabled so
/// output stays parseable and a credential prompt cannot hang the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<CommandResult, io::Error> {
        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out after {}s", timeout.as_secs()),
                ))
            }
        };

        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GitWorker<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    program: String,
    timeout: Duration,
    executor: E,
}

impl GitWorker<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>, program: impl Into<String>, timeout: Duration) -> Self {
        Self::with_executor(repo_path, program, timeout, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> GitWorker<E> {
    pub fn with_executor(
        repo_path: impl Into<PathBuf>,
        program: impl Into<String>,
        timeout: Duration,
        executor: E,
    ) -> Self {
        Self { repo_path: repo_path.into(), program: program.into(), timeout, executor }
    }

    pub async fn version(&self) -> Result<GitCommandOutput, GitCommandError> {
        self.run(&["--version"]).await
    }

    pub async fn status_porcelain(&self) -> Result<GitCommandOutput, GitCommandError> {
        self.run(&["status", "--porcelain"]).await
    }

    pub async fn status(&self) -> Result<GitCommandOutput, GitCommandError> {
        self.run(&["status"]).await
    }

    pub async fn reset_hard(&self, target: &str) -> Result<GitCommandOutput, GitCommandError> {
        self.run(&["reset", "--hard", target]).await
    }

    pub async fn clean(&self) -> Result<GitCommandOutput, GitCommandError> {
        self.run(&["clean", "-fd"]).await
    }

    pub async fn fetch(&self, remote: &str) -> Result<GitCommandOutput, GitCommandError> {
        self.run(&["fetch", remote]).await
    }

    pub async fn pull_rebase(
        &self,
        remote: &str,
        branch: &str,
    ) -> Result<GitCommandOutput, GitCommandError> {
        self.run(&["pull", "--rebase", remote, branch]).await
    }

    pub async fn rebase_abort(&self) -> Result<GitCommandOutput, GitCommandError> {
        self.run(&["rebase", "--abort"]).await
    }

    pub async fn rev_parse_head(&self) -> Result<GitCommandOutput, GitCommandError> {
        self.run(&["rev-parse", "HEAD"]).await
    }

    /// True while a `pull --rebase` has stopped part-way.
    pub fn rebase_in_progress(&self) -> bool {
        let git_dir = self.git_dir();
        git_dir.join("rebase-merge").is_dir() || git_dir.join("rebase-apply").is_dir()
    }

    /// Metadata directory of the working tree. Linked worktrees and
    /// submodules carry a `.git` file holding `gitdir: <path>` instead.
    pub fn git_dir(&self) -> PathBuf {
        let dot_git = self.repo_path.join(".git");
        if !dot_git.is_file() {
            return dot_git;
        }
        match std::fs::read_to_string(&dot_git) {
            Ok(contents) => match contents.trim().strip_prefix("gitdir:") {
                Some(target) => self.repo_path.join(target.trim()),
                None => dot_git,
            },
            Err(_) => dot_git,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<GitCommandOutput, GitCommandError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let command = format!("{} {}", self.program, args.join(" "));

        let result = self
            .executor
            .execute(&self.program, &args, &self.repo_path, self.timeout)
            .await
            .map_err(|error| match error.kind() {
                io::ErrorKind::NotFound => {
                    GitCommandError::NotFound { program: self.program.clone() }
                }
                io::ErrorKind::TimedOut => {
                    GitCommandError::TimedOut { command: command.clone(), timeout: self.timeout }
                }
                _ => GitCommandError::SpawnFailed {
                    command: command.clone(),
                    message: error.to_string(),
                },
            })?;

        Ok(GitCommandOutput {
            command,
            code: result.code,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Invocation {
        program: String,
        args: Vec<String>,
        cwd: PathBuf,
        timeout: Duration,
    }

    #[derive(Clone)]
    struct MockExecutor {
        calls: Arc<Mutex<Vec<Invocation>>>,
        responses: Arc<Mutex<VecDeque<Result<CommandResult, io::ErrorKind>>>>,
    }

    impl MockExecutor {
        fn new(responses: Vec<Result<CommandResult, io::ErrorKind>>) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            }
        }

        fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().expect("mock calls lock poisoned").clone()
        }
    }

    impl CommandExecutor for MockExecutor {
        async fn execute(
            &self,
            program: &str,
            args: &[String],
            cwd: &Path,
            timeout: Duration,
        ) -> Result<CommandResult, io::Error> {
            self.calls.lock().expect("mock calls lock poisoned").push(Invocation {
                program: program.to_string(),
                args: args.to_vec(),
                cwd: cwd.to_path_buf(),
                timeout,
            });

            self.responses
                .lock()
                .expect("mock responses lock poisoned")
                .pop_front()
                .expect("missing mock response")
                .map_err(|kind| io::Error::new(kind, "mock failure"))
        }
    }

    fn ok(stdout: &str) -> Result<CommandResult, io::ErrorKind> {
        Ok(CommandResult {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    fn worker(mock: MockExecutor) -> GitWorker<MockExecutor> {
        GitWorker::with_executor("/srv/site", "git", Duration::from_secs(5), mock)
    }

    #[tokio::test]
    async fn status_porcelain_runs_in_repo_with_timeout() {
        let mock = MockExecutor::new(vec![ok(" M index.php\n")]);
        let output = worker(mock.clone()).status_porcelain().await.expect("status should run");

        assert_eq!(output.stdout, " M index.php\n");
        assert_eq!(output.command, "git status --porcelain");
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "git");
        assert_eq!(calls[0].args, vec!["status", "--porcelain"]);
        assert_eq!(calls[0].cwd, PathBuf::from("/srv/site"));
        assert_eq!(calls[0].timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn non_zero_exit_is_returned_as_output() {
        let mock = MockExecutor::new(vec![Ok(CommandResult {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: "CONFLICT (content): Merge conflict in style.css\n".to_string(),
        })]);

        let output =
            worker(mock.clone()).pull_rebase("origin", "main").await.expect("pull should run");
        assert!(!output.success());
        assert_eq!(output.text(), "CONFLICT (content): Merge conflict in style.css\n");
        assert_eq!(mock.calls()[0].args, vec!["pull", "--rebase", "origin", "main"]);
    }

    #[tokio::test]
    async fn spawn_errors_map_to_typed_errors() {
        let mock = MockExecutor::new(vec![
            Err(io::ErrorKind::NotFound),
            Err(io::ErrorKind::TimedOut),
            Err(io::ErrorKind::PermissionDenied),
        ]);
        let worker = worker(mock);

        assert_eq!(
            worker.version().await,
            Err(GitCommandError::NotFound { program: "git".to_string() })
        );
        assert_eq!(
            worker.fetch("origin").await,
            Err(GitCommandError::TimedOut {
                command: "git fetch origin".to_string(),
                timeout: Duration::from_secs(5),
            })
        );
        assert!(matches!(worker.clean().await, Err(GitCommandError::SpawnFailed { .. })));
    }

    #[tokio::test]
    async fn escalation_commands_use_expected_flags() {
        let mock = MockExecutor::new(vec![ok(""), ok("HEAD is now at abc123 msg\n"), ok("")]);
        let worker = worker(mock.clone());

        worker.rebase_abort().await.expect("abort should run");
        worker.reset_hard("origin/main").await.expect("reset should run");
        worker.clean().await.expect("clean should run");

        let calls = mock.calls();
        assert_eq!(calls[0].args, vec!["rebase", "--abort"]);
        assert_eq!(calls[1].args, vec!["reset", "--hard", "origin/main"]);
        assert_eq!(calls[2].args, vec!["clean", "-fd"]);
    }

    #[test]
    fn text_joins_both_streams() {
        let output = GitCommandOutput {
            command: "git pull --rebase origin main".into(),
            code: Some(128),
            stdout: "From example.com:site\n".into(),
            stderr: "fatal: refusing to merge unrelated histories\n".into(),
        };
        assert_eq!(
            output.text(),
            "From example.com:site\nfatal: refusing to merge unrelated histories\n"
        );
    }

    #[test]
    fn rebase_in_progress_detects_state_dirs() {
        let temp = tempfile::TempDir::new().expect("tempdir should be created");
        let worker = GitWorker::with_executor(
            temp.path(),
            "git",
            Duration::from_secs(1),
            MockExecutor::new(Vec::new()),
        );
        assert!(!worker.rebase_in_progress());

        std::fs::create_dir_all(temp.path().join(".git").join("rebase-merge"))
            .expect("rebase dir should be created");
        assert!(worker.rebase_in_progress());
    }

    #[test]
    fn rebase_in_progress_follows_gitdir_file() {
        let temp = tempfile::TempDir::new().expect("tempdir should be created");
        let tree = temp.path().join("tree");
        let metadata = temp.path().join("main.git").join("worktrees").join("tree");
        std::fs::create_dir_all(&tree).expect("worktree dir should be created");
        std::fs::create_dir_all(&metadata).expect("metadata dir should be created");
        std::fs::write(tree.join(".git"), format!("gitdir: {}\n", metadata.display()))
            .expect(".git file should be written");

        let worker =
            GitWorker::with_executor(&tree, "git", Duration::from_secs(1), MockExecutor::new(Vec::new()));
        assert_eq!(worker.git_dir(), metadata);
        assert!(!worker.rebase_in_progress());

        std::fs::create_dir_all(metadata.join("rebase-apply")).expect("rebase dir should be created");
        assert!(worker.rebase_in_progress());
    }

    #[test]
    fn relative_gitdir_is_resolved_against_the_tree() {
        let temp = tempfile::TempDir::new().expect("tempdir should be created");
        let tree = temp.path().join("vendor").join("theme");
        std::fs::create_dir_all(&tree).expect("submodule dir should be created");
        std::fs::write(tree.join(".git"), "gitdir: ../../.git/modules/theme\n")
            .expect(".git file should be written");

        let worker =
            GitWorker::with_executor(&tree, "git", Duration::from_secs(1), MockExecutor::new(Vec::new()));
        assert_eq!(worker.git_dir(), tree.join("../../.git/modules/theme"));
    }

    #[tokio::test]
    async fn process_executor_reports_missing_program() {
        let temp = tempfile::TempDir::new().expect("tempdir should be created");
        let error = ProcessCommandExecutor
            .execute(
                "pushsync-definitely-missing-binary",
                &[],
                temp.path(),
                Duration::from_secs(5),
            )
            .await
            .expect_err("missing binary should fail to spawn");
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
    }
}
