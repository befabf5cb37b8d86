// Daemon configuration.
//
// Read once at start-up from environment variables, optionally layered over
// a TOML file named by `PUSHSYNC_CONFIG`. The result is immutable and passed
// explicitly to the server and synchronizer.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_WEBHOOK_PATH: &str = "/webhook";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_REMOTE: &str = "origin";
const DEFAULT_GIT_BIN: &str = "git";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;
const DEFAULT_LOG_FILE: &str = "pushsync-deploy.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{}`: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

/// The working tree this process keeps in sync.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncTarget {
    /// Absolute path of the working tree.
    pub repo_path: PathBuf,
    /// Branch whose pushes trigger a sync.
    pub branch: String,
    /// Remote the branch is pulled from.
    pub remote: String,
    /// Shared secret for push signatures.
    pub secret: String,
    /// git executable, resolved on PATH when not absolute.
    pub git_program: String,
    /// Append-only attempt log.
    pub log_path: PathBuf,
    /// Upper bound for each git invocation.
    pub command_timeout: Duration,
}

impl SyncTarget {
    /// Target with defaults for everything but the path and secret.
    pub fn new(repo_path: impl Into<PathBuf>, secret: impl Into<String>) -> Self {
        let repo_path = repo_path.into();
        Self {
            log_path: default_log_path(&repo_path),
            repo_path,
            branch: DEFAULT_BRANCH.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            secret: secret.into(),
            git_program: DEFAULT_GIT_BIN.to_string(),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_log_path(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.log_path = log_path.into();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Remote-tracking ref the escalation resets to, e.g. `origin/main`.
    pub fn remote_branch(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }
}

impl fmt::Debug for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTarget")
            .field("repo_path", &self.repo_path)
            .field("branch", &self.branch)
            .field("remote", &self.remote)
            .field("secret", &"<redacted>")
            .field("git_program", &self.git_program)
            .field("log_path", &self.log_path)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

/// Log file kept inside the git metadata directory so it never counts as
/// working-tree drift and survives `git clean`.
pub fn default_log_path(repo_path: &Path) -> PathBuf {
    repo_path.join(".git").join(DEFAULT_LOG_FILE)
}

/// Full daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Route the webhook is served on.
    pub webhook_path: String,
    /// Log filter directive (e.g. `info`, `pushsync_daemon=debug`).
    pub log_filter: String,
    pub target: SyncTarget,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    server: ServerSection,
    target: TargetSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
    webhook_path: Option<String>,
    log_filter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TargetSection {
    repo_path: Option<PathBuf>,
    branch: Option<String>,
    remote: Option<String>,
    secret: Option<String>,
    git_bin: Option<String>,
    log_path: Option<PathBuf>,
    command_timeout_secs: Option<u64>,
}

impl FileConfig {
    fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Ok(toml::from_str(&contents)?)
    }
}

impl DaemonConfig {
    /// Parse configuration from the environment.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `PUSHSYNC_CONFIG` | *(none)*, TOML file with `[server]` / `[target]` |
    /// | `PUSHSYNC_HOST` | `0.0.0.0` |
    /// | `PUSHSYNC_PORT` | `8080` |
    /// | `PUSHSYNC_WEBHOOK_PATH` | `/webhook` |
    /// | `PUSHSYNC_LOG_FILTER` | `info` |
    /// | `PUSHSYNC_SECRET` | *(required)* |
    /// | `PUSHSYNC_REPO_PATH` | *(required, absolute)* |
    /// | `PUSHSYNC_BRANCH` | `main` |
    /// | `PUSHSYNC_REMOTE` | `origin` |
    /// | `PUSHSYNC_GIT_BIN` | `git` |
    /// | `PUSHSYNC_LOG_PATH` | `<repo>/.git/pushsync-deploy.log` |
    /// | `PUSHSYNC_COMMAND_TIMEOUT_SECS` | `120` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let lookup = |key: &str| env(key).ok().filter(|value| !value.trim().is_empty());

        let file = match lookup("PUSHSYNC_CONFIG") {
            Some(path) => FileConfig::load_from(Path::new(&path))?,
            None => FileConfig::default(),
        };
        let FileConfig { server, target } = file;

        let host = lookup("PUSHSYNC_HOST").or(server.host).unwrap_or_else(|| "0.0.0.0".into());
        let port = match lookup("PUSHSYNC_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|error| ConfigError::Invalid {
                key: "PUSHSYNC_PORT",
                message: error.to_string(),
            })?,
            None => server.port.unwrap_or(DEFAULT_PORT),
        };
        let listen_addr: SocketAddr =
            format!("{host}:{port}").parse().map_err(|_| ConfigError::Invalid {
                key: "PUSHSYNC_HOST",
                message: format!("`{host}` is not an IP address"),
            })?;

        let webhook_path = lookup("PUSHSYNC_WEBHOOK_PATH")
            .or(server.webhook_path)
            .unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.into());
        if !webhook_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "PUSHSYNC_WEBHOOK_PATH",
                message: "must start with `/`".into(),
            });
        }

        let log_filter =
            lookup("PUSHSYNC_LOG_FILTER").or(server.log_filter).unwrap_or_else(|| "info".into());

        let secret = lookup("PUSHSYNC_SECRET")
            .or(target.secret)
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("PUSHSYNC_SECRET"))?;

        let repo_path = lookup("PUSHSYNC_REPO_PATH")
            .map(PathBuf::from)
            .or(target.repo_path)
            .ok_or(ConfigError::Missing("PUSHSYNC_REPO_PATH"))?;
        if !repo_path.is_absolute() {
            return Err(ConfigError::Invalid {
                key: "PUSHSYNC_REPO_PATH",
                message: format!("`{}` is not an absolute path", repo_path.display()),
            });
        }

        let command_timeout_secs = match lookup("PUSHSYNC_COMMAND_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|error| ConfigError::Invalid {
                key: "PUSHSYNC_COMMAND_TIMEOUT_SECS",
                message: error.to_string(),
            })?,
            None => target.command_timeout_secs.unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        };
        if command_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "PUSHSYNC_COMMAND_TIMEOUT_SECS",
                message: "must be greater than zero".into(),
            });
        }

        let log_path = lookup("PUSHSYNC_LOG_PATH")
            .map(PathBuf::from)
            .or(target.log_path)
            .unwrap_or_else(|| default_log_path(&repo_path));

        let branch = match lookup("PUSHSYNC_BRANCH") {
            Some(branch) => branch,
            None => non_blank("PUSHSYNC_BRANCH", target.branch)?
                .unwrap_or_else(|| DEFAULT_BRANCH.into()),
        };
        let remote = match lookup("PUSHSYNC_REMOTE") {
            Some(remote) => remote,
            None => non_blank("PUSHSYNC_REMOTE", target.remote)?
                .unwrap_or_else(|| DEFAULT_REMOTE.into()),
        };
        let git_program = match lookup("PUSHSYNC_GIT_BIN") {
            Some(program) => program,
            None => non_blank("PUSHSYNC_GIT_BIN", target.git_bin)?
                .unwrap_or_else(|| DEFAULT_GIT_BIN.into()),
        };

        let target = SyncTarget {
            branch,
            remote,
            git_program,
            command_timeout: Duration::from_secs(command_timeout_secs),
            repo_path,
            secret,
            log_path,
        };

        Ok(Self { listen_addr, webhook_path, log_filter, target })
    }
}

/// File values are taken as written, so an explicit empty string is an error
/// rather than a silent fallback to the default.
fn non_blank(key: &'static str, value: Option<String>) -> Result<Option<String>, ConfigError> {
    match value {
        Some(value) if value.trim().is_empty() => {
            Err(ConfigError::Invalid { key, message: "must not be empty".into() })
        }
        other => Ok(other),
    }
}
