// Result of one synchronization attempt.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp layout shared by log lines and responses.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Skipped,
    Failed,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Outcome returned to the caller. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub message: String,
    pub branch: String,
    pub commit: Option<String>,
    pub timestamp: String,
}

impl SyncOutcome {
    pub fn success(branch: impl Into<String>, commit: Option<String>) -> Self {
        Self::at(Local::now(), SyncStatus::Success, "Deploy completed", branch, commit)
    }

    pub fn skipped(branch: impl Into<String>) -> Self {
        Self::at(Local::now(), SyncStatus::Skipped, "Not the monitored branch", branch, None)
    }

    pub fn failed(branch: impl Into<String>, message: impl Into<String>) -> Self {
        Self::at(Local::now(), SyncStatus::Failed, message, branch, None)
    }

    pub fn at(
        now: DateTime<Local>,
        status: SyncStatus,
        message: impl Into<String>,
        branch: impl Into<String>,
        commit: Option<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            branch: branch.into(),
            commit,
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}
