// Push-notification payloads.
//
// Only `ref` drives control flow. Repository, pusher and head commit are
// carried for log lines and are all optional.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Canonical prefix of branch refs.
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("payload has no `ref`; not a push event")]
    NotAPush,
}

/// A decoded push notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default, deserialize_with = "lenient")]
    pub repository: Option<RepositoryInfo>,
    #[serde(default, deserialize_with = "lenient")]
    pub pusher: Option<PusherInfo>,
    #[serde(default, deserialize_with = "lenient")]
    pub head_commit: Option<HeadCommitInfo>,
}

/// Decode a log-only field, treating any unexpected shape as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryInfo {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PusherInfo {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeadCommitInfo {
    #[serde(default)]
    pub id: Option<String>,
}

impl PushEvent {
    /// Decode a raw request body. Rejects bodies without a non-empty `ref`.
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        let event: PushEvent = serde_json::from_slice(body)?;
        if event.git_ref.trim().is_empty() {
            return Err(PayloadError::NotAPush);
        }
        Ok(event)
    }

    /// Branch name named by `ref`.
    pub fn branch(&self) -> &str {
        branch_from_ref(&self.git_ref)
    }

    pub fn repository_name(&self) -> Option<&str> {
        self.repository.as_ref().and_then(|r| r.full_name.as_deref())
    }

    pub fn pusher_name(&self) -> Option<&str> {
        self.pusher.as_ref().and_then(|p| p.name.as_deref())
    }

    pub fn head_commit_id(&self) -> Option<&str> {
        self.head_commit.as_ref().and_then(|c| c.id.as_deref())
    }
}

/// Strip the `refs/heads/` prefix. Refs without it (tags, bare names) are
/// returned unchanged and so never equal a plain branch name like `main`
/// unless they literally are one.
pub fn branch_from_ref(git_ref: &str) -> &str {
    git_ref.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(git_ref)
}
