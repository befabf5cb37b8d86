// Per-request transcript.
//
// Each line is written to the append-only log file as soon as it is recorded
// (`[YYYY-MM-DD HH:MM:SS] message`), mirrored to tracing, and kept in memory
// for callers that render the transcript. The file handle lives exactly as
// long as the `AttemptLog`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use pushsync_common::outcome::TIMESTAMP_FORMAT;
use serde::Serialize;
use tracing::{info, warn};

use crate::git::worker::GitCommandOutput;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl LogEntry {
    pub fn render(&self) -> String {
        format!("[{}] {}", self.timestamp.format(TIMESTAMP_FORMAT), self.message)
    }
}

#[derive(Debug)]
pub struct AttemptLog {
    path: Option<PathBuf>,
    file: Option<File>,
    entries: Vec<LogEntry>,
}

impl AttemptLog {
    /// Open `path` for appending, creating parent directories. A log that
    /// cannot be opened degrades to memory-only so the request still runs.
    pub fn open(path: &Path) -> Self {
        match open_append(path) {
            Ok(file) => Self { path: Some(path.to_path_buf()), file: Some(file), entries: Vec::new() },
            Err(error) => {
                warn!(path = %path.display(), %error, "attempt log unavailable; keeping transcript in memory");
                Self::in_memory()
            }
        }
    }

    pub fn in_memory() -> Self {
        Self { path: None, file: None, entries: Vec::new() }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        // Wall-clock steps backwards must not reorder the transcript.
        let now = Local::now();
        let timestamp = match self.entries.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        let entry = LogEntry { timestamp, message };

        info!(target: "pushsync::attempt", "{}", entry.message);
        if let Some(file) = self.file.as_mut() {
            if let Err(error) = writeln!(file, "{}", entry.render()) {
                warn!(%error, "failed to append to attempt log; continuing in memory");
                self.file = None;
            }
        }
        self.entries.push(entry);
    }

    /// Record a git step: one header line, then every output line verbatim.
    pub fn record_output(&mut self, output: &GitCommandOutput) {
        let code = output.code.map_or_else(|| "signal".to_string(), |code| code.to_string());
        self.record(format!("$ {} (exit {code})", output.command));

        let text = output.text();
        if text.trim().is_empty() {
            self.record("  (no output)");
            return;
        }
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            self.record(format!("  | {line}"));
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(LogEntry::render).collect()
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
