// Text heuristic for git output.
//
// git reports most failures on stderr with `error:` / `fatal:` prefixes and
// rebase stops with `CONFLICT (...)`. The synchronizer branches on these
// markers rather than on exit codes; this module is the only place that
// knows them. Output that merely mentions the word (a file called
// `error.log`, say) is flagged too.

/// Markers that make an integration (pull --rebase) step suspect.
pub const INTEGRATION_MARKERS: &[&str] = &["error", "fatal", "conflict"];

/// Markers that make an escalation (hard reset) step suspect.
pub const ESCALATION_MARKERS: &[&str] = &["error", "fatal"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputClass {
    Clean,
    Suspect,
}

impl OutputClass {
    pub fn is_suspect(self) -> bool {
        self == Self::Suspect
    }
}

/// Classify `text` by case-insensitive substring search for `markers`.
pub fn classify_output(text: &str, markers: &[&str]) -> OutputClass {
    let lower = text.to_lowercase();
    if markers.iter().any(|marker| lower.contains(marker)) {
        OutputClass::Suspect
    } else {
        OutputClass::Clean
    }
}
