// pushsync-daemon library entry point (shared with the CLI).

pub mod config;
pub mod error;
pub mod git;
pub mod server;
pub mod sync;
pub mod webhook;
