// pushsync-common: wire types and pure logic shared by the daemon and CLI

pub mod classify;
pub mod outcome;
pub mod payload;
pub mod signature;
