// Git plumbing: process execution with timeouts and the named commands the
// synchronizer runs against the target working tree.

pub mod worker;
