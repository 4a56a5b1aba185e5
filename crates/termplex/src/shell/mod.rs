//! Managed shell processes and their fan-in output plumbing.
//!
//! A [`Shell`] is one child process with bound I/O: a write endpoint, one or
//! two read endpoints, and a pair of capture buffers. The [`ShellManager`]
//! spawns shells — inside a pseudo-terminal for interactive ones, over plain
//! pipes otherwise — and multiplexes every shell's output onto one bounded
//! channel of [`PaneOutput`] records.

mod ansi;
mod manager;
mod reader;
mod record;
mod session;

pub use ansi::strip_ansi;
pub use manager::ShellManager;
pub use record::{PaneOutput, DEFAULT_GRACE, OUTPUT_CHANNEL_CAPACITY, REPLACE_GRACE};
pub use session::Shell;
