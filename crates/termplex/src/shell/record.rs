//! Multiplexed output records and the tuning constants of the shell layer.

use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Capacity of every fan-in output channel (manager and pane subscriber).
///
/// When a subscriber stops draining, the forwarder, the manager channel, and
/// finally the reader tasks block in that order; the kernel pipe buffer then
/// absorbs roughly 64 KiB more before the child itself blocks.
pub const OUTPUT_CHANNEL_CAPACITY: usize = 100;

/// Size of the scratch buffer used by every reader task.
pub(crate) const READ_CHUNK: usize = 1024;

/// Capacity of the bridge channel between a PTY reader thread and its
/// async dispatch task.
pub(crate) const PTY_CHUNK_BUFFER: usize = 32;

/// Default grace period for shell termination inside cascades.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Grace period used when replacing a pane's interactive shell.
pub const REPLACE_GRACE: Duration = Duration::from_secs(5);

/// How often `send_command_and_wait` re-checks the output buffer.
pub(crate) const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on a `send_command_and_wait` round-trip.
pub(crate) const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// PTY dimensions handed to the pty system for interactive shells.
pub(crate) const DEFAULT_PTY_ROWS: u16 = 24;
pub(crate) const DEFAULT_PTY_COLS: u16 = 80;

// =============================================================================
// PANE OUTPUT
// =============================================================================

/// One chunk of output from a shell, labeled with its origin.
///
/// The payload is an owned copy — never a borrow of a reader's scratch
/// buffer. Records are immutable once emitted. Within one
/// `(shell_id, is_stderr)` pair the channel preserves kernel delivery
/// order; across shells or streams the timestamp is a tie-breaking hint
/// only.
#[derive(Debug, Clone)]
pub struct PaneOutput {
    /// Id of the shell that produced the bytes.
    pub shell_id: String,
    /// Monotonic timestamp taken when the chunk was read.
    pub at: Instant,
    /// The raw bytes.
    pub data: Vec<u8>,
    /// `true` if the bytes came from the stderr pipe.
    ///
    /// PTY-mode shells merge both streams into one file; their records are
    /// all labeled `false` and captured in the stdout buffer.
    pub is_stderr: bool,
}

/// The pair of append-only capture buffers on a shell.
///
/// Monotonic until a synchronous-wait operation resets the stdout half.
#[derive(Debug, Default)]
pub(crate) struct OutputBuffers {
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
}
