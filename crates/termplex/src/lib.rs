//! Terminal multiplexing orchestration.
//!
//! Termplex manages a tree of long-lived child processes ("shells")
//! organized into panes, windows, and sessions. A host program spawns many
//! shells in parallel, sends commands into them, and consumes their
//! interleaved output as a single labeled stream per pane, with
//! deterministic cascaded shutdown.
//!
//! The tree is strictly ownership-acyclic: a [`SessionManager`] owns
//! windows, a [`Window`] owns panes, a [`Pane`] owns a [`ShellManager`],
//! and the manager owns the shells.

pub mod pane;
pub mod session;
pub mod shell;
pub mod window;


pub use pane::Pane;
pub use session::{Session, SessionManager};
pub use shell::{strip_ansi, PaneOutput, Shell, ShellManager};
pub use window::Window;

pub use termplex_common::{ManifestError, Result, ShellError, TermplexError};
