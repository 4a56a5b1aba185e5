//! Declarative session manifests.
//!
//! A `.termplex.json` file describes a complete session tree — windows,
//! panes, startup shells, and the commands to feed them after spawn. The
//! session manager consumes the parsed [`Manifest`] to build the real tree.

mod loader;
mod schema;

pub use loader::load_from_file;
pub use schema::{Manifest, PaneManifest, ShellManifest, WindowManifest};
