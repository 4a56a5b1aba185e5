use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("spawn requires a command to execute")]
    EmptyCommand,

    #[error("failed to spawn shell: {0}")]
    SpawnFailed(String),

    #[error("shell {id} has no open input endpoint")]
    InputClosed { id: String },

    #[error("failed to write to shell {id}: {source}")]
    Write {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to reap shell {id}: {source}")]
    Reap {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out waiting for command delimiter in shell {id}")]
    CommandTimeout { id: String },

    #[error("timed out waiting for {needle:?} in output of shell {id}")]
    OutputTimeout { id: String, needle: String },

    #[error("shell {id} did not exit within {grace_ms} ms and was force-killed: {source}")]
    ForcedTermination {
        id: String,
        grace_ms: u64,
        /// Result of reaping the child after the kill.
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest JSON {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TermplexError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("window not found: {0}")]
    WindowNotFound(String),

    #[error("pane not found: {0}")]
    PaneNotFound(String),

    #[error("shell not found: {0}")]
    ShellNotFound(String),

    #[error("session {session_id} reached its window limit of {max}")]
    WindowLimitReached { session_id: String, max: usize },

    #[error("freshly minted id already in use: {0}")]
    IdCollision(String),

    #[error("timed out waiting for tag '{key}' = '{value}' on pane {pane_id}")]
    TagTimeout {
        key: String,
        value: String,
        pane_id: String,
    },

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}
