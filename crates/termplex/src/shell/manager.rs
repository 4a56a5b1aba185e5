//! The per-pane shell registry and fan-in point.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use termplex_common::{id, ShellError, TermplexError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::reader;
use super::record::{
    PaneOutput, DEFAULT_PTY_COLS, DEFAULT_PTY_ROWS, OUTPUT_CHANNEL_CAPACITY,
};
use super::session::{ChildHandle, InputEndpoint, Shell, ShellIo};

/// Owns every shell of one pane and multiplexes their output onto a single
/// bounded channel of [`PaneOutput`] records.
///
/// Interactive shells are spawned inside a pseudo-terminal; non-interactive
/// ones over plain pipes. The manager's close signal is what lets producers
/// bail out of a blocked fan-in send during termination.
pub struct ShellManager {
    shells: Mutex<HashMap<String, Arc<Shell>>>,
    output_tx: mpsc::Sender<PaneOutput>,
    close_tx: watch::Sender<bool>,
}

impl ShellManager {
    /// Create an empty manager, returning it together with the receiving
    /// half of its fan-in channel.
    pub fn new() -> (Self, mpsc::Receiver<PaneOutput>) {
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (close_tx, _) = watch::channel(false);
        (
            Self {
                shells: Mutex::new(HashMap::new()),
                output_tx,
                close_tx,
            },
            output_rx,
        )
    }

    // -------------------------------------------------------------------------
    // Spawning
    // -------------------------------------------------------------------------

    /// Spawn a new shell and start its reader tasks.
    ///
    /// Must be called from within a tokio runtime. The returned shell is
    /// already registered and producing output records.
    pub fn spawn_shell(
        &self,
        interactive: bool,
        command: &[&str],
    ) -> Result<Arc<Shell>, ShellError> {
        if command.is_empty() {
            return Err(ShellError::EmptyCommand);
        }

        let shell = if interactive {
            self.spawn_pty_shell(command)?
        } else {
            self.spawn_piped_shell(command)?
        };

        self.shells
            .lock()
            .unwrap()
            .insert(shell.id().to_string(), Arc::clone(&shell));

        info!(
            shell = id::short(shell.id()),
            ?command,
            interactive,
            "shell spawned"
        );
        Ok(shell)
    }

    /// Interactive path: the shell gets a real controlling terminal. The
    /// PTY master doubles as the write endpoint and the single (merged)
    /// read endpoint.
    fn spawn_pty_shell(&self, command: &[&str]) -> Result<Arc<Shell>, ShellError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: DEFAULT_PTY_ROWS,
                cols: DEFAULT_PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ShellError::SpawnFailed(format!("failed to open pty: {e}")))?;

        let mut builder = CommandBuilder::new(command[0]);
        builder.args(&command[1..]);
        builder.env("TERM", "xterm-256color");

        let mut child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| ShellError::SpawnFailed(format!("failed to start {command:?}: {e}")))?;

        // Only the master side is needed from here on.
        drop(pair.slave);

        let reader_endpoint = match pair.master.try_clone_reader() {
            Ok(r) => r,
            Err(e) => {
                let _ = child.kill();
                return Err(ShellError::SpawnFailed(format!(
                    "failed to clone pty reader: {e}"
                )));
            }
        };
        let writer = match pair.master.take_writer() {
            Ok(w) => w,
            Err(e) => {
                let _ = child.kill();
                return Err(ShellError::SpawnFailed(format!(
                    "failed to take pty writer: {e}"
                )));
            }
        };

        let mut killer = child.clone_killer();
        let shell = Arc::new(Shell::new(
            true,
            ShellIo {
                input: Some(InputEndpoint::Pty(writer)),
                master: Some(pair.master),
                child: Some(ChildHandle::Pty(child)),
            },
        ));

        if let Err(e) = reader::spawn_pty_reader(
            Arc::clone(&shell),
            reader_endpoint,
            self.output_tx.clone(),
            self.close_tx.subscribe(),
        ) {
            let _ = killer.kill();
            return Err(e);
        }
        Ok(shell)
    }

    /// Non-interactive path: three plain pipes, one reader task per output
    /// pipe, stream labels preserved.
    fn spawn_piped_shell(&self, command: &[&str]) -> Result<Arc<Shell>, ShellError> {
        let mut cmd = tokio::process::Command::new(command[0]);
        cmd.args(&command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ShellError::SpawnFailed(format!("failed to start {command:?}: {e}")))?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(ShellError::SpawnFailed(
                "child pipes were not captured".into(),
            ));
        };

        let shell = Arc::new(Shell::new(
            false,
            ShellIo {
                input: Some(InputEndpoint::Pipe(stdin)),
                master: None,
                child: Some(ChildHandle::Pipe(child)),
            },
        ));

        reader::spawn_pipe_reader(
            Arc::clone(&shell),
            stdout,
            false,
            self.output_tx.clone(),
            self.close_tx.subscribe(),
        );
        reader::spawn_pipe_reader(
            Arc::clone(&shell),
            stderr,
            true,
            self.output_tx.clone(),
            self.close_tx.subscribe(),
        );
        Ok(shell)
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Get a shell by id.
    pub fn get(&self, shell_id: &str) -> Option<Arc<Shell>> {
        self.shells.lock().unwrap().get(shell_id).cloned()
    }

    /// Ids of all live shells.
    pub fn shell_ids(&self) -> Vec<String> {
        self.shells.lock().unwrap().keys().cloned().collect()
    }

    /// Number of live shells.
    pub fn shell_count(&self) -> usize {
        self.shells.lock().unwrap().len()
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Send a command to a shell by id.
    pub async fn send_command(&self, shell_id: &str, command: &str) -> Result<(), TermplexError> {
        let shell = self
            .get(shell_id)
            .ok_or_else(|| TermplexError::ShellNotFound(shell_id.to_string()))?;
        shell.send_command(command).await?;
        debug!(shell = id::short(shell_id), command, "command sent");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Termination
    // -------------------------------------------------------------------------

    /// Close one shell with the given grace period and remove it.
    ///
    /// A failed close does not prevent removal; the error is still
    /// surfaced so callers can tell a forced termination from a graceful
    /// one. Unknown ids report the actual lookup result.
    pub async fn terminate_shell(
        &self,
        shell_id: &str,
        grace: Duration,
    ) -> Result<(), TermplexError> {
        let shell = self
            .get(shell_id)
            .ok_or_else(|| TermplexError::ShellNotFound(shell_id.to_string()))?;

        let close_result = shell.close(grace).await;
        self.shells.lock().unwrap().remove(shell_id);

        match close_result {
            Ok(()) => {
                info!(shell = id::short(shell_id), "shell terminated");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Terminate every shell.
    ///
    /// The close signal fires first so any producer blocked on the fan-in
    /// channel bails out, then the id set is snapshotted and each shell is
    /// closed in turn. Once this returns no new records are enqueued;
    /// records already in the channel stay drainable until the owner drops
    /// the receiver.
    pub async fn terminate_all(&self, grace: Duration) {
        self.close_tx.send_replace(true);

        let ids = self.shell_ids();
        if ids.is_empty() {
            return;
        }
        info!(count = ids.len(), "terminating all shells");

        for shell_id in ids {
            if let Err(e) = self.terminate_shell(&shell_id, grace).await {
                warn!(shell = id::short(&shell_id), error = %e, "shell close failed during cascade");
            }
        }
    }
}
