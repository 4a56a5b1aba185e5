//! A single managed shell process.

use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use portable_pty::MasterPty;
use termplex_common::{id, new_id, ShellError};
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::record::{OutputBuffers, WAIT_POLL_INTERVAL, WAIT_TIMEOUT};

// =============================================================================
// I/O ENDPOINTS
// =============================================================================

/// The writable endpoint of a shell: the PTY master's writer for
/// interactive shells, the stdin pipe otherwise.
pub(crate) enum InputEndpoint {
    Pty(Box<dyn Write + Send>),
    Pipe(ChildStdin),
}

/// The reaped-or-killed process handle behind a shell.
pub(crate) enum ChildHandle {
    Pty(Box<dyn portable_pty::Child + Send + Sync>),
    Pipe(tokio::process::Child),
}

/// Everything that gets torn down on close, behind one async lock.
pub(crate) struct ShellIo {
    pub(crate) input: Option<InputEndpoint>,
    /// PTY master handle; `None` for pipe-mode shells. Dropped together
    /// with the input endpoint so the child sees the hangup.
    pub(crate) master: Option<Box<dyn MasterPty + Send>>,
    pub(crate) child: Option<ChildHandle>,
}

// =============================================================================
// SHELL
// =============================================================================

/// An active, managed shell process.
///
/// Created by [`super::ShellManager::spawn_shell`], which also starts the
/// reader tasks. The readers are the only writers of the capture buffers;
/// the buffers grow monotonically until [`Shell::send_command_and_wait`]
/// resets the stdout half.
pub struct Shell {
    id: String,
    interactive: bool,
    started_at: SystemTime,
    buffers: Mutex<OutputBuffers>,
    io: AsyncMutex<ShellIo>,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("id", &self.id)
            .field("interactive", &self.interactive)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl Shell {
    pub(crate) fn new(interactive: bool, io: ShellIo) -> Self {
        Self {
            id: new_id(),
            interactive,
            started_at: SystemTime::now(),
            buffers: Mutex::new(OutputBuffers::default()),
            io: AsyncMutex::new(io),
        }
    }

    /// Unique id of this shell.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the shell runs under a pseudo-terminal.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// When the shell was spawned.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Snapshot of everything captured from stdout so far (lossy UTF-8).
    ///
    /// PTY-mode shells capture their merged output here.
    pub fn captured_stdout(&self) -> String {
        let buffers = self.buffers.lock().unwrap();
        String::from_utf8_lossy(&buffers.stdout).into_owned()
    }

    /// Snapshot of everything captured from stderr so far (lossy UTF-8).
    pub fn captured_stderr(&self) -> String {
        let buffers = self.buffers.lock().unwrap();
        String::from_utf8_lossy(&buffers.stderr).into_owned()
    }

    /// Append a chunk to the capture buffers. Called by reader tasks only.
    pub(crate) fn append_output(&self, chunk: &[u8], is_stderr: bool) {
        let mut buffers = self.buffers.lock().unwrap();
        if is_stderr {
            buffers.stderr.extend_from_slice(chunk);
        } else {
            buffers.stdout.extend_from_slice(chunk);
        }
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Write `command` plus a newline to the shell's input endpoint.
    pub async fn send_command(&self, command: &str) -> Result<(), ShellError> {
        let mut io = self.io.lock().await;
        let input = io.input.as_mut().ok_or_else(|| ShellError::InputClosed {
            id: self.id.clone(),
        })?;

        let mut bytes = command.as_bytes().to_vec();
        bytes.push(b'\n');

        match input {
            InputEndpoint::Pty(writer) => {
                // PTY writes land in the kernel terminal buffer; a plain
                // blocking write is fine for command-sized payloads.
                writer
                    .write_all(&bytes)
                    .and_then(|_| writer.flush())
                    .map_err(|e| ShellError::Write {
                        id: self.id.clone(),
                        source: e,
                    })?;
            }
            InputEndpoint::Pipe(stdin) => {
                stdin.write_all(&bytes).await.map_err(|e| ShellError::Write {
                    id: self.id.clone(),
                    source: e,
                })?;
                stdin.flush().await.map_err(|e| ShellError::Write {
                    id: self.id.clone(),
                    source: e,
                })?;
            }
        }
        Ok(())
    }

    /// Send a command and block until it has finished executing.
    ///
    /// The shell is asked to print a unique token after the command
    /// succeeds (`{command} && echo -n {token}`); `-n` keeps the token free
    /// of its own newline so the split is exact, and `&&` stops an
    /// intermediate prompt from leaking into the result. The stdout buffer
    /// is reset first, polled every 100 ms, and everything before the first
    /// token occurrence is returned.
    pub async fn send_command_and_wait(&self, command: &str) -> Result<String, ShellError> {
        self.buffers.lock().unwrap().stdout.clear();

        let token = new_id();
        let full = format!("{command} && echo -n {token}");
        self.send_command(&full).await?;

        let mut tick = tokio::time::interval(WAIT_POLL_INTERVAL);
        let wait = async {
            loop {
                tick.tick().await;
                let output = self.captured_stdout();
                if let Some((before, _)) = output.split_once(token.as_str()) {
                    break before.to_string();
                }
            }
        };

        match tokio::time::timeout(WAIT_TIMEOUT, wait).await {
            Ok(output) => Ok(output),
            Err(_) => Err(ShellError::CommandTimeout {
                id: self.id.clone(),
            }),
        }
    }

    /// Poll the stdout buffer until `needle` appears or `timeout` elapses.
    ///
    /// Useful for synchronizing on a readiness marker ("ready", "listening
    /// on ...") printed by a long-running child.
    pub async fn wait_for_output(&self, needle: &str, timeout: Duration) -> Result<(), ShellError> {
        let mut tick = tokio::time::interval(WAIT_POLL_INTERVAL);
        let wait = async {
            loop {
                tick.tick().await;
                if self.captured_stdout().contains(needle) {
                    break;
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ShellError::OutputTimeout {
                id: self.id.clone(),
                needle: needle.to_string(),
            })
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Gracefully terminate the shell, escalating to a kill after `grace`.
    ///
    /// Dropping the input endpoint (and PTY master) signals the child to
    /// exit via EOF. If it has not been reaped when the grace period ends,
    /// it is killed and [`ShellError::ForcedTermination`] is returned with
    /// the post-kill reap result as its source, so the caller can tell a
    /// forced close from a graceful one. Closing an already-closed shell
    /// returns `Ok` immediately.
    pub async fn close(&self, grace: Duration) -> Result<(), ShellError> {
        let (input, master, child) = {
            let mut io = self.io.lock().await;
            (io.input.take(), io.master.take(), io.child.take())
        };

        // EOF on the write endpoint; closed exactly once thanks to take().
        drop(input);
        drop(master);

        let Some(child) = child else {
            return Ok(());
        };

        let grace_ms = grace.as_millis() as u64;
        match child {
            ChildHandle::Pipe(mut child) => {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(Ok(status)) => {
                        debug!(shell = id::short(&self.id), ?status, "shell exited");
                        Ok(())
                    }
                    Ok(Err(e)) => Err(ShellError::Reap {
                        id: self.id.clone(),
                        source: e,
                    }),
                    Err(_) => {
                        warn!(
                            shell = id::short(&self.id),
                            grace_ms, "grace period expired, killing shell"
                        );
                        if let Err(e) = child.start_kill() {
                            debug!(shell = id::short(&self.id), error = %e, "kill failed (child may have already exited)");
                        }
                        // The reap result after the kill rides along on the
                        // error, like a graceful close would have returned it.
                        let source = match child.wait().await {
                            Ok(status) => std::io::Error::other(format!("exit status: {status}")),
                            Err(e) => e,
                        };
                        Err(ShellError::ForcedTermination {
                            id: self.id.clone(),
                            grace_ms,
                            source,
                        })
                    }
                }
            }
            ChildHandle::Pty(child) => {
                let mut killer = child.clone_killer();
                let mut child = child;
                let mut reap = tokio::task::spawn_blocking(move || child.wait());

                match tokio::time::timeout(grace, &mut reap).await {
                    Ok(Ok(Ok(status))) => {
                        debug!(shell = id::short(&self.id), ?status, "shell exited");
                        Ok(())
                    }
                    Ok(Ok(Err(e))) => Err(ShellError::Reap {
                        id: self.id.clone(),
                        source: e,
                    }),
                    Ok(Err(join_err)) => Err(ShellError::Reap {
                        id: self.id.clone(),
                        source: std::io::Error::other(join_err),
                    }),
                    Err(_) => {
                        warn!(
                            shell = id::short(&self.id),
                            grace_ms, "grace period expired, killing shell"
                        );
                        if let Err(e) = killer.kill() {
                            debug!(shell = id::short(&self.id), error = %e, "kill failed (child may have already exited)");
                        }
                        let source = match reap.await {
                            Ok(Ok(status)) => {
                                std::io::Error::other(format!("exit status: {status:?}"))
                            }
                            Ok(Err(e)) => e,
                            Err(join_err) => std::io::Error::other(join_err),
                        };
                        Err(ShellError::ForcedTermination {
                            id: self.id.clone(),
                            grace_ms,
                            source,
                        })
                    }
                }
            }
        }
    }
}
