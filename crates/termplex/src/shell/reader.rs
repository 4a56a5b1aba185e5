//! Reader tasks: move bytes from child endpoints into buffers and the
//! fan-in channel.
//!
//! Pipe-mode shells get one async task per pipe. PTY-mode shells get a
//! dedicated OS thread for the blocking master read, bridged over a bounded
//! channel into an async dispatch task. Readers are the only writers of a
//! shell's capture buffers, and every fan-in send is a two-way select
//! against the owning manager's close signal so a terminated manager never
//! blocks a producer.

use std::io::Read;
use std::sync::Arc;

use termplex_common::{id, ShellError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::record::{PaneOutput, PTY_CHUNK_BUFFER, READ_CHUNK};
use super::session::Shell;

/// Send one record onto the fan-in channel, bailing out if the close
/// signal fires first. Returns `false` when the reader should stop.
async fn forward_record(
    record: PaneOutput,
    tx: &mpsc::Sender<PaneOutput>,
    close_rx: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        biased;
        _ = close_rx.changed() => false,
        sent = tx.send(record) => sent.is_ok(),
    }
}

// =============================================================================
// PIPE READERS
// =============================================================================

/// Start one reader task over a stdout or stderr pipe.
///
/// The task owns its endpoint and closes it on exit. EOF ends the reader
/// silently; any other read error is reported once and ends it.
pub(crate) fn spawn_pipe_reader<R>(
    shell: Arc<Shell>,
    stream: R,
    is_stderr: bool,
    tx: mpsc::Sender<PaneOutput>,
    close_rx: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(run_pipe_reader(shell, stream, is_stderr, tx, close_rx));
}

async fn run_pipe_reader<R: AsyncRead + Unpin>(
    shell: Arc<Shell>,
    mut stream: R,
    is_stderr: bool,
    tx: mpsc::Sender<PaneOutput>,
    mut close_rx: watch::Receiver<bool>,
) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = buf[..n].to_vec();
                shell.append_output(&chunk, is_stderr);
                let record = PaneOutput {
                    shell_id: shell.id().to_string(),
                    at: Instant::now(),
                    data: chunk,
                    is_stderr,
                };
                if !forward_record(record, &tx, &mut close_rx).await {
                    break;
                }
            }
            Err(e) => {
                warn!(shell = id::short(shell.id()), is_stderr, error = %e, "read error, stopping reader");
                break;
            }
        }
    }
}

// =============================================================================
// PTY READER
// =============================================================================

/// Start the reader pair for a PTY master: a named OS thread doing the
/// blocking reads plus an async dispatch task applying the buffer/forward
/// logic.
///
/// A pseudo-terminal merges the child's stdout and stderr into one stream;
/// all merged bytes go through the stdout path (`is_stderr = false`) so the
/// synchronous-wait operations, which poll the stdout buffer, keep working
/// on interactive shells.
pub(crate) fn spawn_pty_reader(
    shell: Arc<Shell>,
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<PaneOutput>,
    close_rx: watch::Receiver<bool>,
) -> Result<(), ShellError> {
    let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(PTY_CHUNK_BUFFER);
    let thread_shell_id = id::short(shell.id()).to_string();

    std::thread::Builder::new()
        .name(format!("pty-reader-{thread_shell_id}"))
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if chunk_tx.blocking_send(buf[..n].to_vec()).is_err() {
                            // Dispatch side is gone; the manager is closing.
                            break;
                        }
                    }
                    Err(e) => {
                        // EIO here is the normal end of a PTY session.
                        debug!(shell = %thread_shell_id, error = %e, "pty reader finished");
                        break;
                    }
                }
            }
        })
        .map_err(|e| ShellError::SpawnFailed(format!("failed to spawn pty reader thread: {e}")))?;

    tokio::spawn(dispatch_pty_chunks(shell, chunk_rx, tx, close_rx));
    Ok(())
}

async fn dispatch_pty_chunks(
    shell: Arc<Shell>,
    mut chunk_rx: mpsc::Receiver<Vec<u8>>,
    tx: mpsc::Sender<PaneOutput>,
    mut close_rx: watch::Receiver<bool>,
) {
    loop {
        let chunk = tokio::select! {
            biased;
            _ = close_rx.changed() => break,
            maybe = chunk_rx.recv() => match maybe {
                Some(chunk) => chunk,
                None => break,
            },
        };

        shell.append_output(&chunk, false);
        let record = PaneOutput {
            shell_id: shell.id().to_string(),
            at: Instant::now(),
            data: chunk,
            is_stderr: false,
        };
        if !forward_record(record, &tx, &mut close_rx).await {
            break;
        }
    }
}
