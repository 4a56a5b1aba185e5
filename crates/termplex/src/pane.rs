//! Panes: multitasking workspaces that multiplex many shells' output onto
//! one labeled stream.
//!
//! A pane owns a dedicated [`ShellManager`] and re-publishes its fan-in
//! channel to pane subscribers through a long-lived forwarder task, so a
//! consumer reads one channel per pane no matter how many shells exist. A
//! pane hosts at most one interactive shell at a time plus any number of
//! non-interactive ones, and carries a tag map with a rendezvous primitive
//! for synchronizing external waiters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use termplex_common::{id, new_id, Result, TermplexError};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::shell::{PaneOutput, Shell, ShellManager, OUTPUT_CHANNEL_CAPACITY, REPLACE_GRACE};

/// A workspace within a window.
pub struct Pane {
    id: String,
    name: Option<String>,
    created_at: SystemTime,
    shells: ShellManager,
    /// Id of the current interactive shell. Non-owning: the shell itself
    /// lives in the manager's map. Held across the replace-then-promote
    /// sequence so two concurrent interactive spawns cannot both win.
    interactive: AsyncMutex<Option<String>>,
    /// Tag store inside a watch channel: mutation and wake-up are one
    /// atomic step, so no signal is lost between a waiter's check and its
    /// sleep.
    tags_tx: watch::Sender<HashMap<String, String>>,
    /// Subscriber half of the pane's output channel, handed out once.
    output_rx: Mutex<Option<mpsc::Receiver<PaneOutput>>>,
    close_tx: watch::Sender<bool>,
}

impl Pane {
    /// Create a pane with a fresh id and start its output forwarder.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: Option<&str>) -> Arc<Self> {
        let (shells, registry_rx) = ShellManager::new();
        let (pane_tx, pane_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (close_tx, close_rx) = watch::channel(false);
        let (tags_tx, _) = watch::channel(HashMap::new());

        let pane = Arc::new(Self {
            id: new_id(),
            name: name.map(str::to_string),
            created_at: SystemTime::now(),
            shells,
            interactive: AsyncMutex::new(None),
            tags_tx,
            output_rx: Mutex::new(Some(pane_rx)),
            close_tx,
        });

        tokio::spawn(forward_output(
            pane.id.clone(),
            registry_rx,
            pane_tx,
            close_rx,
        ));

        debug!(pane = id::short(&pane.id), name = ?pane.name, "pane created");
        pane
    }

    /// Unique id of this pane.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Optional human-readable name for easier targeting.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// When the pane was created.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// The pane's shell manager.
    pub fn shells(&self) -> &ShellManager {
        &self.shells
    }

    /// Take the subscriber half of the pane's output channel.
    ///
    /// Yields every [`PaneOutput`] record from every shell in the pane.
    /// After termination the channel drains its buffered records and then
    /// ends. Returns `None` if already taken.
    pub fn take_output(&self) -> Option<mpsc::Receiver<PaneOutput>> {
        self.output_rx.lock().unwrap().take()
    }

    // -------------------------------------------------------------------------
    // Shells
    // -------------------------------------------------------------------------

    /// Spawn a shell in this pane.
    ///
    /// A second interactive shell replaces the first: the existing one is
    /// terminated with a 5 s grace, then the new one is promoted. The
    /// manager starts the readers before this returns.
    pub async fn spawn_shell(&self, interactive: bool, command: &[&str]) -> Result<Arc<Shell>> {
        if !interactive {
            return Ok(self.shells.spawn_shell(false, command)?);
        }

        let mut slot = self.interactive.lock().await;
        if let Some(previous) = slot.take() {
            info!(
                pane = id::short(&self.id),
                previous = id::short(&previous),
                "replacing interactive shell"
            );
            if let Err(e) = self.shells.terminate_shell(&previous, REPLACE_GRACE).await {
                warn!(
                    pane = id::short(&self.id),
                    error = %e,
                    "previous interactive shell did not close cleanly"
                );
            }
        }

        let shell = self.shells.spawn_shell(true, command)?;
        *slot = Some(shell.id().to_string());
        Ok(shell)
    }

    /// Id of the current interactive shell, if any.
    pub async fn interactive_shell_id(&self) -> Option<String> {
        self.interactive.lock().await.clone()
    }

    /// Send a command to a shell in this pane.
    pub async fn send_command(&self, shell_id: &str, command: &str) -> Result<()> {
        self.shells.send_command(shell_id, command).await
    }

    /// Terminate one shell, clearing the interactive slot if it matches.
    pub async fn terminate_shell(&self, shell_id: &str, grace: Duration) -> Result<()> {
        {
            let mut slot = self.interactive.lock().await;
            if slot.as_deref() == Some(shell_id) {
                *slot = None;
            }
        }
        self.shells.terminate_shell(shell_id, grace).await
    }

    // -------------------------------------------------------------------------
    // Tags
    // -------------------------------------------------------------------------

    /// Add or update a tag, waking every waiter.
    pub fn add_tag(&self, key: &str, value: &str) {
        info!(pane = id::short(&self.id), key, value, "pane tagged");
        self.tags_tx.send_modify(|tags| {
            tags.insert(key.to_string(), value.to_string());
        });
    }

    /// Current value of a tag.
    pub fn tag(&self, key: &str) -> Option<String> {
        self.tags_tx.borrow().get(key).cloned()
    }

    /// Snapshot of the whole tag map.
    pub fn tags(&self) -> HashMap<String, String> {
        self.tags_tx.borrow().clone()
    }

    /// Block until `tags[key] == value` or `timeout` elapses.
    ///
    /// A predicate that already holds returns immediately; otherwise the
    /// waiter is re-checked on every tag change.
    pub async fn wait_for_tag(&self, key: &str, value: &str, timeout: Duration) -> Result<()> {
        let mut rx = self.tags_tx.subscribe();
        let satisfied = rx.wait_for(|tags| tags.get(key).map(String::as_str) == Some(value));

        let result = match tokio::time::timeout(timeout, satisfied).await {
            Ok(Ok(_)) => Ok(()),
            // Timeout, or the pane went away while waiting.
            _ => Err(TermplexError::TagTimeout {
                key: key.to_string(),
                value: value.to_string(),
                pane_id: self.id.clone(),
            }),
        };
        result
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Terminate every shell and end the subscriber stream.
    ///
    /// The close signal stops the forwarder first, then the manager closes
    /// each shell. The subscriber channel yields any records still buffered
    /// and then signals end-of-stream.
    pub async fn terminate(&self, grace: Duration) {
        info!(pane = id::short(&self.id), "terminating pane");
        self.close_tx.send_replace(true);
        self.shells.terminate_all(grace).await;
        self.interactive.lock().await.take();
    }
}

/// Re-publish manager output onto the pane's subscriber channel.
///
/// Dropping `pane_tx` on exit is what closes the subscriber stream. Both
/// the receive and the send give way to the close signal so termination
/// never waits on a slow subscriber.
async fn forward_output(
    pane_id: String,
    mut registry_rx: mpsc::Receiver<PaneOutput>,
    pane_tx: mpsc::Sender<PaneOutput>,
    mut close_rx: watch::Receiver<bool>,
) {
    loop {
        let record = tokio::select! {
            biased;
            _ = close_rx.changed() => break,
            maybe = registry_rx.recv() => match maybe {
                Some(record) => record,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = close_rx.changed() => break,
            sent = pane_tx.send(record) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!(pane = id::short(&pane_id), "output forwarder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout as tokio_timeout;

    #[tokio::test]
    async fn take_output_hands_out_the_receiver_once() {
        let pane = Pane::new(Some("solo"));
        assert!(pane.take_output().is_some());
        assert!(pane.take_output().is_none());
        pane.terminate(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn tag_rendezvous_wakes_existing_waiter() {
        let pane = Pane::new(None);

        let waiter = {
            let pane = Arc::clone(&pane);
            tokio::spawn(async move {
                pane.wait_for_tag("phase", "ready", Duration::from_secs(2)).await
            })
        };

        // Give the waiter a chance to park before the tag lands.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pane.add_tag("phase", "ready");

        waiter
            .await
            .expect("waiter task panicked")
            .expect("waiter should observe the tag");
        pane.terminate(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn tag_rendezvous_returns_immediately_when_already_set() {
        let pane = Pane::new(None);
        pane.add_tag("phase", "ready");

        let start = tokio::time::Instant::now();
        pane.wait_for_tag("phase", "ready", Duration::from_secs(2))
            .await
            .expect("predicate already holds");
        assert!(start.elapsed() < Duration::from_millis(100));
        pane.terminate(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn tag_rendezvous_times_out_with_context() {
        let pane = Pane::new(None);
        pane.add_tag("phase", "starting");

        let err = pane
            .wait_for_tag("phase", "ready", Duration::from_millis(100))
            .await
            .unwrap_err();
        match err {
            TermplexError::TagTimeout { key, value, pane_id } => {
                assert_eq!(key, "phase");
                assert_eq!(value, "ready");
                assert_eq!(pane_id, pane.id());
            }
            other => panic!("expected TagTimeout, got {other}"),
        }
        pane.terminate(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn tag_overwrite_wakes_waiter() {
        let pane = Pane::new(None);
        pane.add_tag("build", "running");

        let waiter = {
            let pane = Arc::clone(&pane);
            tokio::spawn(async move {
                pane.wait_for_tag("build", "done", Duration::from_secs(2)).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        pane.add_tag("build", "done");

        waiter.await.expect("join").expect("waiter should wake");
        assert_eq!(pane.tag("build").as_deref(), Some("done"));
        pane.terminate(Duration::from_millis(50)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn multiplexes_output_from_many_shells() {
        let pane = Pane::new(Some("mux"));
        let mut rx = pane.take_output().expect("subscriber");

        const NUM_SHELLS: usize = 5;
        let mut expected = std::collections::HashSet::new();
        for i in 0..NUM_SHELLS {
            expected.insert(format!("stdout-from-shell-{i}"));
            expected.insert(format!("stderr-from-shell-{i}"));
            let script = format!("echo 'stdout-from-shell-{i}'; >&2 echo 'stderr-from-shell-{i}'");
            pane.spawn_shell(false, &["bash", "-c", &script])
                .await
                .expect("spawn");
        }

        let mut received = std::collections::HashSet::new();
        while received.len() < NUM_SHELLS * 2 {
            let record = tokio_timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap_or_else(|_| {
                    panic!(
                        "timed out with {} of {} markers",
                        received.len(),
                        NUM_SHELLS * 2
                    )
                })
                .expect("subscriber closed prematurely");
            assert!(!record.shell_id.is_empty());
            let text = String::from_utf8_lossy(&record.data).trim().to_string();
            if expected.contains(&text) {
                received.insert(text);
            }
        }

        pane.terminate(Duration::from_millis(500)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_metadata_identifies_shell_and_stream() {
        let pane = Pane::new(None);
        let mut rx = pane.take_output().expect("subscriber");

        let shell1 = pane
            .spawn_shell(false, &["bash", "-c", "echo 'out 1'; >&2 echo 'err 1'"])
            .await
            .expect("spawn 1");
        let shell2 = pane
            .spawn_shell(false, &["bash", "-c", "echo 'out 2'; >&2 echo 'err 2'"])
            .await
            .expect("spawn 2");

        let mut seen: HashMap<(String, bool), String> = HashMap::new();
        while seen.len() < 4 {
            let record = tokio_timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for shell outputs")
                .expect("subscriber closed prematurely");
            let text = String::from_utf8_lossy(&record.data).trim().to_string();
            if text.starts_with("out") || text.starts_with("err") {
                seen.insert((record.shell_id.clone(), record.is_stderr), text);
            }
        }

        assert_eq!(
            seen.get(&(shell1.id().to_string(), false)).map(String::as_str),
            Some("out 1")
        );
        assert_eq!(
            seen.get(&(shell1.id().to_string(), true)).map(String::as_str),
            Some("err 1")
        );
        assert_eq!(
            seen.get(&(shell2.id().to_string(), false)).map(String::as_str),
            Some("out 2")
        );
        assert_eq!(
            seen.get(&(shell2.id().to_string(), true)).map(String::as_str),
            Some("err 2")
        );

        pane.terminate(Duration::from_millis(500)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn second_interactive_shell_replaces_the_first() {
        let pane = Pane::new(None);

        let first = pane
            .spawn_shell(true, &["bash", "-i"])
            .await
            .expect("first interactive shell");
        assert_eq!(
            pane.interactive_shell_id().await.as_deref(),
            Some(first.id())
        );

        let second = pane
            .spawn_shell(true, &["bash", "-i"])
            .await
            .expect("second interactive shell should replace the first");

        assert_ne!(first.id(), second.id());
        assert_eq!(
            pane.interactive_shell_id().await.as_deref(),
            Some(second.id())
        );
        // The first shell is gone from the manager; only the new one lives.
        assert!(pane.shells().get(first.id()).is_none());
        assert_eq!(pane.shells().shell_count(), 1);

        pane.terminate(Duration::from_millis(500)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn interactive_shell_output_reaches_subscribers() {
        let pane = Pane::new(None);
        let mut rx = pane.take_output().expect("subscriber");

        let shell = pane
            .spawn_shell(true, &["bash", "-i"])
            .await
            .expect("spawn interactive");
        tokio::time::sleep(Duration::from_millis(200)).await;

        let phrase = "testing interactive output";
        pane.send_command(shell.id(), &format!("echo '{phrase}'"))
            .await
            .expect("send");

        let mut accumulated = String::new();
        let found = tokio_timeout(Duration::from_secs(3), async {
            loop {
                match rx.recv().await {
                    Some(record) => {
                        assert!(
                            !record.is_stderr,
                            "pty records carry the merged-stream stdout label"
                        );
                        accumulated.push_str(&String::from_utf8_lossy(&record.data));
                        if accumulated.contains(phrase) {
                            break true;
                        }
                    }
                    None => break false,
                }
            }
        })
        .await;
        assert!(matches!(found, Ok(true)), "accumulated: {accumulated:?}");

        pane.terminate(Duration::from_millis(500)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_ends_the_subscriber_stream() {
        let pane = Pane::new(None);
        let mut rx = pane.take_output().expect("subscriber");

        let shell = pane
            .spawn_shell(false, &["bash", "-c", "echo 'one-shot'"])
            .await
            .expect("spawn");
        shell
            .wait_for_output("one-shot", Duration::from_secs(2))
            .await
            .expect("output captured");

        pane.terminate(Duration::from_millis(500)).await;

        // Buffered records drain, then the stream ends.
        let drained = tokio_timeout(Duration::from_secs(2), async {
            while let Some(record) = rx.recv().await {
                assert_eq!(record.shell_id, shell.id());
            }
        })
        .await;
        assert!(drained.is_ok(), "subscriber stream did not end");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_shell_clears_interactive_slot() {
        let pane = Pane::new(None);
        let shell = pane
            .spawn_shell(true, &["bash", "-i"])
            .await
            .expect("spawn interactive");

        // Forced close is expected here: the shell ignores EOF.
        let _ = pane
            .terminate_shell(shell.id(), Duration::from_millis(100))
            .await;

        assert!(pane.interactive_shell_id().await.is_none());
        assert_eq!(pane.shells().shell_count(), 0);
        pane.terminate(Duration::from_millis(100)).await;
    }
}
