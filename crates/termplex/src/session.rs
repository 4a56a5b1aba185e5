//! Sessions and the process-scoped session manager.
//!
//! A session is the top-level orchestration unit: a named group of windows
//! under a per-session window cap. The [`SessionManager`] is the root of
//! the ownership tree — it owns every session record and every window;
//! sessions hold only window-id references.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use termplex_common::{id, new_id, Result, TermplexError};
use tracing::info;

use crate::window::Window;

/// Snapshot of a top-level orchestration unit.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session id.
    pub id: String,
    /// Human-readable name (e.g. "WebAppDev").
    pub name: String,
    /// When the session was created.
    pub created_at: SystemTime,
    /// Optional metadata (project, owner, purpose).
    pub tags: HashMap<String, String>,
    /// Ids of the windows this session references.
    pub window_refs: HashSet<String>,
}

/// Process-scoped registry of all sessions and all windows.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    windows: Mutex<HashMap<String, Arc<Window>>>,
    max_windows_per_session: usize,
}

impl SessionManager {
    /// Create a manager enforcing `max_windows_per_session`.
    pub fn new(max_windows_per_session: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            windows: Mutex::new(HashMap::new()),
            max_windows_per_session,
        }
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Register a new session, returning its id.
    pub fn create_session(
        &self,
        name: &str,
        tags: Option<HashMap<String, String>>,
    ) -> Result<String> {
        let session_id = new_id();
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&session_id) {
            return Err(TermplexError::IdCollision(session_id));
        }

        sessions.insert(
            session_id.clone(),
            Session {
                id: session_id.clone(),
                name: name.to_string(),
                created_at: SystemTime::now(),
                tags: tags.unwrap_or_default(),
                window_refs: HashSet::new(),
            },
        );
        drop(sessions);

        info!(session = id::short(&session_id), name, "session created");
        Ok(session_id)
    }

    /// Whether a session with this id exists.
    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(session_id)
    }

    /// Snapshot of a session by id.
    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    // -------------------------------------------------------------------------
    // Windows
    // -------------------------------------------------------------------------

    /// Create a window inside a session, returning the window id.
    ///
    /// Fails when the session is unknown or already at its window cap.
    pub fn add_window(
        &self,
        session_id: &str,
        name: &str,
        tags: Option<HashMap<String, String>>,
    ) -> Result<String> {
        {
            let sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get(session_id)
                .ok_or_else(|| TermplexError::SessionNotFound(session_id.to_string()))?;
            if session.window_refs.len() >= self.max_windows_per_session {
                return Err(TermplexError::WindowLimitReached {
                    session_id: session_id.to_string(),
                    max: self.max_windows_per_session,
                });
            }
        }

        let window = Window::new(name, tags);
        let window_id = window.id().to_string();

        let mut windows = self.windows.lock().unwrap();
        if windows.contains_key(&window_id) {
            return Err(TermplexError::IdCollision(window_id));
        }
        windows.insert(window_id.clone(), Arc::new(window));
        drop(windows);

        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.window_refs.insert(window_id.clone());
        }
        drop(sessions);

        info!(
            window = id::short(&window_id),
            session = id::short(session_id),
            name,
            "window added"
        );
        Ok(window_id)
    }

    /// Get a window by id.
    pub fn get_window(&self, window_id: &str) -> Option<Arc<Window>> {
        self.windows.lock().unwrap().get(window_id).cloned()
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Terminate a session: every referenced window is terminated and
    /// removed, then the session itself.
    ///
    /// A second call on the same id reports the session as not found.
    pub async fn terminate_session(&self, session_id: &str) -> Result<()> {
        let window_refs = {
            let sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get(session_id)
                .ok_or_else(|| TermplexError::SessionNotFound(session_id.to_string()))?;
            session.window_refs.iter().cloned().collect::<Vec<_>>()
        };

        for window_id in window_refs {
            let window = self.windows.lock().unwrap().remove(&window_id);
            if let Some(window) = window {
                window.terminate().await;
            }
        }

        self.sessions.lock().unwrap().remove(session_id);
        info!(session = id::short(session_id), "session terminated");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Manifest builder
    // -------------------------------------------------------------------------

    /// Build a complete session tree from a `.termplex.json` manifest:
    /// session, windows, panes (with their tags), startup shells, and the
    /// startup commands fed to each shell after spawn.
    pub async fn create_session_from_manifest(&self, path: &Path) -> Result<String> {
        let manifest = termplex_manifest::load_from_file(path)?;

        let session_id = self.create_session(&manifest.session_name, Some(manifest.session_tags))?;

        for window_manifest in &manifest.windows {
            let window_id = self.add_window(
                &session_id,
                &window_manifest.window_name,
                Some(window_manifest.window_tags.clone()),
            )?;
            let window = self
                .get_window(&window_id)
                .ok_or_else(|| TermplexError::WindowNotFound(window_id.clone()))?;

            for pane_manifest in &window_manifest.panes {
                let pane_id = window.add_pane(None)?;
                let pane = window
                    .get_pane(&pane_id)
                    .ok_or_else(|| TermplexError::PaneNotFound(pane_id.clone()))?;

                for (key, value) in &pane_manifest.pane_tags {
                    pane.add_tag(key, value);
                }

                let argv: Vec<&str> = pane_manifest
                    .startup_shell
                    .command
                    .iter()
                    .map(String::as_str)
                    .collect();
                let shell = pane
                    .spawn_shell(pane_manifest.startup_shell.interactive, &argv)
                    .await?;

                for command in &pane_manifest.startup_commands {
                    shell.send_command(command).await?;
                }
            }
        }

        Ok(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_lookup_session() {
        let manager = SessionManager::new(5);
        let mut tags = HashMap::new();
        tags.insert("owner".to_string(), "owen".to_string());

        let session_id = manager
            .create_session("DemoProject", Some(tags))
            .expect("create session");

        assert!(manager.has_session(&session_id));
        let session = manager.get_session(&session_id).expect("session exists");
        assert_eq!(session.name, "DemoProject");
        assert_eq!(session.tags.get("owner").map(String::as_str), Some("owen"));
        assert!(session.window_refs.is_empty());

        assert!(!manager.has_session("missing"));
        assert!(manager.get_session("missing").is_none());
    }

    #[tokio::test]
    async fn add_window_requires_a_session() {
        let manager = SessionManager::new(5);
        let err = manager.add_window("missing", "W", None).unwrap_err();
        assert!(matches!(err, TermplexError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn window_cap_is_enforced() {
        const CAP: usize = 2;
        let manager = SessionManager::new(CAP);
        let session_id = manager.create_session("Capped", None).expect("create");

        for i in 0..CAP {
            manager
                .add_window(&session_id, &format!("w{i}"), None)
                .expect("window under the cap");
        }

        let err = manager.add_window(&session_id, "over", None).unwrap_err();
        assert!(matches!(err, TermplexError::WindowLimitReached { max, .. } if max == CAP));

        // The failed add leaves the session's window set unchanged.
        let session = manager.get_session(&session_id).expect("session");
        assert_eq!(session.window_refs.len(), CAP);
    }

    #[tokio::test]
    async fn terminate_session_is_not_repeatable() {
        let manager = SessionManager::new(5);
        let session_id = manager.create_session("Once", None).expect("create");
        let window_id = manager
            .add_window(&session_id, "W", None)
            .expect("add window");

        manager
            .terminate_session(&session_id)
            .await
            .expect("first termination succeeds");
        assert!(!manager.has_session(&session_id));
        assert!(manager.get_window(&window_id).is_none());

        let err = manager.terminate_session(&session_id).await.unwrap_err();
        assert!(matches!(err, TermplexError::SessionNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn manifest_builds_the_full_tree() {
        let manifest_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("example.termplex.json");

        let manager = SessionManager::new(5);
        let session_id = manager
            .create_session_from_manifest(&manifest_path)
            .await
            .expect("manifest should build");

        let session = manager.get_session(&session_id).expect("session exists");
        assert_eq!(session.name, "WebAppDev");
        assert_eq!(
            session.tags.get("project").map(String::as_str),
            Some("termplex-demo")
        );
        assert_eq!(session.window_refs.len(), 1);

        let window_id = session.window_refs.iter().next().expect("one window");
        let window = manager.get_window(window_id).expect("window exists");
        assert_eq!(window.pane_count(), 2);

        // Give the startup shells a moment to land in their registries.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        for pane_id in window.pane_ids() {
            let pane = window.get_pane(&pane_id).expect("pane exists");
            assert!(
                pane.shells().shell_count() >= 1,
                "pane {pane_id} should have at least one shell"
            );
        }

        manager
            .terminate_session(&session_id)
            .await
            .expect("teardown");
    }
}
