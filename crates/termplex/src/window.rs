//! Windows: named containers of panes with cascaded termination.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use termplex_common::{id, new_id, Result, TermplexError};
use tracing::info;

use crate::pane::Pane;
use crate::shell::DEFAULT_GRACE;

/// A logical project or domain boundary owning a set of panes.
pub struct Window {
    id: String,
    name: String,
    created_at: SystemTime,
    tags: Mutex<HashMap<String, String>>,
    panes: Mutex<HashMap<String, Arc<Pane>>>,
}

impl Window {
    /// Create a window with a fresh id and optional tags.
    pub fn new(name: &str, tags: Option<HashMap<String, String>>) -> Self {
        Self {
            id: new_id(),
            name: name.to_string(),
            created_at: SystemTime::now(),
            tags: Mutex::new(tags.unwrap_or_default()),
            panes: Mutex::new(HashMap::new()),
        }
    }

    /// Unique id of this window.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the window was created.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Snapshot of the window's tag map.
    pub fn tags(&self) -> HashMap<String, String> {
        self.tags.lock().unwrap().clone()
    }

    /// Add or update a tag on the window.
    pub fn add_tag(&self, key: &str, value: &str) {
        self.tags
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    // -------------------------------------------------------------------------
    // Panes
    // -------------------------------------------------------------------------

    /// Create and register a new pane, returning its id.
    ///
    /// Freshly minted ids colliding is astronomically improbable, but the
    /// contract requires the check.
    pub fn add_pane(&self, name: Option<&str>) -> Result<String> {
        let pane = Pane::new(name);
        let pane_id = pane.id().to_string();

        let mut panes = self.panes.lock().unwrap();
        if panes.contains_key(&pane_id) {
            return Err(TermplexError::IdCollision(pane_id));
        }
        panes.insert(pane_id.clone(), pane);
        drop(panes);

        info!(
            pane = id::short(&pane_id),
            window = id::short(&self.id),
            "pane created"
        );
        Ok(pane_id)
    }

    /// Get a pane by id.
    pub fn get_pane(&self, pane_id: &str) -> Option<Arc<Pane>> {
        self.panes.lock().unwrap().get(pane_id).cloned()
    }

    /// Ids of all panes in this window.
    pub fn pane_ids(&self) -> Vec<String> {
        self.panes.lock().unwrap().keys().cloned().collect()
    }

    /// Number of panes in this window.
    pub fn pane_count(&self) -> usize {
        self.panes.lock().unwrap().len()
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Terminate every pane and remove it.
    ///
    /// The id set is snapshotted first; mutating the map while iterating
    /// it is never safe.
    pub async fn terminate(&self) {
        let pane_ids = self.pane_ids();
        for pane_id in pane_ids {
            let pane = self.panes.lock().unwrap().remove(&pane_id);
            if let Some(pane) = pane {
                pane.terminate(DEFAULT_GRACE).await;
                info!(
                    pane = id::short(&pane_id),
                    window = id::short(&self.id),
                    "pane terminated"
                );
            }
        }
        info!(window = id::short(&self.id), "window terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_get_panes() {
        let window = Window::new("test-window", None);
        assert!(!window.id().is_empty());

        let pane1 = window.add_pane(Some("test-pane-1")).expect("add pane 1");
        let pane2 = window.add_pane(Some("test-pane-2")).expect("add pane 2");

        assert_eq!(window.pane_count(), 2);
        assert!(window.get_pane(&pane1).is_some());
        assert!(window.get_pane(&pane2).is_some());
        assert!(window.get_pane("missing").is_none());
        assert_eq!(
            window.get_pane(&pane1).unwrap().name(),
            Some("test-pane-1")
        );

        window.terminate().await;
    }

    #[tokio::test]
    async fn tags_round_trip() {
        let mut tags = HashMap::new();
        tags.insert("project".to_string(), "api".to_string());
        let window = Window::new("tagged", Some(tags));

        assert_eq!(window.tags().get("project").map(String::as_str), Some("api"));
        window.add_tag("owner", "owen");
        assert_eq!(window.tags().get("owner").map(String::as_str), Some("owen"));
        window.terminate().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_cascades_through_running_shells() {
        let window = Window::new("api-server", None);
        let pane_id = window.add_pane(Some("worker-pane")).expect("add pane");
        let pane = window.get_pane(&pane_id).expect("pane exists");

        pane.spawn_shell(false, &["bash", "-c", "sleep 5"])
            .await
            .expect("spawn shell");
        assert_eq!(pane.shells().shell_count(), 1);

        window.terminate().await;
        assert_eq!(window.pane_count(), 0);
        assert_eq!(pane.shells().shell_count(), 0);
    }

    #[tokio::test]
    async fn terminate_twice_is_harmless() {
        let window = Window::new("idempotent", None);
        window.add_pane(None).expect("add pane");
        window.terminate().await;
        window.terminate().await;
        assert_eq!(window.pane_count(), 0);
    }
}
