//! Serde schema for `.termplex.json` files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A complete orchestration session as described on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub session_name: String,
    #[serde(default)]
    pub session_tags: HashMap<String, String>,
    #[serde(default)]
    pub windows: Vec<WindowManifest>,
}

/// A single window to be created within the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowManifest {
    pub window_name: String,
    #[serde(default)]
    pub window_tags: HashMap<String, String>,
    #[serde(default)]
    pub panes: Vec<PaneManifest>,
}

/// A single pane to be created within a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneManifest {
    #[serde(default)]
    pub pane_tags: HashMap<String, String>,
    pub startup_shell: ShellManifest,
    /// Commands sent verbatim to the startup shell after it spawns.
    #[serde(default)]
    pub startup_commands: Vec<String>,
}

/// The shell process to spawn in a pane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellManifest {
    pub interactive: bool,
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_manifest() {
        let json = r#"{
            "sessionName": "TestSession",
            "sessionTags": { "project": "tester" },
            "windows": [
                {
                    "windowName": "TestWindow",
                    "panes": [
                        {
                            "startupShell": { "interactive": true, "command": ["bash", "-i"] },
                            "startupCommands": ["echo 'hello'"]
                        }
                    ]
                }
            ]
        }"#;

        let m: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(m.session_name, "TestSession");
        assert_eq!(m.session_tags.get("project").map(String::as_str), Some("tester"));
        assert_eq!(m.windows.len(), 1);
        assert_eq!(m.windows[0].window_name, "TestWindow");
        assert_eq!(m.windows[0].panes.len(), 1);

        let pane = &m.windows[0].panes[0];
        assert!(pane.startup_shell.interactive);
        assert_eq!(pane.startup_shell.command, vec!["bash", "-i"]);
        assert_eq!(pane.startup_commands, vec!["echo 'hello'"]);
    }

    #[test]
    fn optional_fields_default_to_empty() {
        let json = r#"{ "sessionName": "Bare" }"#;
        let m: Manifest = serde_json::from_str(json).unwrap();
        assert!(m.session_tags.is_empty());
        assert!(m.windows.is_empty());
    }

    #[test]
    fn missing_session_name_is_an_error() {
        let json = r#"{ "windows": [] }"#;
        let result: Result<Manifest, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
