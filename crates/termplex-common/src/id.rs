//! Id minting for sessions, windows, panes, and shells.

/// Mint a fresh unique id (UUID v4, hyphenated string form).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Return a short suffix of an id for log lines.
///
/// Full UUIDs drown log output; the last 8 characters are unique enough
/// for a human following a single run.
pub fn short(id: &str) -> &str {
    let len = id.len();
    &id[len.saturating_sub(8)..]
}
