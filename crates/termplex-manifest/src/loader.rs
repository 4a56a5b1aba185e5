//! Manifest file loading.

use crate::schema::Manifest;
use std::path::Path;
use termplex_common::ManifestError;
use tracing::info;

/// Read a manifest file from `path` and parse it.
///
/// Read failures and parse failures are reported as distinct errors, both
/// carrying the offending path.
pub fn load_from_file(path: &Path) -> Result<Manifest, ManifestError> {
    let data = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let manifest: Manifest = serde_json::from_str(&data).map_err(|e| ManifestError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    info!(
        session = %manifest.session_name,
        windows = manifest.windows.len(),
        "manifest loaded from {}",
        path.display()
    );
    Ok(manifest)
}
