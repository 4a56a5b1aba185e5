//! Optional ANSI escape-code stripping for captured output.

use regex::bytes::Regex;
use std::sync::LazyLock;

/// Matches CSI sequences (params, intermediates, final byte) and lone
/// two-byte escapes.
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)(?:\x1b\[|\x9b)[0-9;:?]*[ -/]*[@-~]|\x1b[@-Z\\-_]").unwrap()
});

/// Remove ANSI escape codes from a byte slice.
///
/// No interpretation happens here; sequences are simply deleted. Useful
/// when asserting on interactive-shell output that carries prompt styling.
pub fn strip_ansi(data: &[u8]) -> Vec<u8> {
    ANSI_RE.replace_all(data, &b""[..]).into_owned()
}
