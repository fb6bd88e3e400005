//! Utility functions for refsync
//!
//! Text normalisation for ledger cells, escaping for rendered payloads,
//! hashing helpers and the atomic file write used by the filesystem store.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Strip ledger export artefacts from a text cell
///
/// Spreadsheet exports wrap cells in quotes and sometimes prefix them with
/// `=` to force text rendering. Leading and trailing `"`, `=` and spaces are
/// removed; a cell made only of those characters becomes empty.
///
/// ```
/// use refsync::utils::strip_textfield;
///
/// assert_eq!(strip_textfield("=\"M.10.01\""), "M.10.01");
/// assert_eq!(strip_textfield("  "), "");
/// ```
pub fn strip_textfield(cell: &str) -> String {
    cell.trim_matches(|c| c == '"' || c == '=' || c == ' ').to_string()
}

/// Hash arbitrary data using SHA-256, hex encoded
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Escape text for inclusion in HTML element content or attributes
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape text for a single-quoted literal in a rendered payload
pub fn escape_literal(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write
///
/// Content goes to a temporary file in the target's directory which is then
/// persisted over the target, so readers see either the old or the new file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Name of the local host, or `unknown` when it cannot be determined
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
