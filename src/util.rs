//! Small shared helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as milliseconds since the UNIX epoch.
///
/// All timestamps in the data model (message creation, delivery, read) use
/// this resolution; the sub-second precision matters for ordering optimistic
/// sends against their server-confirmed counterparts.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Truncate a message body to a short single-line preview for the
/// conversation list.
pub fn preview(body: &str, max_chars: usize) -> String {
    let flat = body.replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}…", &flat[..i]),
        None => flat,
    }
}
