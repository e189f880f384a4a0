//! Shared id types and time helpers for the babelink workspace.

pub mod types;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in whole seconds.
#[must_use]
pub fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
