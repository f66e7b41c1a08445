//! Timestamp helpers.
//!
//! Snapshot object keys embed a compact UTC timestamp with second
//! resolution (`20240101T000000Z`). All runs format it through
//! [`run_timestamp`] so history keys sort lexicographically by time.

use chrono::{DateTime, Utc};

/// `strftime` pattern for run timestamps embedded in history keys.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Format a UTC instant as a run timestamp.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use common::time::run_timestamp;
///
/// let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap();
/// assert_eq!(run_timestamp(at), "20240101T000005Z");
/// ```
pub fn run_timestamp(at: DateTime<Utc>) -> String {
    at.format(RUN_TIMESTAMP_FORMAT).to_string()
}

// =============================================================================
// Tests
// =============================================================================
