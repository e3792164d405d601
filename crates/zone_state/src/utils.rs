//! # Utility Functions
//!
//! Timestamp helpers used by every layer. All record, instance and snapshot
//! timestamps are Unix epoch milliseconds produced by [`current_timestamp_ms`].

use chrono::Utc;

/// Returns the current Unix timestamp in milliseconds.
///
/// Clocks before the epoch are clamped to zero.
pub fn current_timestamp_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Returns a timestamp that is never lower than `previous`.
///
/// Mutations stamp `lastModifiedAt` through this so it never decreases.
pub fn monotonic_after(previous: u64) -> u64 {
    current_timestamp_ms().max(previous)
}
