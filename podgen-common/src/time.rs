//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as milliseconds since the Unix epoch
///
/// Follows the system clock, so successive values are only non-decreasing
/// while the clock is not adjusted backwards.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
