//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current wall-clock time as nanoseconds since the Unix epoch
///
/// Saturates to 0 for clocks set before 1970 and to `i64::MAX` far in the future.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX).max(0)
}

/// Current wall-clock time as milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Elapsed time between two nanosecond timestamps, saturating at zero
pub fn elapsed_between_nanos(start_nanos: i64, end_nanos: i64) -> Duration {
    let delta = end_nanos.saturating_sub(start_nanos);
    if delta <= 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(delta as u64)
    }
}
