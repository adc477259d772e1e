//! Retry delay policy
//!
//! The delay before attempt `n + 1` depends only on the task kind and the
//! number of retries already consumed. AI-bound kinds back off over hours
//! since provider outages can be long; offline processing retries on a
//! short linear schedule.

use std::time::Duration;

use crate::tasks::TaskKind;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// Exponential schedule for AI-bound kinds
const AI_SCHEDULE_SECS: [u64; 10] = [
    30,
    MINUTE,
    2 * MINUTE,
    5 * MINUTE,
    10 * MINUTE,
    20 * MINUTE,
    30 * MINUTE,
    HOUR,
    2 * HOUR,
    4 * HOUR,
];

/// Linear schedule for offline kinds
const OFFLINE_SCHEDULE_SECS: [u64; 3] = [MINUTE, 5 * MINUTE, 15 * MINUTE];

/// Delay before the next attempt
///
/// # Arguments
/// * `kind` - Task kind
/// * `attempt` - Retries already consumed (0 for the first failure)
///
/// Attempts beyond the end of a schedule reuse its last step.
pub fn retry_delay(kind: TaskKind, attempt: u32) -> Duration {
    let schedule: &[u64] = if kind.is_ai_bound() {
        &AI_SCHEDULE_SECS
    } else {
        &OFFLINE_SCHEDULE_SECS
    };
    let index = (attempt as usize).min(schedule.len() - 1);
    Duration::from_secs(schedule[index])
}
