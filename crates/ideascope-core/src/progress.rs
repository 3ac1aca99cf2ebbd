//! Completion estimate for finished or partial runs.

use std::time::Duration;

/// An interrupted run never reports more than this.
pub const INTERRUPTED_PROGRESS_CEILING: u8 = 95;

/// Inputs to [`estimate_progress`].
#[derive(Debug, Clone, Copy)]
pub struct ProgressInput {
    pub interrupted: bool,
    pub tool_calls: u32,
    pub max_tool_calls: u32,
    pub elapsed: Duration,
    pub timeout: Duration,
    /// Progress reported by the run this one resumed from.
    pub previous_progress: u8,
}

/// Convert call counts or elapsed time into a percentage.
///
/// - not interrupted: 100
/// - interrupted, positive tool budget: `min(95, round(100 * calls / budget))`
/// - interrupted, tools disabled: `min(95, previous + round(100 * elapsed / timeout))`
pub fn estimate_progress(input: ProgressInput) -> u8 {
    if !input.interrupted {
        return 100;
    }

    let estimate = if input.max_tool_calls > 0 {
        percent(input.tool_calls as f64, input.max_tool_calls as f64)
    } else {
        let timeout = input.timeout.as_secs_f64();
        let by_time = if timeout > 0.0 {
            percent(input.elapsed.as_secs_f64(), timeout)
        } else {
            0
        };
        u64::from(input.previous_progress).saturating_add(by_time)
    };

    estimate.min(u64::from(INTERRUPTED_PROGRESS_CEILING)) as u8
}

fn percent(part: f64, whole: f64) -> u64 {
    (100.0 * part / whole).round().max(0.0) as u64
}
