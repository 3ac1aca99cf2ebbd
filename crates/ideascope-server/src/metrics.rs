//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use crate::state::AppState;

/// Outcome labels always present in the output, even at zero.
const OUTCOME_LABELS: &[&str] = &["completed", "interrupted", "suspended", "busy", "failed"];

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_run_metrics(state, &mut output);
    collect_store_metrics(state, &mut output).await;

    output
}

/// Finished runs by outcome, plus queue and slot gauges.
fn collect_run_metrics(state: &Arc<AppState>, output: &mut String) {
    let counts = state.scheduler.outcome_counts();

    writeln!(output, "# HELP ideascope_runs_total Finished runs by outcome").ok();
    writeln!(output, "# TYPE ideascope_runs_total counter").ok();
    for label in OUTCOME_LABELS {
        let count = counts
            .iter()
            .find(|(l, _)| l == label)
            .map_or(0, |(_, c)| *c);
        writeln!(output, "ideascope_runs_total{{outcome=\"{label}\"}} {count}").ok();
    }

    writeln!(output).ok();
    writeln!(output, "# HELP ideascope_run_queue_depth Runs waiting for the execution slot").ok();
    writeln!(output, "# TYPE ideascope_run_queue_depth gauge").ok();
    writeln!(output, "ideascope_run_queue_depth {}", state.scheduler.queue_depth()).ok();

    writeln!(output).ok();
    writeln!(output, "# HELP ideascope_run_active Whether a run is executing").ok();
    writeln!(output, "# TYPE ideascope_run_active gauge").ok();
    writeln!(
        output,
        "ideascope_run_active {}",
        u8::from(state.scheduler.is_busy())
    )
    .ok();
}

async fn collect_store_metrics(state: &Arc<AppState>, output: &mut String) {
    writeln!(output).ok();
    writeln!(output, "# HELP ideascope_pending_approvals Approvals awaiting a decision").ok();
    writeln!(output, "# TYPE ideascope_pending_approvals gauge").ok();
    writeln!(
        output,
        "ideascope_pending_approvals {}",
        state.approvals.pending_count()
    )
    .ok();

    writeln!(output).ok();
    writeln!(output, "# HELP ideascope_reports_stored Reports held in memory").ok();
    writeln!(output, "# TYPE ideascope_reports_stored gauge").ok();
    writeln!(output, "ideascope_reports_stored {}", state.reports.count().await).ok();
}
