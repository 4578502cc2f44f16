//! CLI presentation: plain-text rendering of plans and run summaries.

use crate::generation::driver::RunReport;
use crate::generation::plan::{ItemStatus, Plan};
use crate::progress::aggregator::ProgressSummary;
use std::fmt::Write;

pub fn format_plan_status(plan: &Plan) -> String {
    let stats = &plan.stats;
    let in_progress = plan
        .items
        .iter()
        .filter(|item| item.status == ItemStatus::InProgress)
        .count();

    let mut out = String::new();
    let _ = writeln!(out, "Plan {} ({:?})", plan.id, plan.status);
    let _ = writeln!(
        out,
        "  {} items: {} completed, {} skipped, {} failed, {} pending",
        stats.total,
        stats.completed,
        stats.skipped,
        stats.failed,
        stats.pending()
    );
    if in_progress > 0 {
        let _ = writeln!(out, "  {} interrupted (will be retried)", in_progress);
    }
    let _ = writeln!(out, "  progress: {:.0}%", stats.progress() * 100.0);

    let failed: Vec<_> = plan
        .items
        .iter()
        .filter(|item| item.status == ItemStatus::Failed)
        .collect();
    if !failed.is_empty() {
        let _ = writeln!(out, "Failed:");
        for item in failed {
            let _ = writeln!(
                out,
                "  {} ({}): {}",
                item.id,
                item.path,
                item.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    out.trim_end().to_string()
}

pub fn format_run_summary(plan: &Plan, summary: &ProgressSummary, report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Generated {} page(s), skipped {}, failed {} in {:.1}s",
        summary.completed,
        summary.skipped,
        summary.failed,
        summary.duration.as_secs_f64()
    );
    let retries: u32 = report
        .outputs
        .iter()
        .map(|output| output.attempts.saturating_sub(1))
        .sum();
    if retries > 0 {
        let _ = writeln!(out, "Retried {} time(s)", retries);
    }
    out.push_str(&format_plan_status(plan));
    out
}
