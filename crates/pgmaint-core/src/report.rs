//! Operator-facing rendering of decisions and run summaries.
//!
//! The reporter decides which decisions are surfaced (inquiry mode) and
//! how each line reads; it never mutates a decision and performs no I/O
//! beyond stdout.

use crate::config::InquiryMode;
use crate::decision::{Decision, MaintenanceAction};
use crate::executor::RunSummary;

/// Renders decisions and outcomes for operator inspection.
#[derive(Debug, Clone)]
pub struct Reporter {
    inquiry: InquiryMode,
    dry_run: bool,
}

impl Reporter {
    /// Create a reporter for one run.
    pub fn new(inquiry: InquiryMode, dry_run: bool) -> Self {
        Self { inquiry, dry_run }
    }

    /// Whether this decision should be surfaced.
    ///
    /// `all` reports everything, `found` reports actionable decisions,
    /// and with inquiry off only a dry run surfaces its would-be work.
    pub fn should_report(&self, decision: &Decision) -> bool {
        match self.inquiry {
            InquiryMode::All => true,
            InquiryMode::Found => decision.is_actionable(),
            InquiryMode::Off => self.dry_run && decision.is_actionable(),
        }
    }

    /// One line per decision.
    pub fn decision_line(&self, decision: &Decision) -> String {
        let prefix = if self.dry_run && decision.is_actionable() {
            "would-execute "
        } else {
            ""
        };
        format!(
            "{}{:<14} {:<40} reason: {:<29} size: {:>13}  dead: {:>9}  xid_age: {:>10}",
            prefix,
            decision.action.label(),
            decision.ident().to_string(),
            decision.reason.code(),
            decision.stats.size_bytes,
            decision.stats.dead_rows,
            decision.stats.xid_age,
        )
    }

    /// Surface one decision if the inquiry mode calls for it.
    pub fn report(&self, decision: &Decision) {
        if self.should_report(decision) {
            println!("{}", self.decision_line(decision));
        }
    }

    /// Final run summary; always printed, even after per-table failures.
    pub fn summary_lines(&self, summary: &RunSummary) -> Vec<String> {
        let mut lines = vec![
            format!(
                "decisions: none: {}  analyze: {}  vacuum: {}  vacuum_analyze: {}  freeze: {}",
                summary.decided(MaintenanceAction::None),
                summary.decided(MaintenanceAction::Analyze),
                summary.decided(MaintenanceAction::Vacuum),
                summary.decided(MaintenanceAction::VacuumAnalyze),
                summary.decided(MaintenanceAction::Freeze),
            ),
            format!(
                "executions: succeeded: {}  failed: {}  skipped: {}",
                summary.succeeded, summary.failed, summary.skipped
            ),
        ];
        for (table, error) in &summary.failures {
            lines.push(format!("failed: {} ({})", table, error));
        }
        lines
    }

    /// Print the final summary.
    pub fn print_summary(&self, summary: &RunSummary) {
        for line in self.summary_lines(summary) {
            println!("{}", line);
        }
    }
}
