//! The decision engine: converts one table's statistics plus the
//! threshold policy into exactly one maintenance decision.
//!
//! The rules form a strict priority chain, not a rule engine:
//! eligibility filter first, then freeze, then vacuum, then analyze.
//! Freeze dominates vacuum because wraparound is an existential risk;
//! vacuum dominates analyze because a vacuum refreshes enough state
//! that a separate analyze is partially redundant.
//!
//! Evaluation is a pure function of (statistics, policy, now): no
//! side effects, no hidden state, identical inputs yield identical
//! decisions.

use crate::policy::{ThresholdPolicy, FREEZE_SAFETY_MARGIN};
use crate::stats::{TableIdent, TableStatistics};
use chrono::{DateTime, Utc};

/// Maintenance action chosen for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceAction {
    /// No maintenance warranted
    None,
    /// Refresh planner statistics
    Analyze,
    /// Reclaim dead rows
    Vacuum,
    /// Vacuum and refresh statistics in one pass
    VacuumAnalyze,
    /// Aggressive vacuum to prevent transaction-id wraparound
    Freeze,
}

impl MaintenanceAction {
    /// Operator-facing label, matching the SQL verb where one exists.
    pub fn label(&self) -> &'static str {
        match self {
            MaintenanceAction::None => "NONE",
            MaintenanceAction::Analyze => "ANALYZE",
            MaintenanceAction::Vacuum => "VACUUM",
            MaintenanceAction::VacuumAnalyze => "VACUUM ANALYZE",
            MaintenanceAction::Freeze => "VACUUM FREEZE",
        }
    }
}

/// Why a decision was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Excluded by size, schema, or partition filter
    Filtered,
    /// Close enough to the wraparound limit to freeze now
    WraparoundProximity,
    /// Freeze candidate, but the operator did not enable freezing
    FreezeCandidateButDisabled,
    /// Dead tuple count crossed the threshold
    DeadTuples,
    /// Never vacuumed, or not vacuumed within the allowed age
    StaleVacuum,
    /// Never analyzed, or not analyzed within the allowed age
    StaleAnalyze,
    /// Bulk-maintenance mode: thresholds intentionally bypassed
    AsyncBulk,
    /// No threshold met
    NoThresholdMet,
    /// Statistics record violated its non-negativity invariant
    InvalidStatistics,
}

impl Reason {
    /// Stable reason code for reports and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Reason::Filtered => "filtered",
            Reason::WraparoundProximity => "wraparound-proximity",
            Reason::FreezeCandidateButDisabled => "freeze-candidate-but-disabled",
            Reason::DeadTuples => "dead-tuples",
            Reason::StaleVacuum => "stale-vacuum",
            Reason::StaleAnalyze => "stale-analyze",
            Reason::AsyncBulk => "async-bulk",
            Reason::NoThresholdMet => "no-threshold-met",
            Reason::InvalidStatistics => "invalid-statistics",
        }
    }
}

/// One decision per table per run. Immutable once created; the
/// orchestrator and reporter consume it but never mutate it.
#[derive(Debug, Clone)]
pub struct Decision {
    /// The statistics snapshot the decision was derived from
    pub stats: TableStatistics,
    /// Chosen action
    pub action: MaintenanceAction,
    /// Justification
    pub reason: Reason,
}

impl Decision {
    fn new(stats: TableStatistics, action: MaintenanceAction, reason: Reason) -> Self {
        Self {
            stats,
            action,
            reason,
        }
    }

    /// Identity of the table this decision applies to.
    pub fn ident(&self) -> &TableIdent {
        &self.stats.ident
    }

    /// Whether this decision translates into a database command.
    pub fn is_actionable(&self) -> bool {
        self.action != MaintenanceAction::None
    }
}

/// Applies the threshold policy to table statistics.
///
/// `now` is captured once per run so that every table is judged against
/// the same instant and repeated evaluation is deterministic.
pub struct DecisionEngine<'a> {
    policy: &'a ThresholdPolicy,
    now: DateTime<Utc>,
    bulk: bool,
}

impl<'a> DecisionEngine<'a> {
    /// Create an engine for one run.
    pub fn new(policy: &'a ThresholdPolicy, now: DateTime<Utc>) -> Self {
        Self {
            policy,
            now,
            bulk: false,
        }
    }

    /// Enable bulk-maintenance mode: every table that passes the
    /// eligibility filter gets a vacuum+analyze regardless of
    /// staleness thresholds. The wraparound test is never bypassed.
    pub fn with_bulk(mut self, bulk: bool) -> Self {
        self.bulk = bulk;
        self
    }

    /// Produce exactly one decision for one table.
    pub fn evaluate(&self, stats: TableStatistics) -> Decision {
        if !stats.is_valid() {
            return Decision::new(stats, MaintenanceAction::None, Reason::InvalidStatistics);
        }

        if self.filtered(&stats) {
            return Decision::new(stats, MaintenanceAction::None, Reason::Filtered);
        }

        let freeze_candidate = self.freeze_candidate(&stats);

        if self.bulk {
            return if freeze_candidate && self.policy.freeze_enabled() {
                Decision::new(stats, MaintenanceAction::Freeze, Reason::WraparoundProximity)
            } else {
                Decision::new(stats, MaintenanceAction::VacuumAnalyze, Reason::AsyncBulk)
            };
        }

        let vacuum_trigger = self.vacuum_trigger(&stats);
        let analyze_due = self.analyze_due(&stats);

        if freeze_candidate {
            if self.policy.freeze_enabled() {
                return Decision::new(
                    stats,
                    MaintenanceAction::Freeze,
                    Reason::WraparoundProximity,
                );
            }
            // Surface the risk without acting unless a vacuum is due anyway.
            if vacuum_trigger.is_none() {
                return Decision::new(
                    stats,
                    MaintenanceAction::None,
                    Reason::FreezeCandidateButDisabled,
                );
            }
        }

        if let Some(reason) = vacuum_trigger {
            let action = if analyze_due {
                MaintenanceAction::VacuumAnalyze
            } else {
                MaintenanceAction::Vacuum
            };
            return Decision::new(stats, action, reason);
        }

        if analyze_due {
            return Decision::new(stats, MaintenanceAction::Analyze, Reason::StaleAnalyze);
        }

        Decision::new(stats, MaintenanceAction::None, Reason::NoThresholdMet)
    }

    /// Eligibility filter; short-circuits all maintenance rules.
    fn filtered(&self, stats: &TableStatistics) -> bool {
        if stats.size_bytes > self.policy.max_size_bytes() {
            return true;
        }
        if let Some(schema) = self.policy.schema_filter() {
            if stats.ident.schema != schema {
                return true;
            }
        }
        self.policy.ignore_partitions() && stats.ident.partitioned
    }

    /// Both conditions must hold: the table sits within the absolute
    /// safety margin of the limit AND its age has crossed the
    /// operator's percentage of the limit.
    fn freeze_candidate(&self, stats: &TableStatistics) -> bool {
        let within_margin = stats.remaining_distance() <= FREEZE_SAFETY_MARGIN;
        let past_pct = (stats.xid_age as f64) * 100.0
            >= self.policy.freeze_proximity_pct() * (stats.wraparound_limit as f64);
        within_margin && past_pct
    }

    /// Either trigger is independently sufficient; dead tuples are
    /// checked first.
    fn vacuum_trigger(&self, stats: &TableStatistics) -> Option<Reason> {
        if stats.dead_rows >= self.policy.min_dead_tuples() {
            return Some(Reason::DeadTuples);
        }
        match stats.last_vacuum_at {
            None => Some(Reason::StaleVacuum),
            Some(at) if self.now - at > self.policy.vacuum_max_age() => Some(Reason::StaleVacuum),
            Some(_) => None,
        }
    }

    fn analyze_due(&self, stats: &TableStatistics) -> bool {
        match stats.last_analyze_at {
            None => true,
            Some(at) => self.now - at > self.policy.analyze_max_age(),
        }
    }
}
