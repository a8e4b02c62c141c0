//! Execution orchestrator: turns the ordered sequence of decisions into
//! reported output or actual maintenance commands.
//!
//! Sequential mode issues one command at a time in decision order.
//! Concurrent mode runs commands under a semaphore-bounded `JoinSet`,
//! each on its own session, with no cross-table ordering guarantee.
//! A per-table failure is recorded and never aborts sibling tables.

use crate::config::{ConnectionConfig, ExecutionConfig};
use crate::decision::{Decision, MaintenanceAction};
use crate::error::ExecutionError;
use crate::report::Reporter;
use crate::stats::TableIdent;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Translate a decision into its maintenance command, if any.
///
/// The mapping is total: every actionable action has exactly one
/// command, and `None` has none. Identifiers are quoted because they
/// cannot be bound as statement parameters.
pub fn maintenance_sql(decision: &Decision) -> Option<String> {
    match decision.action {
        MaintenanceAction::None => None,
        action => Some(format!("{} {}", action.label(), decision.ident().qualified())),
    }
}

/// Submits one maintenance command to the database.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Submit `sql` for `table`, waiting until the database acknowledges
    /// completion or failure.
    async fn dispatch(&self, table: &TableIdent, sql: &str) -> Result<(), ExecutionError>;
}

/// Dispatcher that opens one session per command. Concurrent commands
/// therefore never share a connection, matching the one-session-per-job
/// model; command timeouts are left to the server/connection settings.
pub struct PgCommandDispatcher {
    connection: ConnectionConfig,
}

impl PgCommandDispatcher {
    /// Create a dispatcher for the configured database.
    pub fn new(connection: ConnectionConfig) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl CommandDispatcher for PgCommandDispatcher {
    async fn dispatch(&self, table: &TableIdent, sql: &str) -> Result<(), ExecutionError> {
        let client =
            crate::stats::connect(&self.connection)
                .await
                .map_err(|e| ExecutionError::Session {
                    table: table.to_string(),
                    message: e.to_string(),
                })?;

        client
            .batch_execute(sql)
            .await
            .map_err(|e| ExecutionError::Command {
                table: table.to_string(),
                message: e.to_string(),
            })
    }
}

/// Aggregated outcome of one run; always produced, even when individual
/// tables failed.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    none: usize,
    analyze: usize,
    vacuum: usize,
    vacuum_analyze: usize,
    freeze: usize,
    /// Commands acknowledged by the database
    pub succeeded: usize,
    /// Commands rejected or never acknowledged
    pub failed: usize,
    /// Commands withheld (dry run or cancellation)
    pub skipped: usize,
    /// Per-table failure details, in completion order
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    /// Count one decision.
    pub fn record_decision(&mut self, action: MaintenanceAction) {
        match action {
            MaintenanceAction::None => self.none += 1,
            MaintenanceAction::Analyze => self.analyze += 1,
            MaintenanceAction::Vacuum => self.vacuum += 1,
            MaintenanceAction::VacuumAnalyze => self.vacuum_analyze += 1,
            MaintenanceAction::Freeze => self.freeze += 1,
        }
    }

    /// Number of decisions recorded for one action.
    pub fn decided(&self, action: MaintenanceAction) -> usize {
        match action {
            MaintenanceAction::None => self.none,
            MaintenanceAction::Analyze => self.analyze,
            MaintenanceAction::Vacuum => self.vacuum,
            MaintenanceAction::VacuumAnalyze => self.vacuum_analyze,
            MaintenanceAction::Freeze => self.freeze,
        }
    }

    /// Total decisions recorded.
    pub fn total_decisions(&self) -> usize {
        self.none + self.analyze + self.vacuum + self.vacuum_analyze + self.freeze
    }

    fn record_outcome(&mut self, result: Result<(), ExecutionError>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(e) => {
                self.failures.push((e.table().to_string(), e.to_string()));
                self.failed += 1;
            }
        }
    }
}

/// Drives the decisions of one run to completion.
pub struct ExecutionOrchestrator {
    dispatcher: Arc<dyn CommandDispatcher>,
    reporter: Reporter,
    config: ExecutionConfig,
    cancelled: Arc<AtomicBool>,
}

impl ExecutionOrchestrator {
    /// Create an orchestrator for one run.
    pub fn new(
        dispatcher: Arc<dyn CommandDispatcher>,
        reporter: Reporter,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            dispatcher,
            reporter,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for aborting the run at table-loop granularity: already
    /// dispatched commands finish, no new ones are started.
    pub fn cancellation_handle(&self) -> CancellationHandle {
        CancellationHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Process every decision: report per inquiry mode, then execute or
    /// withhold commands depending on the run mode.
    pub async fn run(&self, decisions: Vec<Decision>) -> RunSummary {
        let mut summary = RunSummary::default();
        for decision in &decisions {
            summary.record_decision(decision.action);
            self.reporter.report(decision);
        }

        let actionable: Vec<&Decision> = decisions.iter().filter(|d| d.is_actionable()).collect();

        if self.config.dry_run {
            info!(withheld = actionable.len(), "Dry run; no commands sent");
            summary.skipped += actionable.len();
        } else if self.config.concurrent {
            self.run_concurrent(&actionable, &mut summary).await;
        } else {
            self.run_sequential(&actionable, &mut summary).await;
        }

        self.reporter.print_summary(&summary);
        summary
    }

    async fn run_sequential(&self, decisions: &[&Decision], summary: &mut RunSummary) {
        for decision in decisions {
            if self.is_cancelled() {
                info!("Run cancelled; remaining commands withheld");
                summary.skipped += 1;
                continue;
            }
            // Total for actionable decisions, so the expect cannot fire.
            let sql = maintenance_sql(decision).expect("actionable decision has a command");
            info!(table = %decision.ident(), command = %sql, "Submitting maintenance command");
            let result = self.dispatcher.dispatch(decision.ident(), &sql).await;
            if let Err(ref e) = result {
                warn!(table = %decision.ident(), error = %e, "Maintenance command failed");
            }
            summary.record_outcome(result);
        }
    }

    async fn run_concurrent(&self, decisions: &[&Decision], summary: &mut RunSummary) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut jobs: JoinSet<Result<(), ExecutionError>> = JoinSet::new();

        for decision in decisions {
            // Acquire before spawning so cancellation can stop the
            // pipeline without stranding queued jobs.
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // semaphore closed, cannot happen here
            };
            if self.is_cancelled() {
                summary.skipped += 1;
                continue;
            }

            let sql = maintenance_sql(decision).expect("actionable decision has a command");
            let ident = decision.ident().clone();
            let dispatcher = Arc::clone(&self.dispatcher);
            debug!(table = %ident, command = %sql, "Queueing maintenance command");
            jobs.spawn(async move {
                let _permit = permit;
                dispatcher.dispatch(&ident, &sql).await
            });
        }

        // Wait for every dispatched command to reach a terminal state.
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(result) => {
                    if let Err(ref e) = result {
                        warn!(table = %e.table(), error = %e, "Maintenance command failed");
                    }
                    summary.record_outcome(result);
                }
                Err(e) => {
                    warn!(error = %e, "Maintenance job panicked");
                    summary.failed += 1;
                }
            }
        }
    }
}

/// Cloneable cancellation handle shared with signal handlers.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Request a clean abort of the run.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InquiryMode;
    use crate::decision::Reason;
    use crate::stats::TableStatistics;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    struct MockDispatcher {
        commands: Mutex<Vec<String>>,
        failing: HashSet<String>,
    }

    impl MockDispatcher {
        fn new() -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                failing: HashSet::new(),
            }
        }

        fn failing_on(tables: &[&str]) -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                failing: tables.iter().map(|t| t.to_string()).collect(),
            }
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().clone()
        }
    }

    #[async_trait]
    impl CommandDispatcher for MockDispatcher {
        async fn dispatch(&self, table: &TableIdent, sql: &str) -> Result<(), ExecutionError> {
            self.commands.lock().push(sql.to_string());
            if self.failing.contains(&table.to_string()) {
                return Err(ExecutionError::Command {
                    table: table.to_string(),
                    message: "lock timeout".into(),
                });
            }
            Ok(())
        }
    }

    fn decision(table: &str, action: MaintenanceAction) -> Decision {
        Decision {
            stats: TableStatistics {
                ident: TableIdent {
                    schema: "public".into(),
                    table: table.into(),
                    partitioned: false,
                },
                size_bytes: 1_000_000,
                dead_rows: 2_000,
                last_vacuum_at: None,
                last_analyze_at: None,
                xid_age: 1_000,
                wraparound_limit: 200_000_000,
            },
            action,
            reason: Reason::DeadTuples,
        }
    }

    fn orchestrator(
        dispatcher: Arc<MockDispatcher>,
        config: ExecutionConfig,
    ) -> ExecutionOrchestrator {
        ExecutionOrchestrator::new(
            dispatcher,
            Reporter::new(InquiryMode::Off, config.dry_run),
            config,
        )
    }

    #[test]
    fn test_maintenance_sql_mapping() {
        let sql = |action| maintenance_sql(&decision("orders", action));
        assert_eq!(sql(MaintenanceAction::None), None);
        assert_eq!(
            sql(MaintenanceAction::Analyze).unwrap(),
            "ANALYZE \"public\".\"orders\""
        );
        assert_eq!(
            sql(MaintenanceAction::Vacuum).unwrap(),
            "VACUUM \"public\".\"orders\""
        );
        assert_eq!(
            sql(MaintenanceAction::VacuumAnalyze).unwrap(),
            "VACUUM ANALYZE \"public\".\"orders\""
        );
        assert_eq!(
            sql(MaintenanceAction::Freeze).unwrap(),
            "VACUUM FREEZE \"public\".\"orders\""
        );
    }

    #[tokio::test]
    async fn test_dry_run_sends_no_commands() {
        let dispatcher = Arc::new(MockDispatcher::new());
        let orch = orchestrator(
            Arc::clone(&dispatcher),
            ExecutionConfig {
                dry_run: true,
                ..ExecutionConfig::default()
            },
        );

        let summary = orch
            .run(vec![
                decision("a", MaintenanceAction::Vacuum),
                decision("b", MaintenanceAction::Freeze),
                decision("c", MaintenanceAction::None),
            ])
            .await;

        assert!(dispatcher.commands().is_empty());
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.decided(MaintenanceAction::None), 1);
    }

    #[tokio::test]
    async fn test_sequential_preserves_order() {
        let dispatcher = Arc::new(MockDispatcher::new());
        let orch = orchestrator(Arc::clone(&dispatcher), ExecutionConfig::default());

        let summary = orch
            .run(vec![
                decision("a", MaintenanceAction::Vacuum),
                decision("b", MaintenanceAction::Analyze),
                decision("c", MaintenanceAction::VacuumAnalyze),
            ])
            .await;

        assert_eq!(
            dispatcher.commands(),
            vec![
                "VACUUM \"public\".\"a\"",
                "ANALYZE \"public\".\"b\"",
                "VACUUM ANALYZE \"public\".\"c\"",
            ]
        );
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let dispatcher = Arc::new(MockDispatcher::failing_on(&["public.b"]));
        let orch = orchestrator(Arc::clone(&dispatcher), ExecutionConfig::default());

        let summary = orch
            .run(vec![
                decision("a", MaintenanceAction::Vacuum),
                decision("b", MaintenanceAction::Vacuum),
                decision("c", MaintenanceAction::Vacuum),
            ])
            .await;

        assert_eq!(dispatcher.commands().len(), 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, "public.b");
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_everything() {
        let dispatcher = Arc::new(MockDispatcher::failing_on(&["public.t2"]));
        let orch = orchestrator(
            Arc::clone(&dispatcher),
            ExecutionConfig {
                concurrent: true,
                max_concurrent: 2,
                ..ExecutionConfig::default()
            },
        );

        let decisions: Vec<Decision> = (0..5)
            .map(|i| decision(&format!("t{}", i), MaintenanceAction::VacuumAnalyze))
            .collect();
        let summary = orch.run(decisions).await;

        assert_eq!(dispatcher.commands().len(), 5);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].0, "public.t2");
    }

    #[tokio::test]
    async fn test_cancellation_withholds_commands() {
        let dispatcher = Arc::new(MockDispatcher::new());
        let orch = orchestrator(Arc::clone(&dispatcher), ExecutionConfig::default());
        orch.cancellation_handle().cancel();

        let summary = orch
            .run(vec![
                decision("a", MaintenanceAction::Vacuum),
                decision("b", MaintenanceAction::Vacuum),
            ])
            .await;

        assert!(dispatcher.commands().is_empty());
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.succeeded, 0);
    }

    #[tokio::test]
    async fn test_cancellation_in_concurrent_mode() {
        let dispatcher = Arc::new(MockDispatcher::new());
        let orch = orchestrator(
            Arc::clone(&dispatcher),
            ExecutionConfig {
                concurrent: true,
                ..ExecutionConfig::default()
            },
        );
        orch.cancellation_handle().cancel();

        let summary = orch.run(vec![decision("a", MaintenanceAction::Vacuum)]).await;
        assert!(dispatcher.commands().is_empty());
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        summary.record_decision(MaintenanceAction::Vacuum);
        summary.record_decision(MaintenanceAction::Vacuum);
        summary.record_decision(MaintenanceAction::Freeze);
        summary.record_decision(MaintenanceAction::None);
        assert_eq!(summary.decided(MaintenanceAction::Vacuum), 2);
        assert_eq!(summary.decided(MaintenanceAction::Freeze), 1);
        assert_eq!(summary.decided(MaintenanceAction::Analyze), 0);
        assert_eq!(summary.total_decisions(), 4);
    }
}
