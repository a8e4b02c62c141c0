//! The maintenance run: collect statistics, decide, execute or report.

use anyhow::Result;
use chrono::Utc;
use pgmaint_core::decision::DecisionEngine;
use pgmaint_core::executor::{ExecutionOrchestrator, PgCommandDispatcher};
use pgmaint_core::stats::{PgStatisticsProvider, StatisticsProvider};
use pgmaint_core::{Config, Decision, Error, Reporter, ThresholdPolicy};
use std::sync::Arc;
use tracing::{info, warn};

/// Run one full maintenance pass.
pub async fn run(config: Config) -> Result<()> {
    let policy = ThresholdPolicy::from_config(&config.policy)?;

    info!(
        host = %config.connection.host,
        dbname = %config.connection.dbname,
        dry_run = config.execution.dry_run,
        concurrent = config.execution.concurrent,
        freeze = policy.freeze_enabled(),
        max_size_bytes = policy.max_size_bytes(),
        min_dead_tuples = policy.min_dead_tuples(),
        "Starting maintenance run"
    );

    let provider = PgStatisticsProvider::connect(&config.connection).await?;

    // A second live instance would race this one on the same timestamps;
    // statistics only update after an action completes.
    if !config.execution.dry_run {
        let siblings = provider.sibling_instances().await.map_err(Error::from)?;
        if siblings > 0 {
            return Err(Error::AlreadyRunning(siblings).into());
        }
    }

    let stats = provider.table_statistics().await.map_err(Error::from)?;
    if stats.is_empty() {
        println!("No candidate tables found.");
        return Ok(());
    }

    let engine = DecisionEngine::new(&policy, Utc::now()).with_bulk(config.execution.concurrent);
    let decisions: Vec<Decision> = stats.into_iter().map(|s| engine.evaluate(s)).collect();

    let actionable = decisions.iter().filter(|d| d.is_actionable()).count();
    info!(
        tables = decisions.len(),
        actionable, "Decisions computed"
    );

    let reporter = Reporter::new(config.execution.inquiry, config.execution.dry_run);
    let dispatcher = Arc::new(PgCommandDispatcher::new(config.connection.clone()));
    let orchestrator = ExecutionOrchestrator::new(dispatcher, reporter, config.execution.clone());

    // Ctrl-C aborts at table-loop granularity: in-flight commands
    // finish, nothing new is issued.
    let cancel = orchestrator.cancellation_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing in-flight commands");
            cancel.cancel();
        }
    });

    let summary = orchestrator.run(decisions).await;

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "Maintenance run complete"
    );

    Ok(())
}
