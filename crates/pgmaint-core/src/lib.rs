//! pgmaint core - policy-driven PostgreSQL table maintenance
//!
//! This library inspects per-table catalog statistics and decides, per
//! table, whether a VACUUM, ANALYZE, or wraparound-preventing FREEZE is
//! warranted, then executes or reports those decisions:
//!
//! - Immutable threshold policy validated once at startup
//! - Pure decision engine with an auditable priority chain
//! - Sequential or bounded-concurrent command execution
//! - Per-table fault isolation; one failed command never stops the run
//!
//! Each invocation evaluates the database's current state from scratch;
//! no history is persisted across runs.

pub mod config;
pub mod decision;
pub mod error;
pub mod executor;
pub mod policy;
pub mod report;
pub mod stats;

// Re-export commonly used types
pub use config::Config;
pub use decision::{Decision, DecisionEngine, MaintenanceAction, Reason};
pub use error::{Error, ExecutionError, ProviderError, Result};
pub use executor::{ExecutionOrchestrator, PgCommandDispatcher, RunSummary};
pub use policy::ThresholdPolicy;
pub use report::Reporter;
pub use stats::{PgStatisticsProvider, StatisticsProvider, TableStatistics};
