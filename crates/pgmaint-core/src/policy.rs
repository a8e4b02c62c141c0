//! Threshold policy: the frozen set of operator-supplied limits every
//! table is evaluated against.
//!
//! Built once at startup from [`PolicyConfig`] and shared read-only
//! across the whole run; never reconstructed or mutated mid-run.

use crate::config::PolicyConfig;
use crate::{Error, Result};
use chrono::Duration;

/// Absolute safety margin before wraparound, in transactions. A table is
/// only a freeze candidate once it is within this many transactions of
/// the server's wraparound limit.
pub const FREEZE_SAFETY_MARGIN: i64 = 25_000_000;

/// Immutable maintenance thresholds for one run.
#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    max_size_bytes: i64,
    analyze_max_age: Duration,
    vacuum_max_age: Duration,
    min_dead_tuples: i64,
    freeze_proximity_pct: f64,
    schema_filter: Option<String>,
    ignore_partitions: bool,
    freeze_enabled: bool,
}

impl ThresholdPolicy {
    /// Validate operator input and freeze it into a policy.
    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        if config.max_size_bytes < 0 {
            return Err(Error::Config(format!(
                "max_size_bytes must be >= 0, got {}",
                config.max_size_bytes
            )));
        }
        if config.analyze_max_age_days < 0 {
            return Err(Error::Config(format!(
                "analyze_max_age_days must be >= 0, got {}",
                config.analyze_max_age_days
            )));
        }
        if config.vacuum_max_age_days < 0 {
            return Err(Error::Config(format!(
                "vacuum_max_age_days must be >= 0, got {}",
                config.vacuum_max_age_days
            )));
        }
        if config.min_dead_tuples < 0 {
            return Err(Error::Config(format!(
                "min_dead_tuples must be >= 0, got {}",
                config.min_dead_tuples
            )));
        }
        if config.freeze_proximity_pct <= 0.0 || config.freeze_proximity_pct > 100.0 {
            return Err(Error::Config(format!(
                "freeze_proximity_pct must be in (0, 100], got {}",
                config.freeze_proximity_pct
            )));
        }

        Ok(Self {
            max_size_bytes: config.max_size_bytes,
            analyze_max_age: Duration::days(config.analyze_max_age_days),
            vacuum_max_age: Duration::days(config.vacuum_max_age_days),
            min_dead_tuples: config.min_dead_tuples,
            freeze_proximity_pct: config.freeze_proximity_pct,
            schema_filter: config.schema.clone(),
            ignore_partitions: config.ignore_partitions,
            freeze_enabled: config.freeze,
        })
    }

    /// Tables larger than this are excluded from consideration.
    pub fn max_size_bytes(&self) -> i64 {
        self.max_size_bytes
    }

    /// Elapsed time after which a table is analyze-eligible regardless
    /// of dead rows.
    pub fn analyze_max_age(&self) -> Duration {
        self.analyze_max_age
    }

    /// Elapsed time after which a table is vacuum-eligible regardless
    /// of dead rows.
    pub fn vacuum_max_age(&self) -> Duration {
        self.vacuum_max_age
    }

    /// Minimum dead tuple count for age-independent vacuum eligibility.
    pub fn min_dead_tuples(&self) -> i64 {
        self.min_dead_tuples
    }

    /// Percentage of the wraparound limit at which a table becomes a
    /// freeze candidate.
    pub fn freeze_proximity_pct(&self) -> f64 {
        self.freeze_proximity_pct
    }

    /// If set, only tables in this schema are evaluated.
    pub fn schema_filter(&self) -> Option<&str> {
        self.schema_filter.as_deref()
    }

    /// Whether partitioned tables are excluded.
    pub fn ignore_partitions(&self) -> bool {
        self.ignore_partitions
    }

    /// Whether the operator allowed VACUUM FREEZE to actually run.
    pub fn freeze_enabled(&self) -> bool {
        self.freeze_enabled
    }
}
