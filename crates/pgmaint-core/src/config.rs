//! Configuration structures for pgmaint.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Database connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Maintenance threshold settings
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Execution mode settings
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection configuration.
///
/// Every session opened by pgmaint is tagged with
/// `application_name = "pgmaint"` so concurrent instances can detect
/// each other through `pg_stat_activity`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Database host
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name
    #[serde(default)]
    pub dbname: String,

    /// Database user
    #[serde(default = "default_user")]
    pub user: String,

    /// Database password (prefer .pgpass or peer auth where possible)
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: String::new(),
            user: default_user(),
            password: None,
        }
    }
}

impl ConnectionConfig {
    /// Application name used for all pgmaint sessions.
    pub const APPLICATION_NAME: &'static str = "pgmaint";

    /// Build a libpq-style connection string.
    pub fn connection_string(&self) -> String {
        let mut parts = vec![
            format!("host={}", self.host),
            format!("port={}", self.port),
            format!("dbname={}", self.dbname),
            format!("user={}", self.user),
            format!("application_name={}", Self::APPLICATION_NAME),
        ];
        if let Some(ref password) = self.password {
            parts.push(format!("password={}", password));
        }
        parts.join(" ")
    }
}

/// Maintenance threshold configuration.
///
/// These are raw operator inputs; they are validated and frozen into a
/// [`crate::policy::ThresholdPolicy`] before the run starts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Tables larger than this many bytes are excluded from consideration
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: i64,

    /// Days after which a table becomes eligible for analyze
    #[serde(default = "default_analyze_max_age_days")]
    pub analyze_max_age_days: i64,

    /// Days after which a table becomes eligible for vacuum
    #[serde(default = "default_vacuum_max_age_days")]
    pub vacuum_max_age_days: i64,

    /// Minimum dead tuple count to trigger vacuum eligibility
    #[serde(default = "default_min_dead_tuples")]
    pub min_dead_tuples: i64,

    /// Percentage of the wraparound limit at which a table becomes a
    /// freeze candidate
    #[serde(default = "default_freeze_proximity_pct")]
    pub freeze_proximity_pct: f64,

    /// If set, only tables in this schema are evaluated
    #[serde(default)]
    pub schema: Option<String>,

    /// Exclude partitioned tables
    #[serde(default)]
    pub ignore_partitions: bool,

    /// Allow VACUUM FREEZE to actually be issued
    #[serde(default)]
    pub freeze: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            analyze_max_age_days: default_analyze_max_age_days(),
            vacuum_max_age_days: default_vacuum_max_age_days(),
            min_dead_tuples: default_min_dead_tuples(),
            freeze_proximity_pct: default_freeze_proximity_pct(),
            schema: None,
            ignore_partitions: false,
            freeze: false,
        }
    }
}

/// Execution mode configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Compute decisions but send no commands
    #[serde(default)]
    pub dry_run: bool,

    /// Reporting mode
    #[serde(default)]
    pub inquiry: InquiryMode,

    /// Submit commands concurrently, bypassing staleness thresholds
    #[serde(default)]
    pub concurrent: bool,

    /// Maximum number of maintenance commands in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            inquiry: InquiryMode::default(),
            concurrent: false,
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Reporting mode controlling which decisions are surfaced.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InquiryMode {
    /// Report actionable decisions only when not executed (dry run)
    #[default]
    Off,
    /// Report only actionable decisions
    Found,
    /// Report every decision, including "none"
    All,
}

impl std::str::FromStr for InquiryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "off" | "" => Ok(InquiryMode::Off),
            "found" => Ok(InquiryMode::Found),
            "all" => Ok(InquiryMode::All),
            other => Err(format!(
                "invalid inquiry mode '{}', expected 'found' or 'all'",
                other
            )),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default)]
    pub level: LogLevel,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Filter directive understood by tracing's EnvFilter.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format (default; this is an operator-facing tool)
    #[default]
    Text,
    /// JSON format
    Json,
}

// Default value functions
fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_user() -> String {
    "postgres".to_string()
}
fn default_max_size_bytes() -> i64 {
    // 400 GB; larger tables are assumed too costly to maintain automatically
    400_000_000_000
}
fn default_analyze_max_age_days() -> i64 {
    60
}
fn default_vacuum_max_age_days() -> i64 {
    30
}
fn default_min_dead_tuples() -> i64 {
    10_000
}
fn default_freeze_proximity_pct() -> f64 {
    90.0
}
fn default_max_concurrent() -> usize {
    12
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.connection.dbname.is_empty() {
            return Err(crate::Error::Config("Database name is required".into()));
        }

        if self.connection.user.is_empty() {
            return Err(crate::Error::Config("Database user is required".into()));
        }

        if self.execution.max_concurrent == 0 {
            return Err(crate::Error::Config(
                "max_concurrent must be at least 1".into(),
            ));
        }

        // Threshold values get their own validation when the policy is built,
        // but catch them here too so `validate` covers the whole file.
        crate::policy::ThresholdPolicy::from_config(&self.policy)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            connection: ConnectionConfig {
                dbname: "appdb".into(),
                ..ConnectionConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_default_policy_config() {
        let config = PolicyConfig::default();
        assert_eq!(config.max_size_bytes, 400_000_000_000);
        assert_eq!(config.analyze_max_age_days, 60);
        assert_eq!(config.vacuum_max_age_days, 30);
        assert_eq!(config.min_dead_tuples, 10_000);
        assert_eq!(config.freeze_proximity_pct, 90.0);
        assert!(config.schema.is_none());
        assert!(!config.ignore_partitions);
        assert!(!config.freeze);
    }

    #[test]
    fn test_default_execution_config() {
        let config = ExecutionConfig::default();
        assert!(!config.dry_run);
        assert!(!config.concurrent);
        assert_eq!(config.inquiry, InquiryMode::Off);
        assert_eq!(config.max_concurrent, 12);
    }

    #[test]
    fn test_connection_string() {
        let conn = ConnectionConfig {
            host: "db.internal".into(),
            port: 6432,
            dbname: "appdb".into(),
            user: "maint".into(),
            password: None,
        };
        let s = conn.connection_string();
        assert!(s.contains("host=db.internal"));
        assert!(s.contains("port=6432"));
        assert!(s.contains("dbname=appdb"));
        assert!(s.contains("user=maint"));
        assert!(s.contains("application_name=pgmaint"));
        assert!(!s.contains("password"));
    }

    #[test]
    fn test_connection_string_with_password() {
        let conn = ConnectionConfig {
            dbname: "appdb".into(),
            password: Some("secret".into()),
            ..ConnectionConfig::default()
        };
        assert!(conn.connection_string().ends_with("password=secret"));
    }

    #[test]
    fn test_config_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_missing_dbname() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Database name"));
    }

    #[test]
    fn test_config_validation_zero_jobs() {
        let mut config = valid_config();
        config.execution.max_concurrent = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent"));
    }

    #[test]
    fn test_config_validation_bad_policy() {
        let mut config = valid_config();
        config.policy.freeze_proximity_pct = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inquiry_mode_from_str() {
        assert_eq!("all".parse::<InquiryMode>().unwrap(), InquiryMode::All);
        assert_eq!("found".parse::<InquiryMode>().unwrap(), InquiryMode::Found);
        assert_eq!("".parse::<InquiryMode>().unwrap(), InquiryMode::Off);
        assert!("everything".parse::<InquiryMode>().is_err());
    }

    #[test]
    fn test_toml_round_trip_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [connection]
            dbname = "appdb"

            [policy]
            min_dead_tuples = 5000
            schema = "public"

            [execution]
            dry_run = true
            inquiry = "all"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.connection.host, "localhost");
        assert_eq!(parsed.policy.min_dead_tuples, 5000);
        assert_eq!(parsed.policy.schema.as_deref(), Some("public"));
        assert_eq!(parsed.policy.analyze_max_age_days, 60);
        assert!(parsed.execution.dry_run);
        assert_eq!(parsed.execution.inquiry, InquiryMode::All);
        assert_eq!(parsed.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_log_level_directives() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Debug.as_directive(), "debug");
    }
}
