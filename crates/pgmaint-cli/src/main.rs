//! pgmaint CLI - policy-driven VACUUM, ANALYZE, and FREEZE for PostgreSQL.

use anyhow::Result;
use clap::{Parser, Subcommand};
use pgmaint_core::config::{InquiryMode, LogFormat};
use pgmaint_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid thresholds, missing required fields)
    ConfigError = 1,
    /// Statistics provider error (connection, catalog query)
    ProviderError = 2,
    /// Maintenance command execution error
    ExecutionError = 3,
    /// Another instance already running against this database
    AlreadyRunning = 4,
    /// General runtime error
    RuntimeError = 10,
    /// Signal interrupt (SIGINT = 2, so 128 + 2 = 130)
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Convert an error to an exit code by inspecting the error message.
    fn from_error(error: &anyhow::Error) -> Self {
        let error_str = error.to_string().to_lowercase();

        if error_str.contains("configuration") || error_str.contains("toml") {
            ExitCode::ConfigError
        } else if error_str.contains("provider")
            || error_str.contains("connection")
            || error_str.contains("catalog")
        {
            ExitCode::ProviderError
        } else if error_str.contains("execution") || error_str.contains("command") {
            ExitCode::ExecutionError
        } else if error_str.contains("already running") {
            ExitCode::AlreadyRunning
        } else if error_str.contains("shutdown") {
            ExitCode::SignalInterrupt
        } else {
            ExitCode::RuntimeError
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "pgmaint")]
#[command(about = "Policy-driven VACUUM, ANALYZE, and FREEZE maintenance for PostgreSQL", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every table and execute or report maintenance decisions
    Run(RunArgs),

    /// Validate configuration file
    Validate,
}

/// Overrides for config file values; flag names follow the classic
/// vacuuming-tool surface.
#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Database host
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Database port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Database name
    #[arg(short = 'd', long)]
    dbname: Option<String>,

    /// Database user
    #[arg(short = 'U', long)]
    user: Option<String>,

    /// Max table size in bytes; larger tables are skipped
    #[arg(short = 's', long)]
    maxsize: Option<i64>,

    /// Days before a table is analyze-eligible
    #[arg(short = 'y', long = "analyze-max-days")]
    analyze_max_days: Option<i64>,

    /// Days before a table is vacuum-eligible
    #[arg(short = 'x', long = "vacuum-max-days")]
    vacuum_max_days: Option<i64>,

    /// Minimum dead tuples to trigger a vacuum
    #[arg(short = 't', long = "min-dead-tuples")]
    min_dead_tuples: Option<i64>,

    /// Percentage of the wraparound limit before freeze candidacy
    #[arg(short = 'z', long = "pct-freeze")]
    pct_freeze: Option<f64>,

    /// Only evaluate tables in this schema
    #[arg(short = 'm', long)]
    schema: Option<String>,

    /// Allow VACUUM FREEZE to be issued
    #[arg(short = 'f', long)]
    freeze: bool,

    /// Compute decisions but send no commands
    #[arg(short = 'r', long)]
    dryrun: bool,

    /// Reporting mode: 'found' or 'all'
    #[arg(short = 'q', long)]
    inquiry: Option<InquiryMode>,

    /// Ignore partitioned tables
    #[arg(short = 'i', long)]
    ignoreparts: bool,

    /// Run commands concurrently, bypassing staleness thresholds
    #[arg(short = 'a', long = "async")]
    concurrent: bool,

    /// Maximum concurrent maintenance commands
    #[arg(short = 'j', long)]
    jobs: Option<usize>,
}

impl RunArgs {
    /// Fold CLI overrides into the file-based configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(ref host) = self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(ref dbname) = self.dbname {
            config.connection.dbname = dbname.clone();
        }
        if let Some(ref user) = self.user {
            config.connection.user = user.clone();
        }
        if let Some(maxsize) = self.maxsize {
            config.policy.max_size_bytes = maxsize;
        }
        if let Some(days) = self.analyze_max_days {
            config.policy.analyze_max_age_days = days;
        }
        if let Some(days) = self.vacuum_max_days {
            config.policy.vacuum_max_age_days = days;
        }
        if let Some(tuples) = self.min_dead_tuples {
            config.policy.min_dead_tuples = tuples;
        }
        if let Some(pct) = self.pct_freeze {
            config.policy.freeze_proximity_pct = pct;
        }
        if let Some(ref schema) = self.schema {
            config.policy.schema = Some(schema.clone());
        }
        if self.freeze {
            config.policy.freeze = true;
        }
        if self.ignoreparts {
            config.policy.ignore_partitions = true;
        }
        if self.dryrun {
            config.execution.dry_run = true;
        }
        if let Some(inquiry) = self.inquiry {
            config.execution.inquiry = inquiry;
        }
        if self.concurrent {
            config.execution.concurrent = true;
        }
        if let Some(jobs) = self.jobs {
            config.execution.max_concurrent = jobs;
        }
    }
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Try to load config for log format settings (optional - falls back to text)
    let log_format = cli
        .config
        .as_ref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.logging.format)
        .unwrap_or(LogFormat::Text);

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    match log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    let result = execute_command(cli).await;

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => {
            let mut config = load_config(&cli.config)?;
            args.apply(&mut config);
            config.validate()?;
            commands::run::run(config).await?;
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config.validate()?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}

/// Load the config file if one was given or the default path exists;
/// otherwise start from defaults (CLI flags may carry the rest).
fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    let path = path.clone().unwrap_or_else(|| PathBuf::from("pgmaint.toml"));

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}
