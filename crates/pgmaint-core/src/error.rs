//! Error types for the pgmaint core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Fatal errors (configuration, statistics provider) propagate to the top
//! level; per-table errors (invalid statistics, command execution) are
//! caught at table granularity and surfaced in the run summary.

use thiserror::Error;

/// Result type alias for pgmaint operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for pgmaint.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error; fatal, aborts before any table is evaluated
    #[error("Configuration error: {0}")]
    Config(String),

    /// Statistics provider error; fatal, no tables to decide on
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Maintenance command execution error; non-fatal per table
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Another pgmaint instance is already connected to this database
    #[error("Another pgmaint instance is already running ({0} active sessions)")]
    AlreadyRunning(usize),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Errors raised while querying the statistics catalog.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Failed to establish the database connection
    #[error("Connection failed to {host}:{port}/{dbname}: {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        dbname: String,
        message: String,
    },

    /// A catalog query failed
    #[error("Catalog query failed: {0}")]
    CatalogQuery(String),

    /// A database setting could not be read or parsed
    #[error("Unreadable server setting {setting}: {message}")]
    Setting { setting: String, message: String },
}

/// Errors raised while submitting a maintenance command.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Could not open a session for the command
    #[error("Session setup failed for {table}: {message}")]
    Session { table: String, message: String },

    /// The command was submitted but the database rejected it
    #[error("Command failed on {table}: {message}")]
    Command { table: String, message: String },
}

impl ExecutionError {
    /// Table the failure was recorded against.
    pub fn table(&self) -> &str {
        match self {
            ExecutionError::Session { table, .. } => table,
            ExecutionError::Command { table, .. } => table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("freeze_proximity_pct must be in (0, 100]".into());
        assert!(err.to_string().contains("Configuration error"));

        let err = Error::Provider(ProviderError::CatalogQuery("relation gone".into()));
        assert!(err.to_string().contains("Provider error"));
    }

    #[test]
    fn test_execution_error_table() {
        let err = ExecutionError::Command {
            table: "public.orders".into(),
            message: "lock timeout".into(),
        };
        assert_eq!(err.table(), "public.orders");
        assert!(err.to_string().contains("public.orders"));
    }

    #[test]
    fn test_provider_error_connection() {
        let err = ProviderError::ConnectionFailed {
            host: "localhost".into(),
            port: 5432,
            dbname: "appdb".into(),
            message: "refused".into(),
        };
        assert!(err.to_string().contains("localhost:5432/appdb"));
    }
}
