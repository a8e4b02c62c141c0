//! Table statistics and the catalog statistics provider.
//!
//! The provider consolidates all catalog SQL behind one trait so the
//! decision engine never touches the database. Statistics come from
//! `pg_stat_user_tables` joined to `pg_class`; system schemas
//! (`pg_catalog`, `pg_toast`, `information_schema`) are always excluded.

use crate::config::ConnectionConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, info, warn};

/// Identity of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIdent {
    /// Schema name
    pub schema: String,
    /// Table name
    pub table: String,
    /// Whether the table is a partition / partitioned
    pub partitioned: bool,
}

impl TableIdent {
    /// Quoted `schema.table` form safe to splice into a maintenance
    /// command (identifiers cannot be bound as parameters).
    pub fn qualified(&self) -> String {
        format!(
            "\"{}\".\"{}\"",
            self.schema.replace('"', "\"\""),
            self.table.replace('"', "\"\"")
        )
    }
}

impl std::fmt::Display for TableIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Maintenance-relevant statistics for one table, captured at run start.
#[derive(Debug, Clone)]
pub struct TableStatistics {
    /// Table identity
    pub ident: TableIdent,
    /// On-disk size in bytes
    pub size_bytes: i64,
    /// Estimated dead tuples since the last vacuum
    pub dead_rows: i64,
    /// Most recent vacuum (manual or auto); None = never
    pub last_vacuum_at: Option<DateTime<Utc>>,
    /// Most recent analyze (manual or auto); None = never
    pub last_analyze_at: Option<DateTime<Utc>>,
    /// Transactions since the oldest unfrozen row was written
    pub xid_age: i64,
    /// Transaction-id distance at which the server forces an emergency
    /// freeze (`autovacuum_freeze_max_age`)
    pub wraparound_limit: i64,
}

impl TableStatistics {
    /// Check the non-negativity invariant. A violating record is decided
    /// as "invalid-statistics" rather than aborting the run.
    pub fn is_valid(&self) -> bool {
        self.size_bytes >= 0 && self.dead_rows >= 0 && self.xid_age >= 0
    }

    /// Transactions left before this table hits the wraparound limit.
    /// Negative once the limit has been passed.
    pub fn remaining_distance(&self) -> i64 {
        self.wraparound_limit - self.xid_age
    }
}

/// Supplies per-table statistics for every candidate table.
#[async_trait]
pub trait StatisticsProvider: Send + Sync {
    /// All candidate tables with current statistics, in stable
    /// (schema, table) order.
    async fn table_statistics(&self) -> Result<Vec<TableStatistics>, ProviderError>;

    /// Number of other pgmaint sessions currently connected.
    async fn sibling_instances(&self) -> Result<usize, ProviderError>;
}

const STATISTICS_SQL: &str = "\
    SELECT n.nspname::text AS schema, \
           c.relname::text AS table, \
           (c.relispartition OR c.relkind = 'p') AS partitioned, \
           pg_total_relation_size(c.oid) AS size_bytes, \
           u.n_dead_tup::bigint AS dead_rows, \
           GREATEST(u.last_vacuum, u.last_autovacuum) AS last_vacuum_at, \
           GREATEST(u.last_analyze, u.last_autoanalyze) AS last_analyze_at, \
           age(c.relfrozenxid)::bigint AS xid_age \
    FROM pg_stat_user_tables u \
    JOIN pg_class c ON c.oid = u.relid \
    JOIN pg_namespace n ON n.oid = c.relnamespace \
    WHERE n.nspname NOT IN ('pg_catalog', 'pg_toast', 'information_schema') \
    ORDER BY n.nspname, c.relname";

const WRAPAROUND_SQL: &str =
    "SELECT current_setting('autovacuum_freeze_max_age')::bigint AS freeze_max_age";

const SIBLINGS_SQL: &str = "\
    SELECT count(*)::bigint FROM pg_stat_activity \
    WHERE application_name = $1 AND pid <> pg_backend_pid()";

/// Catalog-backed statistics provider over a live connection.
pub struct PgStatisticsProvider {
    client: Client,
}

impl PgStatisticsProvider {
    /// Connect and wrap the session. The connection task is spawned onto
    /// the current runtime and lives as long as the client.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ProviderError> {
        let client = connect(config).await?;
        info!(
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            "Connected to database"
        );
        Ok(Self { client })
    }

    fn statistics_from_row(row: &Row, wraparound_limit: i64) -> TableStatistics {
        TableStatistics {
            ident: TableIdent {
                schema: row.get("schema"),
                table: row.get("table"),
                partitioned: row.get("partitioned"),
            },
            size_bytes: row.get("size_bytes"),
            dead_rows: row.get("dead_rows"),
            last_vacuum_at: row.get("last_vacuum_at"),
            last_analyze_at: row.get("last_analyze_at"),
            xid_age: row.get("xid_age"),
            wraparound_limit,
        }
    }

    async fn wraparound_limit(&self) -> Result<i64, ProviderError> {
        let row = self
            .client
            .query_one(WRAPAROUND_SQL, &[])
            .await
            .map_err(|e| ProviderError::Setting {
                setting: "autovacuum_freeze_max_age".into(),
                message: e.to_string(),
            })?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl StatisticsProvider for PgStatisticsProvider {
    async fn table_statistics(&self) -> Result<Vec<TableStatistics>, ProviderError> {
        let wraparound_limit = self.wraparound_limit().await?;
        debug!(wraparound_limit, "Read server wraparound limit");

        let rows = self
            .client
            .query(STATISTICS_SQL, &[])
            .await
            .map_err(|e| ProviderError::CatalogQuery(e.to_string()))?;

        let stats: Vec<TableStatistics> = rows
            .iter()
            .map(|row| Self::statistics_from_row(row, wraparound_limit))
            .collect();

        info!(tables = stats.len(), "Collected table statistics");
        Ok(stats)
    }

    async fn sibling_instances(&self) -> Result<usize, ProviderError> {
        let row = self
            .client
            .query_one(SIBLINGS_SQL, &[&ConnectionConfig::APPLICATION_NAME])
            .await
            .map_err(|e| ProviderError::CatalogQuery(e.to_string()))?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }
}

/// Open one session against the configured database.
pub(crate) async fn connect(config: &ConnectionConfig) -> Result<Client, ProviderError> {
    let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
        .await
        .map_err(|e| ProviderError::ConnectionFailed {
            host: config.host.clone(),
            port: config.port,
            dbname: config.dbname.clone(),
            message: e.to_string(),
        })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!(error = %e, "Database connection closed with error");
        }
    });

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(schema: &str, table: &str) -> TableIdent {
        TableIdent {
            schema: schema.into(),
            table: table.into(),
            partitioned: false,
        }
    }

    #[test]
    fn test_qualified_quotes_identifiers() {
        assert_eq!(ident("public", "orders").qualified(), "\"public\".\"orders\"");
        // Embedded double quotes are doubled, not stripped
        assert_eq!(
            ident("public", "we\"ird").qualified(),
            "\"public\".\"we\"\"ird\""
        );
    }

    #[test]
    fn test_display_is_unquoted() {
        assert_eq!(ident("public", "orders").to_string(), "public.orders");
    }

    #[test]
    fn test_statistics_validity() {
        let mut stats = TableStatistics {
            ident: ident("public", "orders"),
            size_bytes: 1_000_000,
            dead_rows: 0,
            last_vacuum_at: None,
            last_analyze_at: None,
            xid_age: 100,
            wraparound_limit: 200_000_000,
        };
        assert!(stats.is_valid());

        stats.dead_rows = -1;
        assert!(!stats.is_valid());

        stats.dead_rows = 0;
        stats.xid_age = -5;
        assert!(!stats.is_valid());
    }

    #[test]
    fn test_remaining_distance() {
        let stats = TableStatistics {
            ident: ident("public", "orders"),
            size_bytes: 0,
            dead_rows: 0,
            last_vacuum_at: None,
            last_analyze_at: None,
            xid_age: 190_000_000,
            wraparound_limit: 200_000_000,
        };
        assert_eq!(stats.remaining_distance(), 10_000_000);

        let wrapped = TableStatistics {
            xid_age: 210_000_000,
            ..stats
        };
        assert_eq!(wrapped.remaining_distance(), -10_000_000);
    }
}
