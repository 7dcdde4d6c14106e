//! Metadata collection pipeline.
//!
//! The collector runs the full introspection sweep inside one scoped
//! connection, normalizes the heterogeneous rows into the canonical model,
//! applies table selection uniformly, and computes statistics last. A backend
//! failure anywhere in the sweep aborts the whole operation; no partial
//! metadata is ever returned.

pub mod normalize;

use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;

use crate::backends::row::RawRow;
use crate::backends::{self, ConnectionConfig, DatabaseBackend};
use crate::error::{DbSpecError, Result};
use crate::manager::ConnectionManager;
use crate::models::{
    CollectionStatistics, ConnectionInfo, DatabaseMetadata, NormalizedColumn,
    NormalizedForeignKey, TableListing,
};

/// Raw sweep output: engine name, version banner, and the three
/// introspection row sets.
struct RawSweep {
    dbms: String,
    version: String,
    column_rows: Vec<RawRow>,
    foreign_key_rows: Vec<RawRow>,
    index_rows: Vec<RawRow>,
}

/// Stateless metadata collector.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataCollector {
    manager: ConnectionManager,
}

impl MetadataCollector {
    /// Creates a collector.
    pub fn new() -> Self {
        Self {
            manager: ConnectionManager::new(),
        }
    }

    /// Collects full metadata for the configured target.
    ///
    /// `selected_tables`, when present, restricts columns, foreign keys and
    /// indexes to the named tables by exact table-name match; the filter is
    /// applied before statistics so the counters describe the returned data.
    ///
    /// # Errors
    /// Returns a single `DbSpecError::Query` summarizing the first backend
    /// failure, connect included; the classified failure text is carried
    /// inside the summary.
    pub async fn collect_database_metadata(
        &self,
        config: &ConnectionConfig,
        selected_tables: Option<&[String]>,
    ) -> Result<DatabaseMetadata> {
        let backend = backends::create_backend(config)?;
        self.collect_database_metadata_with(backend, config, selected_tables)
            .await
    }

    /// Same pipeline against a caller-supplied backend.
    pub async fn collect_database_metadata_with(
        &self,
        backend: Box<dyn DatabaseBackend>,
        config: &ConnectionConfig,
        selected_tables: Option<&[String]>,
    ) -> Result<DatabaseMetadata> {
        let started = Instant::now();
        tracing::info!("Starting metadata collection for {config}");

        let sweep = self
            .manager
            .run_scoped(backend, |backend| {
                Box::pin(async move {
                    let dbms = backend.engine_name().to_string();
                    let version = best_effort_version(backend).await;

                    tracing::debug!("Collecting column metadata");
                    let column_rows = backend.tables_info().await?;

                    tracing::debug!("Collecting foreign keys");
                    let foreign_key_rows = backend.foreign_keys_info().await?;

                    tracing::debug!("Collecting indexes");
                    let index_rows = backend.indexes_info().await?;

                    Ok(RawSweep {
                        dbms,
                        version,
                        column_rows,
                        foreign_key_rows,
                        index_rows,
                    })
                })
            })
            .await
            .map_err(sweep_failure)?;

        let mut columns = normalize::normalize_columns(&sweep.column_rows);
        let mut foreign_keys = normalize::normalize_foreign_keys(&sweep.foreign_key_rows);
        let mut index_rows = normalize::normalize_indexes(&sweep.index_rows);

        if let Some(selected) = selected_tables {
            let keep: HashSet<&str> = selected.iter().map(String::as_str).collect();
            columns.retain(|c| keep.contains(c.table_name.as_str()));
            foreign_keys.retain(|fk| keep.contains(fk.table_name.as_str()));
            index_rows.retain(|ix| keep.contains(ix.table_name.as_str()));
        }

        let indexes = normalize::group_indexes(&index_rows);
        let statistics = statistics_of(&columns, &foreign_keys, started);
        tracing::info!(
            "Collected {} columns across {} tables in {}ms",
            statistics.total_columns,
            statistics.total_tables,
            statistics.collection_duration_ms
        );

        Ok(DatabaseMetadata {
            connection_info: connection_info(config, sweep.dbms, sweep.version),
            columns,
            foreign_keys,
            indexes,
            statistics,
        })
    }

    /// Collects the lightweight table list for table-selection workflows.
    ///
    /// # Errors
    /// Returns a single summarized query error for any backend failure,
    /// connect included.
    pub async fn collect_table_list(&self, config: &ConnectionConfig) -> Result<TableListing> {
        let backend = backends::create_backend(config)?;
        self.collect_table_list_with(backend, config).await
    }

    /// Same table listing against a caller-supplied backend.
    ///
    /// # Errors
    /// Returns a single summarized query error for any backend failure,
    /// connect included.
    pub async fn collect_table_list_with(
        &self,
        backend: Box<dyn DatabaseBackend>,
        config: &ConnectionConfig,
    ) -> Result<TableListing> {
        let started = Instant::now();
        tracing::info!("Listing tables for {config}");

        let (dbms, version, table_rows) = self
            .manager
            .run_scoped(backend, |backend| {
                Box::pin(async move {
                    let dbms = backend.engine_name().to_string();
                    let version = best_effort_version(backend).await;
                    let rows = backend.tables_basic_info().await?;
                    Ok((dbms, version, rows))
                })
            })
            .await
            .map_err(sweep_failure)?;

        let tables = normalize::normalize_table_summaries(&table_rows);
        let statistics = CollectionStatistics {
            total_tables: tables.len(),
            collection_duration_ms: elapsed_ms(started),
            ..CollectionStatistics::default()
        };

        Ok(TableListing {
            connection_info: connection_info(config, dbms, version),
            tables,
            statistics,
        })
    }
}

async fn best_effort_version(backend: &mut dyn DatabaseBackend) -> String {
    match backend.fetch_version().await {
        Ok(version) => version,
        Err(e) => {
            tracing::debug!("Version fetch failed; recording \"Unknown\": {e}");
            "Unknown".to_string()
        }
    }
}

/// Collapses any failure in the scoped sweep, connect included, into one
/// summarized query error. Classified connection failures keep their
/// rendered detail inside the summary message.
fn sweep_failure(error: DbSpecError) -> DbSpecError {
    match error {
        DbSpecError::Query { statement, message } => DbSpecError::query_failed(
            statement,
            format!("metadata collection failed: {message}"),
        ),
        other => {
            DbSpecError::query_failed("metadata collection", format!("metadata collection failed: {other}"))
        }
    }
}

fn connection_info(config: &ConnectionConfig, dbms: String, version: String) -> ConnectionInfo {
    ConnectionInfo {
        dbms,
        host: config.host.clone(),
        port: config.port,
        database: config.database.clone(),
        username: config.username.clone(),
        version,
        collected_at: Utc::now(),
    }
}

fn statistics_of(
    columns: &[NormalizedColumn],
    foreign_keys: &[NormalizedForeignKey],
    started: Instant,
) -> CollectionStatistics {
    let total_tables = columns
        .iter()
        .map(|c| c.table_name.as_str())
        .collect::<HashSet<_>>()
        .len();
    CollectionStatistics {
        total_tables,
        total_columns: columns.len(),
        total_foreign_keys: foreign_keys.len(),
        collection_duration_ms: elapsed_ms(started),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::Nullable;

    fn column(table: &str, name: &str) -> NormalizedColumn {
        NormalizedColumn {
            table_name: table.to_string(),
            table_comment: String::new(),
            column_position: 1,
            column_name: name.to_string(),
            data_type: "TEXT".to_string(),
            default_value: String::new(),
            nullable: Nullable::Yes,
            key_type: String::new(),
            extra: String::new(),
            column_comment: String::new(),
        }
    }

    #[test]
    fn statistics_count_distinct_tables_and_all_columns() {
        let columns = vec![
            column("users", "id"),
            column("users", "name"),
            column("orders", "id"),
        ];
        let stats = statistics_of(&columns, &[], Instant::now());
        assert_eq!(stats.total_tables, 2);
        assert_eq!(stats.total_columns, 3);
        assert_eq!(stats.total_foreign_keys, 0);
    }

    #[test]
    fn sweep_failure_is_always_a_query_error() {
        let wrapped = sweep_failure(DbSpecError::query_failed("SELECT 1", "boom"));
        match &wrapped {
            DbSpecError::Query { message, .. } => {
                assert!(message.contains("metadata collection failed"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }

        let wrapped = sweep_failure(DbSpecError::configuration("bad"));
        assert!(matches!(wrapped, DbSpecError::Query { .. }));
    }

    #[test]
    fn sweep_failure_keeps_classified_connection_detail() {
        let connect_err = DbSpecError::connection(
            crate::error::ConnectionErrorKind::AuthenticationFailure,
            crate::error::ConnectionContext {
                dbms: "PostgreSQL".to_string(),
                host: "db1".to_string(),
                port: 5432,
                database: "appdb".to_string(),
            },
            "password authentication rejected",
        );
        match sweep_failure(connect_err) {
            DbSpecError::Query { message, .. } => {
                assert!(message.contains("metadata collection failed"));
                assert!(message.contains("authentication failure"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
