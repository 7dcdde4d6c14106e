//! End-to-end pipeline tests against a scripted in-memory backend.
//!
//! No live databases: the backend below implements the capability contract
//! and serves catalog rows in the mixed vocabularies real engines produce,
//! exercising connection lifecycle, normalization, filtering, grouping,
//! statistics, and probe reporting together.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use dbspec_core::backends::row::{QueryOutput, RawRow};
use dbspec_core::backends::{ConnectionConfig, DatabaseBackend};
use dbspec_core::error::{ConnectionContext, ConnectionErrorKind, DbSpecError, Result};
use dbspec_core::{
    ConnectionManager, DatabaseEngine, MetadataCollector, Nullable,
};

fn row(entries: &[(&str, Value)]) -> RawRow {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn config() -> ConnectionConfig {
    ConnectionConfig::new(DatabaseEngine::MySql, "db.internal", 3306, "shop", "app", "pw")
}

/// Scripted backend serving a two-table shop schema.
///
/// USERS rows use the lowercase information_schema vocabulary; ORDERS rows
/// use the uppercase catalog vocabulary, so normalization is exercised
/// across both in one sweep.
struct ScriptedBackend {
    connected: bool,
    reject_credentials: bool,
    fail_introspection: bool,
    disconnects: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    fn new() -> Self {
        Self {
            connected: false,
            reject_credentials: false,
            fail_introspection: false,
            disconnects: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn rejecting_credentials() -> Self {
        Self {
            reject_credentials: true,
            ..Self::new()
        }
    }

    fn failing_introspection() -> Self {
        Self {
            fail_introspection: true,
            ..Self::new()
        }
    }

    fn disconnect_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.disconnects)
    }
}

#[async_trait]
impl DatabaseBackend for ScriptedBackend {
    fn engine_name(&self) -> &'static str {
        "MySQL/MariaDB"
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        if self.reject_credentials {
            return Err(DbSpecError::connection(
                ConnectionErrorKind::AuthenticationFailure,
                ConnectionContext {
                    dbms: "MySQL/MariaDB".to_string(),
                    host: "db.internal".to_string(),
                    port: 3306,
                    database: "shop".to_string(),
                },
                "Access denied for user 'app'",
            ));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn test_connection(&mut self) -> Result<bool> {
        Ok(self.connected)
    }

    async fn fetch_version(&mut self) -> Result<String> {
        Ok("MySQL 8.4.2".to_string())
    }

    async fn execute_query(&mut self, _sql: &str, _params: &[&str]) -> Result<QueryOutput> {
        Ok(QueryOutput::Rows(Vec::new()))
    }

    async fn tables_basic_info(&mut self) -> Result<Vec<RawRow>> {
        Ok(vec![
            row(&[
                ("table_name", json!("ORDERS")),
                ("table_comment", json!("order headers")),
            ]),
            row(&[
                ("table_name", json!("USERS")),
                ("table_comment", json!("registered accounts")),
            ]),
        ])
    }

    async fn tables_info(&mut self) -> Result<Vec<RawRow>> {
        if self.fail_introspection {
            return Err(DbSpecError::query_failed(
                "SELECT ... FROM information_schema.columns",
                "Table 'information_schema.columns' is marked as crashed",
            ));
        }
        Ok(vec![
            row(&[
                ("table_name", json!("USERS")),
                ("table_comment", json!("registered accounts")),
                ("ordinal_position", json!(1)),
                ("column_name", json!("id")),
                ("column_type", json!("bigint")),
                ("column_default", Value::Null),
                ("is_nullable", json!("NO")),
                ("column_key", json!("PRI")),
                ("extra", json!("auto_increment")),
                ("column_comment", json!("")),
            ]),
            row(&[
                ("table_name", json!("USERS")),
                ("table_comment", json!("registered accounts")),
                ("ordinal_position", json!(2)),
                ("column_name", json!("name")),
                ("column_type", json!("varchar(100)")),
                ("column_default", json!("")),
                ("is_nullable", json!("YES")),
                ("column_key", json!("")),
                ("extra", json!("")),
                ("column_comment", json!("display name")),
            ]),
            row(&[
                ("TABLE_NAME", json!("ORDERS")),
                ("TABLE_COMMENT", json!("order headers")),
                ("ORDINAL_POSITION", json!(1)),
                ("COLUMN_NAME", json!("user_id")),
                ("TYPE", json!("NUMBER(10)")),
                ("DEFAULT_VALUE", json!("")),
                ("NULLABLE", json!("N")),
                ("KEY_TYPE", json!("R")),
            ]),
        ])
    }

    async fn foreign_keys_info(&mut self) -> Result<Vec<RawRow>> {
        Ok(vec![row(&[
            ("table_name", json!("ORDERS")),
            ("column_name", json!("user_id")),
            ("referenced_table_name", json!("USERS")),
            ("referenced_column_name", json!("id")),
            ("constraint_name", json!("fk_orders_user")),
        ])])
    }

    async fn indexes_info(&mut self) -> Result<Vec<RawRow>> {
        Ok(vec![row(&[
            ("table_name", json!("ORDERS")),
            ("index_name", json!("idx_orders_user")),
            ("column_name", json!("user_id")),
            ("seq_in_index", json!(1)),
            ("non_unique", json!(1)),
        ])])
    }
}

#[tokio::test]
async fn full_sweep_normalizes_mixed_vocabularies() {
    let collector = MetadataCollector::new();
    let metadata = collector
        .collect_database_metadata_with(Box::new(ScriptedBackend::new()), &config(), None)
        .await
        .unwrap();

    assert_eq!(metadata.statistics.total_tables, 2);
    assert_eq!(metadata.statistics.total_columns, 3);
    assert_eq!(metadata.statistics.total_foreign_keys, 1);

    let id = &metadata.columns[0];
    assert_eq!(id.table_name, "USERS");
    assert_eq!(id.key_type, "PRI");
    assert_eq!(id.nullable, Nullable::No);
    assert_eq!(id.default_value, "");
    assert_eq!(id.extra, "auto_increment");

    // Uppercase catalog vocabulary lands in the same canonical shape.
    let user_id = &metadata.columns[2];
    assert_eq!(user_id.table_name, "ORDERS");
    assert_eq!(user_id.data_type, "NUMBER(10)");
    assert_eq!(user_id.key_type, "MUL");
    assert_eq!(user_id.nullable, Nullable::No);

    assert_eq!(metadata.foreign_keys[0].referenced_table_name, "USERS");

    assert_eq!(metadata.indexes.len(), 1);
    let idx = &metadata.indexes[0];
    assert_eq!(idx.index_name, "idx_orders_user");
    assert!(idx.non_unique);
    assert_eq!(idx.columns.len(), 1);
    assert_eq!(idx.columns[0].column_name, "user_id");

    assert_eq!(metadata.connection_info.version, "MySQL 8.4.2");
    // The report echoes the backend's engine name, not the config variant.
    assert_eq!(metadata.connection_info.dbms, "MySQL/MariaDB");
}

#[tokio::test]
async fn table_selection_filters_all_sections_before_statistics() {
    let collector = MetadataCollector::new();
    let selected = vec!["USERS".to_string()];
    let metadata = collector
        .collect_database_metadata_with(
            Box::new(ScriptedBackend::new()),
            &config(),
            Some(&selected),
        )
        .await
        .unwrap();

    assert_eq!(metadata.statistics.total_tables, 1);
    assert_eq!(metadata.statistics.total_columns, 2);
    assert_eq!(metadata.statistics.total_foreign_keys, 0);
    assert!(metadata.indexes.is_empty());
    assert!(metadata.columns.iter().all(|c| c.table_name == "USERS"));
}

#[tokio::test]
async fn introspection_failure_aborts_with_query_error_and_disconnects() {
    let backend = ScriptedBackend::failing_introspection();
    let disconnects = backend.disconnect_counter();

    let collector = MetadataCollector::new();
    let err = collector
        .collect_database_metadata_with(Box::new(backend), &config(), None)
        .await
        .unwrap_err();

    match err {
        DbSpecError::Query { message, .. } => {
            assert!(message.contains("metadata collection failed"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connect_failure_also_collapses_into_a_query_error() {
    let collector = MetadataCollector::new();
    let err = collector
        .collect_database_metadata_with(
            Box::new(ScriptedBackend::rejecting_credentials()),
            &config(),
            None,
        )
        .await
        .unwrap_err();

    // Full collection reports one summarized query error even for connect
    // failures; the classified detail survives inside the message.
    match err {
        DbSpecError::Query { message, .. } => {
            assert!(message.contains("metadata collection failed"));
            assert!(message.contains("authentication failure"));
            assert!(message.contains("Access denied"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn table_list_is_sequentially_numbered() {
    let collector = MetadataCollector::new();
    let listing = collector
        .collect_table_list_with(Box::new(ScriptedBackend::new()), &config())
        .await
        .unwrap();

    assert_eq!(listing.tables.len(), 2);
    assert_eq!(listing.tables[0].no, 1);
    assert_eq!(listing.tables[0].table_name, "ORDERS");
    assert_eq!(listing.tables[1].no, 2);
    assert_eq!(listing.tables[1].table_name, "USERS");
    assert_eq!(listing.statistics.total_tables, 2);
    assert_eq!(listing.statistics.total_columns, 0);
}

#[tokio::test]
async fn probe_reports_success_with_version() {
    let manager = ConnectionManager::new();
    let report = manager
        .probe_backend(Box::new(ScriptedBackend::new()), &config())
        .await;

    assert!(report.success);
    assert_eq!(report.dbms, "MySQL/MariaDB");
    assert_eq!(report.version.as_deref(), Some("MySQL 8.4.2"));
    assert!(report.error.is_none());
    assert_eq!(report.host, "db.internal");
    assert_eq!(report.port, 3306);
    assert_eq!(report.database, "shop");
}

#[tokio::test]
async fn probe_converts_rejected_credentials_into_failure_report() {
    let backend = ScriptedBackend::rejecting_credentials();
    let disconnects = backend.disconnect_counter();

    let manager = ConnectionManager::new();
    let report = manager.probe_backend(Box::new(backend), &config()).await;

    assert!(!report.success);
    assert!(report.version.is_none());
    let error = report.error.unwrap();
    assert!(error.contains("Access denied"));
    // Disconnect still ran, keeping the lifecycle symmetric.
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_scoped_disconnects_when_the_operation_fails() {
    let backend = ScriptedBackend::new();
    let disconnects = backend.disconnect_counter();

    let manager = ConnectionManager::new();
    let outcome = manager
        .run_scoped(Box::new(backend), |backend| {
            Box::pin(async move {
                assert!(backend.is_connected());
                Err::<(), _>(DbSpecError::query_failed("SELECT 1", "forced failure"))
            })
        })
        .await;

    assert!(outcome.is_err());
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}
