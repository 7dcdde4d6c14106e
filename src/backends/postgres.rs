//! PostgreSQL backend.
//!
//! Table/column introspection is decomposed into three queries: the decorated
//! column query (rendered type string, comments, auto-increment detection),
//! then primary-key and foreign-key membership sets, because key
//! classification cannot be derived from the column view alone. Membership
//! sets are computed first and column rows are annotated `PRI`/`MUL`
//! afterwards. When any query in the decorated pass fails, membership
//! queries included, a reduced query without comments or keys keeps the
//! collection alive under the default `Degrade` policy.
//!
//! Scope is the `public` schema.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Row};

use super::config::{ConnectionConfig, FallbackPolicy};
use super::row::{QueryOutput, RawRow};
use super::DatabaseBackend;
use crate::error::{ConnectionContext, ConnectionErrorKind, DbSpecError, Result};

const ENGINE_NAME: &str = "PostgreSQL";

/// Decorated column query: rendered type string, table/column comments,
/// `nextval` defaults surfaced as an auto-increment marker. Key
/// classification is annotated afterwards from the membership sets.
const COLUMNS_QUERY: &str = r#"
    SELECT
        t.table_name AS table_name,
        COALESCE(pgd.description, '') AS table_comment,
        col.ordinal_position AS ordinal_position,
        col.column_name AS column_name,
        CASE
            WHEN col.data_type = 'character varying'
                THEN 'varchar(' || COALESCE(col.character_maximum_length::text, '') || ')'
            WHEN col.data_type = 'character'
                THEN 'char(' || COALESCE(col.character_maximum_length::text, '') || ')'
            WHEN col.data_type = 'numeric'
                THEN 'numeric(' || COALESCE(col.numeric_precision::text, '0') || ','
                     || COALESCE(col.numeric_scale::text, '0') || ')'
            ELSE col.data_type
        END AS data_type,
        COALESCE(col.column_default, '') AS column_default,
        col.is_nullable AS is_nullable,
        '' AS key_type,
        CASE
            WHEN col.column_default LIKE 'nextval%' THEN 'auto_increment'
            ELSE ''
        END AS extra,
        COALESCE(pgcd.description, '') AS column_comment
    FROM information_schema.tables t
    JOIN information_schema.columns col
      ON t.table_name = col.table_name AND t.table_schema = col.table_schema
    LEFT JOIN pg_class pgc ON pgc.relname = t.table_name
    LEFT JOIN pg_description pgd ON pgd.objoid = pgc.oid AND pgd.objsubid = 0
    LEFT JOIN pg_description pgcd
      ON pgcd.objoid = pgc.oid AND pgcd.objsubid = col.ordinal_position
    WHERE t.table_schema = 'public'
      AND t.table_type IN ('BASE TABLE', 'VIEW')
    ORDER BY t.table_name, col.ordinal_position
"#;

/// Reduced fallback: no comments, no key classification. Partial degradation
/// is preferred to total failure under the default policy.
const COLUMNS_FALLBACK_QUERY: &str = r#"
    SELECT
        t.table_name AS table_name,
        '' AS table_comment,
        col.ordinal_position AS ordinal_position,
        col.column_name AS column_name,
        col.data_type AS data_type,
        COALESCE(col.column_default, '') AS column_default,
        col.is_nullable AS is_nullable,
        '' AS key_type,
        '' AS extra,
        '' AS column_comment
    FROM information_schema.tables t
    JOIN information_schema.columns col
      ON t.table_name = col.table_name AND t.table_schema = col.table_schema
    WHERE t.table_schema = 'public'
      AND t.table_type = 'BASE TABLE'
    ORDER BY t.table_name, col.ordinal_position
"#;

const KEY_MEMBERSHIP_QUERY: &str = r#"
    SELECT ku.table_name AS table_name, ku.column_name AS column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage ku
      ON tc.constraint_name = ku.constraint_name
    WHERE tc.constraint_type = $1
      AND tc.table_schema = 'public'
"#;

/// PostgreSQL connection backend over a single sqlx connection.
pub struct PostgresBackend {
    config: ConnectionConfig,
    conn: Option<PgConnection>,
    connected: bool,
}

impl PostgresBackend {
    /// Creates an unconnected backend for the given target.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            conn: None,
            connected: false,
        }
    }

    fn context(&self) -> ConnectionContext {
        ConnectionContext {
            dbms: ENGINE_NAME.to_string(),
            host: self.config.host.clone(),
            port: self.config.port,
            database: self.config.database.clone(),
        }
    }

    fn conn_mut(&mut self) -> Result<&mut PgConnection> {
        let context = self.context();
        self.conn.as_mut().ok_or_else(|| {
            DbSpecError::connection(
                ConnectionErrorKind::GenericConnectionFailure,
                context,
                "not connected",
            )
        })
    }

    fn classify_connect_error(&self, error: &sqlx::Error) -> DbSpecError {
        let (kind, message) = classify_postgres_message(&error.to_string(), &self.config);
        DbSpecError::connection(kind, self.context(), message)
    }

    async fn fetch_raw_rows(&mut self, sql: &str) -> Result<Vec<RawRow>> {
        let conn = self.conn_mut()?;
        let rows = sqlx::query(sql)
            .fetch_all(conn)
            .await
            .map_err(|e| DbSpecError::query_failed(sql, e.to_string()))?;
        Ok(rows.iter().map(raw_from_pg_row).collect())
    }

    /// Collects a (table, column) membership set for one constraint type.
    async fn key_membership(&mut self, constraint_type: &str) -> Result<HashSet<(String, String)>> {
        let conn = self.conn_mut()?;
        let rows: Vec<(String, String)> = sqlx::query_as(KEY_MEMBERSHIP_QUERY)
            .bind(constraint_type)
            .fetch_all(conn)
            .await
            .map_err(|e| DbSpecError::query_failed(KEY_MEMBERSHIP_QUERY, e.to_string()))?;
        Ok(rows.into_iter().collect())
    }

    /// The whole decorated pass: column rows plus both membership sets.
    /// Any failure here, membership queries included, is degradable.
    async fn decorated_tables_info(&mut self) -> Result<Vec<RawRow>> {
        let rows = self.fetch_raw_rows(COLUMNS_QUERY).await?;
        let pk = self.key_membership("PRIMARY KEY").await;
        let fk = self.key_membership("FOREIGN KEY").await;
        decorate_columns(rows, pk, fk)
    }
}

/// Completes the decorated result: annotation needs both membership sets, so
/// a failed membership query fails the decorated pass as a whole.
fn decorate_columns(
    mut rows: Vec<RawRow>,
    pk: Result<HashSet<(String, String)>>,
    fk: Result<HashSet<(String, String)>>,
) -> Result<Vec<RawRow>> {
    let pk = pk?;
    let fk = fk?;
    annotate_key_types(&mut rows, &pk, &fk);
    Ok(rows)
}

/// Maps a driver failure message to the connection error taxonomy.
///
/// PostgreSQL failure signaling at connect time is string-shaped; the
/// classifier matches the documented server message fragments.
fn classify_postgres_message(
    message: &str,
    config: &ConnectionConfig,
) -> (ConnectionErrorKind, String) {
    if message.contains("password authentication failed")
        || message.contains("authentication failed")
    {
        (
            ConnectionErrorKind::AuthenticationFailure,
            format!("password authentication rejected ({message})"),
        )
    } else if message.contains("database") && message.contains("does not exist") {
        (
            ConnectionErrorKind::DatabaseNotFound,
            format!("database '{}' does not exist ({message})", config.database),
        )
    } else if message.contains("could not connect")
        || message.contains("Connection refused")
        || message.contains("timed out")
    {
        (
            ConnectionErrorKind::ConnectionRefusedOrTimeout,
            format!(
                "cannot reach server at {}:{} ({message})",
                config.host, config.port
            ),
        )
    } else {
        (
            ConnectionErrorKind::GenericConnectionFailure,
            message.to_string(),
        )
    }
}

/// Packages a driver row into a [`RawRow`] without renaming labels.
fn raw_from_pg_row(row: &PgRow) -> RawRow {
    let mut raw = RawRow::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<String>, _>(i) {
            v.map_or(Value::Null, Value::String)
        } else if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map_or(Value::Null, Value::from)
        } else if let Ok(v) = row.try_get::<Option<i32>, _>(i) {
            v.map_or(Value::Null, Value::from)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
            v.map_or(Value::Null, Value::from)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
            v.map_or(Value::Null, Value::Bool)
        } else {
            Value::Null
        };
        raw.insert(column.name(), value);
    }
    raw
}

/// Annotates column rows with `PRI`/`MUL` by membership-set lookup.
/// Primary-key membership wins over foreign-key membership.
fn annotate_key_types(
    rows: &mut [RawRow],
    pk: &HashSet<(String, String)>,
    fk: &HashSet<(String, String)>,
) {
    for row in rows {
        let table = row
            .value("table_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let column = row
            .value("column_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let key = (table, column);
        let key_type = if pk.contains(&key) {
            "PRI"
        } else if fk.contains(&key) {
            "MUL"
        } else {
            ""
        };
        row.insert("key_type", Value::String(key_type.to_string()));
    }
}

#[async_trait]
impl DatabaseBackend for PostgresBackend {
    fn engine_name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        let options = PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .password(&self.config.password)
            .database(&self.config.database)
            .application_name(concat!("dbspec-core-", env!("CARGO_PKG_VERSION")));

        tracing::debug!(
            "Connecting to PostgreSQL at {}:{}",
            self.config.host,
            self.config.port
        );

        let connect = PgConnection::connect_with(&options);
        match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(conn)) => {
                self.conn = Some(conn);
                self.connected = true;
                Ok(())
            }
            Ok(Err(e)) => Err(self.classify_connect_error(&e)),
            Err(_) => Err(DbSpecError::connection(
                ConnectionErrorKind::ConnectionRefusedOrTimeout,
                self.context(),
                format!(
                    "connect timed out after {}s",
                    self.config.connect_timeout.as_secs()
                ),
            )),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!("Ignoring error while closing PostgreSQL connection: {e}");
            }
        }
        self.connected = false;
    }

    async fn test_connection(&mut self) -> Result<bool> {
        let context = self.context();
        let conn = self.conn_mut()?;
        let probe: i32 = sqlx::query_scalar("SELECT 1 AS test")
            .fetch_one(conn)
            .await
            .map_err(|e| {
                DbSpecError::connection(
                    ConnectionErrorKind::GenericConnectionFailure,
                    context,
                    format!("connection probe failed: {e}"),
                )
            })?;
        Ok(probe == 1)
    }

    async fn fetch_version(&mut self) -> Result<String> {
        let sql = "SELECT version() AS version";
        let conn = self.conn_mut()?;
        sqlx::query_scalar(sql)
            .fetch_one(conn)
            .await
            .map_err(|e| DbSpecError::query_failed(sql, e.to_string()))
    }

    async fn execute_query(&mut self, sql: &str, params: &[&str]) -> Result<QueryOutput> {
        let is_read = sql.trim_start().to_uppercase().starts_with("SELECT");
        let conn = self.conn_mut()?;
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(*param);
        }
        if is_read {
            let rows = query
                .fetch_all(conn)
                .await
                .map_err(|e| DbSpecError::query_failed(sql, e.to_string()))?;
            Ok(QueryOutput::Rows(rows.iter().map(raw_from_pg_row).collect()))
        } else {
            let done = query
                .execute(conn)
                .await
                .map_err(|e| DbSpecError::query_failed(sql, e.to_string()))?;
            Ok(QueryOutput::Affected(done.rows_affected()))
        }
    }

    async fn tables_basic_info(&mut self) -> Result<Vec<RawRow>> {
        let sql = r#"
            SELECT
                t.table_name AS table_name,
                COALESCE(obj_description(pgc.oid), '') AS table_comment
            FROM information_schema.tables t
            LEFT JOIN pg_class pgc ON pgc.relname = t.table_name
            LEFT JOIN pg_namespace pgn ON pgn.oid = pgc.relnamespace
            WHERE t.table_schema = 'public'
              AND t.table_type IN ('BASE TABLE', 'VIEW')
              AND (pgn.nspname = 'public' OR pgn.nspname IS NULL)
            ORDER BY t.table_name
        "#;
        self.fetch_raw_rows(sql).await
    }

    async fn tables_info(&mut self) -> Result<Vec<RawRow>> {
        match self.decorated_tables_info().await {
            Ok(rows) => Ok(rows),
            Err(e) => match self.config.postgres_fallback {
                FallbackPolicy::Degrade => {
                    tracing::warn!(
                        "Decorated column pass failed ({e}); retrying with reduced query \
                         without comments or key classification"
                    );
                    self.fetch_raw_rows(COLUMNS_FALLBACK_QUERY).await
                }
                FallbackPolicy::Fail => Err(e),
            },
        }
    }

    async fn foreign_keys_info(&mut self) -> Result<Vec<RawRow>> {
        let sql = r#"
            SELECT
                kcu.table_name AS table_name,
                kcu.column_name AS column_name,
                ccu.table_name AS referenced_table_name,
                ccu.column_name AS referenced_column_name,
                tc.constraint_name AS constraint_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
            JOIN information_schema.constraint_column_usage ccu
              ON ccu.constraint_name = tc.constraint_name
            WHERE tc.constraint_type = 'FOREIGN KEY'
              AND tc.table_schema = 'public'
            ORDER BY kcu.table_name, kcu.column_name
        "#;
        self.fetch_raw_rows(sql).await
    }

    async fn indexes_info(&mut self) -> Result<Vec<RawRow>> {
        // seq_in_index from the index column vector, not the table attnum.
        let sql = r#"
            SELECT
                i.tablename AS table_name,
                i.indexname AS index_name,
                NOT ix.indisunique AS non_unique,
                a.attname AS column_name,
                array_position(ix.indkey::int2[], a.attnum) AS seq_in_index
            FROM pg_indexes i
            JOIN pg_class t ON t.relname = i.tablename
            JOIN pg_index ix ON ix.indrelid = t.oid
            JOIN pg_class ic ON ic.oid = ix.indexrelid AND ic.relname = i.indexname
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE i.schemaname = 'public'
              AND NOT ix.indisprimary
            ORDER BY i.tablename, i.indexname, seq_in_index
        "#;
        self.fetch_raw_rows(sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseEngine;
    use serde_json::json;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new(
            DatabaseEngine::PostgreSql,
            "localhost",
            5432,
            "appdb",
            "app",
            "pw",
        )
    }

    #[test]
    fn auth_failure_message_classifies() {
        let (kind, _) = classify_postgres_message(
            "error returned from database: password authentication failed for user \"app\"",
            &config(),
        );
        assert_eq!(kind, ConnectionErrorKind::AuthenticationFailure);
    }

    #[test]
    fn missing_database_message_classifies() {
        let (kind, msg) =
            classify_postgres_message("database \"appdb\" does not exist", &config());
        assert_eq!(kind, ConnectionErrorKind::DatabaseNotFound);
        assert!(msg.contains("appdb"));
    }

    #[test]
    fn refused_and_timeout_messages_classify() {
        for message in [
            "could not connect to server: No route to host",
            "Connection refused (os error 111)",
            "connection attempt timed out",
        ] {
            let (kind, _) = classify_postgres_message(message, &config());
            assert_eq!(kind, ConnectionErrorKind::ConnectionRefusedOrTimeout);
        }
    }

    #[test]
    fn unmatched_message_stays_generic_and_preserved() {
        let (kind, msg) = classify_postgres_message("ssl negotiation error", &config());
        assert_eq!(kind, ConnectionErrorKind::GenericConnectionFailure);
        assert_eq!(msg, "ssl negotiation error");
    }

    #[test]
    fn key_annotation_prefers_primary_over_foreign() {
        let mut rows = vec![
            [
                ("table_name", json!("orders")),
                ("column_name", json!("id")),
                ("key_type", json!("")),
            ]
            .into_iter()
            .collect::<RawRow>(),
            [
                ("table_name", json!("orders")),
                ("column_name", json!("user_id")),
                ("key_type", json!("")),
            ]
            .into_iter()
            .collect::<RawRow>(),
            [
                ("table_name", json!("orders")),
                ("column_name", json!("note")),
                ("key_type", json!("")),
            ]
            .into_iter()
            .collect::<RawRow>(),
        ];
        let pk: HashSet<_> = [("orders".to_string(), "id".to_string())].into_iter().collect();
        let fk: HashSet<_> = [
            ("orders".to_string(), "id".to_string()),
            ("orders".to_string(), "user_id".to_string()),
        ]
        .into_iter()
        .collect();

        annotate_key_types(&mut rows, &pk, &fk);

        assert_eq!(rows[0].value("key_type"), Some(&json!("PRI")));
        assert_eq!(rows[1].value("key_type"), Some(&json!("MUL")));
        assert_eq!(rows[2].value("key_type"), Some(&json!("")));
    }

    #[test]
    fn membership_failure_fails_the_whole_decorated_pass() {
        let rows = vec![
            [
                ("table_name", json!("orders")),
                ("column_name", json!("id")),
                ("key_type", json!("")),
            ]
            .into_iter()
            .collect::<RawRow>(),
        ];
        let fk: HashSet<(String, String)> = HashSet::new();

        // A failed membership query sinks the decorated pass, which is what
        // routes the caller to the reduced query under the Degrade policy.
        let result = decorate_columns(
            rows.clone(),
            Err(DbSpecError::query_failed(
                KEY_MEMBERSHIP_QUERY,
                "permission denied for table pg_constraint",
            )),
            Ok(fk.clone()),
        );
        assert!(result.is_err());

        let pk: HashSet<_> = [("orders".to_string(), "id".to_string())].into_iter().collect();
        let decorated = match decorate_columns(rows, Ok(pk), Ok(fk)) {
            Ok(rows) => rows,
            Err(e) => panic!("decorated pass failed: {e}"),
        };
        assert_eq!(decorated[0].value("key_type"), Some(&json!("PRI")));
    }
}
