//! MySQL/MariaDB backend.
//!
//! Introspection is driven entirely through the standard `information_schema`
//! views, scoped by the configured schema name. The MariaDB vs MySQL
//! distinction is cosmetic and decided post-hoc from the version banner.
//!
//! Text-ish catalog columns are `CAST(... AS CHAR)` in SQL to avoid the
//! VARBINARY surprises newer MySQL versions produce for system views.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Row};

use super::config::ConnectionConfig;
use super::row::{QueryOutput, RawRow};
use super::DatabaseBackend;
use crate::error::{ConnectionContext, ConnectionErrorKind, DbSpecError, Result};

const ENGINE_NAME: &str = "MySQL/MariaDB";

// Driver error codes used for connect-failure classification.
const ER_ACCESS_DENIED: u32 = 1045;
const ER_BAD_DB: u32 = 1049;
const ER_CONN_HOST: u32 = 2003;

/// MySQL/MariaDB connection backend over a single sqlx connection.
pub struct MySqlBackend {
    config: ConnectionConfig,
    conn: Option<MySqlConnection>,
    connected: bool,
}

impl MySqlBackend {
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

    fn conn_mut(&mut self) -> Result<&mut MySqlConnection> {
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
        let code = match error {
            sqlx::Error::Database(db) => db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|db| u32::from(db.number())),
            _ => None,
        };
        let (kind, message) = classify_mysql_signal(code, &error.to_string(), &self.config);
        DbSpecError::connection(kind, self.context(), message)
    }

    async fn fetch_raw_rows(&mut self, sql: &str, bind_schema: bool) -> Result<Vec<RawRow>> {
        let schema = self.config.database.clone();
        let conn = self.conn_mut()?;
        let mut query = sqlx::query(sql);
        if bind_schema {
            query = query.bind(schema);
        }
        let rows = query
            .fetch_all(conn)
            .await
            .map_err(|e| DbSpecError::query_failed(sql, e.to_string()))?;
        Ok(rows.iter().map(raw_from_mysql_row).collect())
    }
}

/// Maps a driver error code (or message, when no code is available) to the
/// connection error taxonomy.
fn classify_mysql_signal(
    code: Option<u32>,
    message: &str,
    config: &ConnectionConfig,
) -> (ConnectionErrorKind, String) {
    match code {
        Some(ER_ACCESS_DENIED) => (
            ConnectionErrorKind::AuthenticationFailure,
            format!("access denied for the supplied credentials ({message})"),
        ),
        Some(ER_BAD_DB) => (
            ConnectionErrorKind::DatabaseNotFound,
            format!("unknown database '{}' ({message})", config.database),
        ),
        Some(ER_CONN_HOST) => (
            ConnectionErrorKind::ConnectionRefusedOrTimeout,
            format!(
                "cannot reach server at {}:{} ({message})",
                config.host, config.port
            ),
        ),
        Some(other) => (
            ConnectionErrorKind::GenericConnectionFailure,
            format!("{message} (code: {other})"),
        ),
        None if message.contains("timed out") || message.contains("Connection refused") => (
            ConnectionErrorKind::ConnectionRefusedOrTimeout,
            format!(
                "cannot reach server at {}:{} ({message})",
                config.host, config.port
            ),
        ),
        None => (
            ConnectionErrorKind::GenericConnectionFailure,
            message.to_string(),
        ),
    }
}

/// Prefixes the raw version banner with the vendor it reveals.
fn banner_with_vendor(banner: &str) -> String {
    if banner.to_lowercase().contains("mariadb") {
        format!("MariaDB {banner}")
    } else {
        format!("MySQL {banner}")
    }
}

/// Packages a driver row into a [`RawRow`] without renaming labels.
fn raw_from_mysql_row(row: &MySqlRow) -> RawRow {
    let mut raw = RawRow::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<String>, _>(i) {
            v.map_or(Value::Null, Value::String)
        } else if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map_or(Value::Null, Value::from)
        } else if let Ok(v) = row.try_get::<Option<u64>, _>(i) {
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

#[async_trait]
impl DatabaseBackend for MySqlBackend {
    fn engine_name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        let options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .password(&self.config.password)
            .database(&self.config.database)
            .charset("utf8mb4");

        tracing::debug!("Connecting to MySQL at {}:{}", self.config.host, self.config.port);

        let connect = MySqlConnection::connect_with(&options);
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
                tracing::debug!("Ignoring error while closing MySQL connection: {e}");
            }
        }
        self.connected = false;
    }

    async fn test_connection(&mut self) -> Result<bool> {
        let context = self.context();
        let conn = self.conn_mut()?;
        let probe: i64 = sqlx::query_scalar("SELECT 1 AS test")
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
        let sql = "SELECT VERSION() AS version";
        let conn = self.conn_mut()?;
        let banner: String = sqlx::query_scalar(sql)
            .fetch_one(conn)
            .await
            .map_err(|e| DbSpecError::query_failed(sql, e.to_string()))?;
        Ok(banner_with_vendor(&banner))
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
            Ok(QueryOutput::Rows(
                rows.iter().map(raw_from_mysql_row).collect(),
            ))
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
                CAST(TABLE_NAME AS CHAR) AS table_name,
                CAST(TABLE_COMMENT AS CHAR) AS table_comment
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ?
              AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
            ORDER BY TABLE_NAME
        "#;
        self.fetch_raw_rows(sql, true).await
    }

    async fn tables_info(&mut self) -> Result<Vec<RawRow>> {
        let sql = r#"
            SELECT
                CAST(t.TABLE_NAME AS CHAR) AS TABLE_NAME,
                CAST(t.TABLE_COMMENT AS CHAR) AS TABLE_COMMENT,
                c.ORDINAL_POSITION AS ORDINAL_POSITION,
                CAST(c.COLUMN_NAME AS CHAR) AS COLUMN_NAME,
                CAST(c.COLUMN_TYPE AS CHAR) AS COLUMN_TYPE,
                CAST(c.COLUMN_DEFAULT AS CHAR) AS COLUMN_DEFAULT,
                CAST(c.IS_NULLABLE AS CHAR) AS IS_NULLABLE,
                CAST(c.COLUMN_KEY AS CHAR) AS COLUMN_KEY,
                CAST(c.EXTRA AS CHAR) AS EXTRA,
                CAST(c.COLUMN_COMMENT AS CHAR) AS COLUMN_COMMENT
            FROM INFORMATION_SCHEMA.TABLES t
            JOIN INFORMATION_SCHEMA.COLUMNS c
              ON t.TABLE_NAME = c.TABLE_NAME
             AND t.TABLE_SCHEMA = c.TABLE_SCHEMA
            WHERE t.TABLE_SCHEMA = ?
              AND t.TABLE_TYPE IN ('BASE TABLE', 'VIEW')
            ORDER BY t.TABLE_NAME, c.ORDINAL_POSITION
        "#;
        self.fetch_raw_rows(sql, true).await
    }

    async fn foreign_keys_info(&mut self) -> Result<Vec<RawRow>> {
        let sql = r#"
            SELECT
                CAST(TABLE_NAME AS CHAR) AS TABLE_NAME,
                CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME,
                CAST(REFERENCED_TABLE_NAME AS CHAR) AS REFERENCED_TABLE_NAME,
                CAST(REFERENCED_COLUMN_NAME AS CHAR) AS REFERENCED_COLUMN_NAME,
                CAST(CONSTRAINT_NAME AS CHAR) AS CONSTRAINT_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ?
              AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY TABLE_NAME, COLUMN_NAME
        "#;
        self.fetch_raw_rows(sql, true).await
    }

    async fn indexes_info(&mut self) -> Result<Vec<RawRow>> {
        let sql = r#"
            SELECT
                CAST(TABLE_NAME AS CHAR) AS TABLE_NAME,
                CAST(INDEX_NAME AS CHAR) AS INDEX_NAME,
                NON_UNIQUE AS NON_UNIQUE,
                CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME,
                SEQ_IN_INDEX AS SEQ_IN_INDEX
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ?
              AND INDEX_NAME != 'PRIMARY'
            ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX
        "#;
        self.fetch_raw_rows(sql, true).await
    }
}
