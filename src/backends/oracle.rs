//! Oracle backend over the process-wide bridge.
//!
//! The connect descriptor shape depends on the configured discriminator:
//! `host:port:database` for a SID, `host:port/database` for a service name.
//! Schema resolution uses the uppercased username as the owner; catalog
//! object names are uppercased consistently before any key-based join.
//!
//! Column defaults cannot be read in the same result set as the rest of the
//! column metadata (long-text type conflict in the engine), so they are
//! collected in a separate bulk pass through driver-level metadata and
//! spliced into the primary introspection result by `TABLE.COLUMN` lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use super::bridge::{self, BridgeError, BridgeSession};
use super::config::{ConnectionConfig, OracleConnect};
use super::row::{QueryOutput, RawRow};
use super::DatabaseBackend;
use crate::error::{ConnectionContext, ConnectionErrorKind, DbSpecError, Result};

const ENGINE_NAME: &str = "Oracle";

const TABLES_INFO_QUERY: &str = r#"
    SELECT
        t.table_name AS table_name,
        NVL(tc.comments, '') AS table_comment,
        c.column_id AS ordinal_position,
        c.column_name AS column_name,
        CASE
            WHEN c.data_type IN ('VARCHAR2','CHAR','NVARCHAR2','NCHAR')
                THEN c.data_type || '(' || c.char_length || ')'
            WHEN c.data_type = 'NUMBER'
                AND c.data_precision IS NOT NULL
                AND c.data_scale IS NOT NULL
                THEN c.data_type || '(' || c.data_precision || ',' || c.data_scale || ')'
            WHEN c.data_type = 'NUMBER'
                AND c.data_precision IS NOT NULL
                THEN c.data_type || '(' || c.data_precision || ')'
            ELSE c.data_type
        END AS data_type,
        '' AS default_value,
        CASE WHEN c.nullable = 'Y' THEN 'Y' ELSE 'N' END AS nullable,
        NVL(k.key_type, '') AS key_type,
        '' AS extra,
        NVL(cc.comments, '') AS column_comment
    FROM (
        SELECT table_name FROM user_tables WHERE table_name NOT LIKE 'BIN$%'
        UNION ALL
        SELECT view_name AS table_name FROM user_views
    ) t
    JOIN user_tab_columns c ON c.table_name = t.table_name
    LEFT JOIN user_tab_comments tc ON tc.table_name = t.table_name
    LEFT JOIN user_col_comments cc
      ON cc.table_name = c.table_name AND cc.column_name = c.column_name
    LEFT JOIN (
        SELECT acc.table_name,
               acc.column_name,
               CASE ac.constraint_type
                   WHEN 'P' THEN 'PRI'
                   WHEN 'U' THEN 'UNI'
                   WHEN 'R' THEN 'MUL'
               END AS key_type
        FROM user_constraints ac
        JOIN user_cons_columns acc ON ac.constraint_name = acc.constraint_name
        WHERE ac.constraint_type IN ('P','U','R')
    ) k ON k.table_name = c.table_name AND k.column_name = c.column_name
    ORDER BY t.table_name, c.column_id
"#;

/// Oracle connection backend over an installed bridge session.
pub struct OracleBackend {
    config: ConnectionConfig,
    session: Option<Box<dyn BridgeSession>>,
    connected: bool,
}

impl OracleBackend {
    /// Creates an unconnected backend for the given target.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            session: None,
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

    fn descriptor(&self) -> String {
        connect_descriptor(&self.config)
    }

    fn session_mut(&mut self) -> Result<&mut Box<dyn BridgeSession>> {
        let context = self.context();
        self.session.as_mut().ok_or_else(|| {
            DbSpecError::connection(
                ConnectionErrorKind::GenericConnectionFailure,
                context,
                "not connected",
            )
        })
    }

    async fn run_query(&mut self, sql: &str) -> Result<Vec<RawRow>> {
        let session = self.session_mut()?;
        session
            .execute(sql)
            .await
            .map_err(|e| DbSpecError::query_failed(sql, e.message))
    }

    /// Bulk default-value pass. A failed scan degrades to an empty map so
    /// the primary introspection result survives without defaults.
    async fn collect_default_map(&mut self) -> HashMap<String, String> {
        let owner = self.config.username.to_uppercase();
        let session = match self.session_mut() {
            Ok(session) => session,
            Err(_) => return HashMap::new(),
        };
        match session.column_defaults(&owner).await {
            Ok(map) => map
                .into_iter()
                .map(|(key, value)| (key.to_uppercase(), clean_default(&value)))
                .collect(),
            Err(e) => {
                tracing::debug!("Bulk default-value scan failed; continuing without: {e}");
                HashMap::new()
            }
        }
    }
}

/// Builds the connect descriptor for the configured discriminator.
fn connect_descriptor(config: &ConnectionConfig) -> String {
    match config.oracle_connect {
        OracleConnect::Sid => format!("{}:{}:{}", config.host, config.port, config.database),
        OracleConnect::ServiceName => {
            format!("{}:{}/{}", config.host, config.port, config.database)
        }
    }
}

/// Maps a bridge failure to the connection error taxonomy using the
/// embedded `ORA-` code, falling back to message matching.
fn classify_bridge_error(error: &BridgeError) -> (ConnectionErrorKind, String) {
    let lower = error.message.to_lowercase();
    match error.ora_code().as_deref() {
        Some("ORA-28000") => (
            ConnectionErrorKind::AuthenticationFailure,
            format!("account is locked ({})", error.message),
        ),
        Some("ORA-01017") => (
            ConnectionErrorKind::AuthenticationFailure,
            format!("invalid username or password ({})", error.message),
        ),
        Some("ORA-12541") => (
            ConnectionErrorKind::ConnectionRefusedOrTimeout,
            format!("no listener at the target address ({})", error.message),
        ),
        _ if lower.contains("invalid username/password") => (
            ConnectionErrorKind::AuthenticationFailure,
            format!("invalid username or password ({})", error.message),
        ),
        _ if lower.contains("connection refused") => (
            ConnectionErrorKind::ConnectionRefusedOrTimeout,
            error.message.clone(),
        ),
        _ => (
            ConnectionErrorKind::GenericConnectionFailure,
            error.message.clone(),
        ),
    }
}

/// Normalizes a driver-reported default: trims whitespace and collapses the
/// sentinel values Oracle reports for "no default" to the empty string.
fn clean_default(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed {
        "NULL" | "null" | "''" | "\"\"" | "-" => String::new(),
        other => other.to_string(),
    }
}

/// Splices bulk-collected defaults into column rows by `TABLE.COLUMN` key.
fn splice_defaults(rows: &mut [RawRow], defaults: &HashMap<String, String>) {
    for row in rows {
        let table = row
            .value("table_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_uppercase();
        let column = row
            .value("column_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_uppercase();
        if table.is_empty() || column.is_empty() {
            continue;
        }
        let key = format!("{table}.{column}");
        let value = defaults.get(&key).cloned().unwrap_or_default();
        row.insert("default_value", Value::String(value));
    }
}

#[async_trait]
impl DatabaseBackend for OracleBackend {
    fn engine_name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        let Some(bridge) = bridge::bridge() else {
            return Err(DbSpecError::connection(
                ConnectionErrorKind::GenericConnectionFailure,
                self.context(),
                "no Oracle bridge installed; call install_bridge() during process startup",
            ));
        };

        if self.config.username.is_empty() || self.config.password.is_empty() {
            return Err(DbSpecError::connection(
                ConnectionErrorKind::AuthenticationFailure,
                self.context(),
                "username and password must not be empty",
            ));
        }

        let descriptor = self.descriptor();
        tracing::debug!(
            "Connecting to Oracle at {descriptor} via bridge ({})",
            bridge.runtime_banner()
        );

        let open = bridge.open_session(&descriptor, &self.config.username, &self.config.password);
        match tokio::time::timeout(self.config.connect_timeout, open).await {
            Ok(Ok(session)) => {
                self.session = Some(session);
                self.connected = true;
                Ok(())
            }
            Ok(Err(e)) => {
                let (kind, message) = classify_bridge_error(&e);
                Err(DbSpecError::connection(kind, self.context(), message))
            }
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
        // Closes the session only; the bridge itself is a process-lifetime
        // resource and is never torn down here.
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::debug!("Ignoring error while closing Oracle session: {e}");
            }
        }
        self.connected = false;
    }

    async fn test_connection(&mut self) -> Result<bool> {
        let context = self.context();
        let sql = "SELECT 'TEST' AS test_col FROM dual";
        let rows = self.run_query(sql).await.map_err(|e| {
            DbSpecError::connection(
                ConnectionErrorKind::GenericConnectionFailure,
                context,
                format!("connection probe failed: {e}"),
            )
        })?;
        Ok(rows
            .first()
            .and_then(|row| row.value("test_col"))
            .and_then(Value::as_str)
            == Some("TEST"))
    }

    async fn fetch_version(&mut self) -> Result<String> {
        let sql = "SELECT banner AS banner FROM v$version WHERE rownum = 1";
        let rows = self.run_query(sql).await?;
        Ok(rows
            .first()
            .and_then(|row| row.value("banner"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string())
    }

    async fn execute_query(&mut self, sql: &str, params: &[&str]) -> Result<QueryOutput> {
        if !params.is_empty() {
            return Err(DbSpecError::query_failed(
                sql,
                "the Oracle bridge does not support bind parameters",
            ));
        }
        let is_read = sql.trim_start().to_uppercase().starts_with("SELECT");
        if is_read {
            Ok(QueryOutput::Rows(self.run_query(sql).await?))
        } else {
            let session = self.session_mut()?;
            let affected = session
                .execute_update(sql)
                .await
                .map_err(|e| DbSpecError::query_failed(sql, e.message))?;
            Ok(QueryOutput::Affected(affected))
        }
    }

    async fn tables_basic_info(&mut self) -> Result<Vec<RawRow>> {
        let sql = r#"
            SELECT
                t.table_name AS table_name,
                NVL(tc.comments, '') AS table_comment
            FROM (
                SELECT table_name FROM user_tables WHERE table_name NOT LIKE 'BIN$%'
                UNION ALL
                SELECT view_name AS table_name FROM user_views
            ) t
            LEFT JOIN user_tab_comments tc ON tc.table_name = t.table_name
            ORDER BY t.table_name
        "#;
        self.run_query(sql).await
    }

    async fn tables_info(&mut self) -> Result<Vec<RawRow>> {
        let defaults = self.collect_default_map().await;
        let mut rows = self.run_query(TABLES_INFO_QUERY).await?;
        splice_defaults(&mut rows, &defaults);
        Ok(rows)
    }

    async fn foreign_keys_info(&mut self) -> Result<Vec<RawRow>> {
        let sql = r#"
            SELECT
                acc.table_name AS table_name,
                acc.column_name AS column_name,
                r_acc.table_name AS referenced_table_name,
                r_acc.column_name AS referenced_column_name,
                acc.constraint_name AS constraint_name
            FROM user_constraints ac
            JOIN user_cons_columns acc ON ac.constraint_name = acc.constraint_name
            JOIN user_cons_columns r_acc
              ON ac.r_constraint_name = r_acc.constraint_name
             AND acc.position = r_acc.position
            WHERE ac.constraint_type = 'R'
            ORDER BY acc.table_name, acc.column_name
        "#;
        self.run_query(sql).await
    }

    async fn indexes_info(&mut self) -> Result<Vec<RawRow>> {
        let sql = r#"
            SELECT
                ic.table_name AS table_name,
                ic.index_name AS index_name,
                CASE WHEN i.uniqueness = 'UNIQUE' THEN 0 ELSE 1 END AS non_unique,
                ic.column_name AS column_name,
                ic.column_position AS seq_in_index
            FROM user_indexes i
            JOIN user_ind_columns ic
              ON i.index_name = ic.index_name AND i.table_name = ic.table_name
            WHERE i.index_type = 'NORMAL'
              AND NOT EXISTS (
                  SELECT 1 FROM user_constraints uc
                  WHERE uc.constraint_name = i.index_name
                    AND uc.constraint_type = 'P'
              )
            ORDER BY ic.table_name, ic.index_name, ic.column_position
        "#;
        self.run_query(sql).await
    }
}
