//! Canonical data model for normalized schema metadata.
//!
//! These types are the single representation every backend's heterogeneous
//! catalog rows are normalized into. They are plain, ordered, serializable
//! structures with no embedded live resources, safe to hand across a process
//! boundary to a renderer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseEngine {
    /// MySQL (information_schema introspection).
    MySql,
    /// MariaDB; shares the MySQL backend, distinguished by version banner.
    MariaDb,
    /// PostgreSQL.
    PostgreSql,
    /// Oracle, reached through the embedded bridge.
    Oracle,
}

impl DatabaseEngine {
    /// All supported engines, in canonical order.
    pub const ALL: [Self; 4] = [Self::MySql, Self::MariaDb, Self::PostgreSql, Self::Oracle];

    /// Parses a user-facing engine identifier.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "MySQL" => Some(Self::MySql),
            "MariaDB" => Some(Self::MariaDb),
            "PostgreSQL" => Some(Self::PostgreSql),
            "Oracle" => Some(Self::Oracle),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MySql => write!(f, "MySQL"),
            Self::MariaDb => write!(f, "MariaDB"),
            Self::PostgreSql => write!(f, "PostgreSQL"),
            Self::Oracle => write!(f, "Oracle"),
        }
    }
}

/// Normalized nullability of a column.
///
/// Every engine vocabulary (`Y`/`N`, `YES`/`NO`, `TRUE`/`FALSE`, `1`/`0`)
/// collapses to exactly these two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Nullable {
    /// Column accepts NULL.
    #[serde(rename = "YES")]
    Yes,
    /// Column is NOT NULL.
    #[serde(rename = "NO")]
    No,
}

/// One normalized (table, column) row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedColumn {
    /// Owning table name.
    pub table_name: String,
    /// Table comment; empty string when absent, never null.
    pub table_comment: String,
    /// 1-based position of the column within its table.
    pub column_position: u32,
    /// Column name.
    pub column_name: String,
    /// Engine-rendered type string, e.g. `VARCHAR(50)` or `NUMBER(10,2)`.
    pub data_type: String,
    /// Column default; empty string when absent, never null.
    pub default_value: String,
    /// Normalized nullability.
    pub nullable: Nullable,
    /// Key classification: `PRI`, `MUL`, `UNI`, empty, or an
    /// engine-specific literal passed through unchanged.
    pub key_type: String,
    /// Free text such as an auto-increment marker.
    pub extra: String,
    /// Column comment; empty string when absent.
    pub column_comment: String,
}

/// One normalized foreign-key column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedForeignKey {
    /// Owning table.
    pub table_name: String,
    /// Owning column.
    pub column_name: String,
    /// Referenced table.
    pub referenced_table_name: String,
    /// Referenced column.
    pub referenced_column_name: String,
    /// Constraint name; empty string when absent.
    pub constraint_name: String,
}

/// One normalized (index, column) row as produced by a backend.
///
/// Rows with the same `(table_name, index_name)` form one logical index and
/// are orderable by `seq_in_index`; [`IndexGroup`] is the grouped form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedIndex {
    /// Owning table.
    pub table_name: String,
    /// Index name.
    pub index_name: String,
    /// Member column.
    pub column_name: String,
    /// 1-based position of the column within the index.
    pub seq_in_index: u32,
    /// `true` for an ordinary index, `false` for a unique index.
    pub non_unique: bool,
}

/// One column of a grouped index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumnEntry {
    /// Member column name.
    pub column_name: String,
    /// 1-based position within the index.
    pub seq_in_index: u32,
}

/// One logical index: flat rows grouped by `(table_name, index_name)` with
/// member columns ordered by sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexGroup {
    /// Owning table.
    pub table_name: String,
    /// Index name.
    pub index_name: String,
    /// `true` for an ordinary index, `false` for a unique index; derived
    /// once per group from any member row.
    pub non_unique: bool,
    /// Member columns ordered by `seq_in_index`.
    pub columns: Vec<IndexColumnEntry>,
}

/// Connection target and environment echoed into collection results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// User-facing engine name.
    pub dbms: String,
    /// Target host.
    pub host: String,
    /// Target port.
    pub port: u16,
    /// Target database or schema name.
    pub database: String,
    /// Connecting username.
    pub username: String,
    /// Engine version banner; `"Unknown"` when the fetch failed.
    pub version: String,
    /// When the collection ran.
    pub collected_at: DateTime<Utc>,
}

/// Summary counters for one collection operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStatistics {
    /// Distinct table count among the normalized column rows.
    pub total_tables: usize,
    /// Total normalized column rows (one per column, not per table).
    pub total_columns: usize,
    /// Total normalized foreign-key rows.
    pub total_foreign_keys: usize,
    /// Wall-clock duration of the whole operation in milliseconds.
    pub collection_duration_ms: u64,
}

/// Canonical output of a full collection, identical in shape regardless of
/// source engine. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    /// Connection target and engine version.
    pub connection_info: ConnectionInfo,
    /// Normalized column rows, ordered by table then position.
    pub columns: Vec<NormalizedColumn>,
    /// Normalized foreign keys, ordered by table then column.
    pub foreign_keys: Vec<NormalizedForeignKey>,
    /// Grouped indexes, first-seen order of `(table, index)`.
    pub indexes: Vec<IndexGroup>,
    /// Summary counters.
    pub statistics: CollectionStatistics,
}

/// Lightweight table projection for table-selection workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    /// Sequential 1-based number.
    pub no: usize,
    /// Table name.
    pub table_name: String,
    /// Table comment; empty string when absent.
    pub table_comment: String,
}

/// Output of the lightweight table-list collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableListing {
    /// Connection target and engine version.
    pub connection_info: ConnectionInfo,
    /// Sequentially numbered table summaries, ordered by name.
    pub tables: Vec<TableSummary>,
    /// Minimal statistics: table count and elapsed time.
    pub statistics: CollectionStatistics,
}

/// Structured outcome of a connectivity probe.
///
/// A failed probe is an expected, user-facing outcome; the manager converts
/// every failure into this shape instead of propagating an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// Whether the probe round-trip succeeded.
    pub success: bool,
    /// User-facing engine name.
    pub dbms: String,
    /// Engine version banner on success; best-effort, may be `"Unknown"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Failure message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Elapsed milliseconds from just before connect to result evaluation.
    pub connection_time_ms: u64,
    /// Echoed target host.
    pub host: String,
    /// Echoed target port.
    pub port: u16,
    /// Echoed target database.
    pub database: String,
}

impl ProbeReport {
    /// Builds a success-shaped report.
    pub fn success(
        dbms: impl Into<String>,
        version: impl Into<String>,
        connection_time_ms: u64,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            dbms: dbms.into(),
            version: Some(version.into()),
            error: None,
            connection_time_ms,
            host: host.into(),
            port,
            database: database.into(),
        }
    }

    /// Builds a failure-shaped report.
    pub fn failure(
        dbms: impl Into<String>,
        error: impl Into<String>,
        connection_time_ms: u64,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            dbms: dbms.into(),
            version: None,
            error: Some(error.into()),
            connection_time_ms,
            host: host.into(),
            port,
            database: database.into(),
        }
    }
}
