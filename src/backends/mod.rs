//! Per-engine connection backends behind a uniform capability contract.
//!
//! Every backend satisfies [`DatabaseBackend`]: the same fixed method set,
//! issuing dialect-specific introspection queries underneath. The factory
//! maps an engine identifier to the matching variant; MariaDB reuses the
//! MySQL backend.
//!
//! # Module Structure
//! - `config`: [`ConnectionConfig`] and engine-specific knobs
//! - `row`: [`RawRow`] and [`QueryOutput`] boundary types
//! - `bridge`: process-wide Oracle bridge contract and registry
//! - Engine modules: `mysql`, `postgres`, `oracle`

use async_trait::async_trait;

use crate::error::{DbSpecError, Result};
use crate::models::DatabaseEngine;

pub mod bridge;
pub mod config;
pub mod row;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgresql")]
pub mod postgres;

pub mod oracle;

pub use config::{ConnectionConfig, FallbackPolicy, OracleConnect};
pub use row::{QueryOutput, RawRow};

/// Capability contract implemented by every engine backend.
///
/// A backend owns one connection handle exclusively; the handle is created by
/// `connect()` and destroyed by `disconnect()` within a single collection
/// operation. Backends are never shared across concurrent operations.
///
/// # Object Safety
/// The trait is object-safe; the factory hands out `Box<dyn DatabaseBackend>`.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// User-facing engine name ("MySQL/MariaDB", "PostgreSQL", "Oracle").
    fn engine_name(&self) -> &'static str;

    /// Whether a live handle is currently held.
    fn is_connected(&self) -> bool;

    /// Establishes the connection handle.
    ///
    /// Sets the connected flag only on success. Failures are classified into
    /// the [`crate::error::ConnectionErrorKind`] taxonomy using
    /// engine-specific signals; raw driver errors never escape this call.
    ///
    /// # Errors
    /// Returns a classified `DbSpecError::Connection`.
    async fn connect(&mut self) -> Result<()>;

    /// Releases the connection handle.
    ///
    /// Idempotent. Errors from the underlying close are logged and ignored;
    /// the connected flag is cleared unconditionally.
    async fn disconnect(&mut self);

    /// Issues a trivial round-trip query and returns whether it succeeded.
    ///
    /// # Errors
    /// Any failure during probing surfaces as a connection error rather than
    /// being silently converted to `false`.
    async fn test_connection(&mut self) -> Result<bool>;

    /// Fetches the engine version banner.
    ///
    /// # Errors
    /// Returns a query error when the version query fails; callers that
    /// want best-effort semantics degrade to `"Unknown"` themselves.
    async fn fetch_version(&mut self) -> Result<String>;

    /// Executes a statement.
    ///
    /// Read statements yield [`QueryOutput::Rows`]; non-read statements
    /// yield [`QueryOutput::Affected`].
    ///
    /// # Errors
    /// Returns `DbSpecError::Query` carrying the statement text.
    async fn execute_query(&mut self, sql: &str, params: &[&str]) -> Result<QueryOutput>;

    /// One row per table/view: name and comment only, ordered by name.
    ///
    /// # Errors
    /// Returns `DbSpecError::Query` on introspection failure.
    async fn tables_basic_info(&mut self) -> Result<Vec<RawRow>>;

    /// One row per (table, column): full column descriptor, ordered by
    /// table name then column position.
    ///
    /// # Errors
    /// Returns `DbSpecError::Query` on introspection failure.
    async fn tables_info(&mut self) -> Result<Vec<RawRow>>;

    /// One row per foreign-key column mapping, ordered by table then column.
    ///
    /// # Errors
    /// Returns `DbSpecError::Query` on introspection failure.
    async fn foreign_keys_info(&mut self) -> Result<Vec<RawRow>>;

    /// One row per (index, column) pair including uniqueness and sequence,
    /// excluding the primary-key-backed index; ordered by table, index,
    /// sequence.
    ///
    /// # Errors
    /// Returns `DbSpecError::Query` on introspection failure.
    async fn indexes_info(&mut self) -> Result<Vec<RawRow>>;
}

impl std::fmt::Debug for dyn DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseBackend")
            .field("engine", &self.engine_name())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builds the backend variant matching the configured engine.
///
/// MariaDB reuses the MySQL backend; the Oracle backend additionally reads
/// the connect discriminator from the config (defaulted to service name).
///
/// # Errors
/// Returns a configuration error when the config fails validation, or
/// `UnsupportedDatabase` when the required driver feature is compiled out.
pub fn create_backend(config: &ConnectionConfig) -> Result<Box<dyn DatabaseBackend>> {
    config.validate()?;

    match config.engine {
        #[cfg(feature = "mysql")]
        DatabaseEngine::MySql | DatabaseEngine::MariaDb => {
            Ok(Box::new(mysql::MySqlBackend::new(config.clone())))
        }
        #[cfg(not(feature = "mysql"))]
        DatabaseEngine::MySql | DatabaseEngine::MariaDb => Err(DbSpecError::UnsupportedDatabase {
            dbms: config.engine.to_string(),
        }),
        #[cfg(feature = "postgresql")]
        DatabaseEngine::PostgreSql => Ok(Box::new(postgres::PostgresBackend::new(config.clone()))),
        #[cfg(not(feature = "postgresql"))]
        DatabaseEngine::PostgreSql => Err(DbSpecError::UnsupportedDatabase {
            dbms: config.engine.to_string(),
        }),
        DatabaseEngine::Oracle => Ok(Box::new(oracle::OracleBackend::new(config.clone()))),
    }
}

/// Builds a backend from a free-form engine identifier.
///
/// Convenience for callers that collect the engine name as text; the
/// identifier must match one of [`supported_engines`] exactly.
///
/// # Errors
/// Returns `UnsupportedDatabase` naming the offending identifier.
pub fn create_backend_by_name(
    dbms: &str,
    config: &ConnectionConfig,
) -> Result<Box<dyn DatabaseBackend>> {
    let engine = DatabaseEngine::parse(dbms).ok_or_else(|| DbSpecError::UnsupportedDatabase {
        dbms: dbms.to_string(),
    })?;
    let mut config = config.clone();
    config.engine = engine;
    create_backend(&config)
}

/// The supported engine identifiers, in canonical order.
pub fn supported_engines() -> Vec<&'static str> {
    vec!["MySQL", "MariaDB", "PostgreSQL", "Oracle"]
}

/// Whether `dbms` names a supported engine. Case-sensitive.
pub fn is_supported(dbms: &str) -> bool {
    DatabaseEngine::parse(dbms).is_some()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(engine: DatabaseEngine) -> ConnectionConfig {
        ConnectionConfig::new(engine, "localhost", 5432, "appdb", "app", "pw")
    }

    #[test]
    fn every_supported_engine_constructs() {
        for engine in DatabaseEngine::ALL {
            let backend = create_backend(&config(engine)).unwrap();
            assert!(!backend.is_connected());
        }
    }

    #[test]
    fn mariadb_reuses_mysql_backend() {
        let backend = create_backend(&config(DatabaseEngine::MariaDb)).unwrap();
        assert_eq!(backend.engine_name(), "MySQL/MariaDB");
    }

    #[test]
    fn unknown_identifier_is_unsupported() {
        let err = create_backend_by_name("SQLite", &config(DatabaseEngine::MySql)).unwrap_err();
        match err {
            DbSpecError::UnsupportedDatabase { dbms } => assert_eq!(dbms, "SQLite"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn supported_set_membership() {
        assert_eq!(
            supported_engines(),
            vec!["MySQL", "MariaDB", "PostgreSQL", "Oracle"]
        );
        assert!(is_supported("MariaDB"));
        assert!(!is_supported("mariadb"));
        assert!(!is_supported("MongoDB"));
    }

    #[test]
    fn invalid_config_is_rejected_before_construction() {
        let mut cfg = config(DatabaseEngine::PostgreSql);
        cfg.port = 0;
        assert!(create_backend(&cfg).is_err());
    }
}
