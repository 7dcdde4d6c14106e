//! Core database metadata collection library.
//!
//! This crate connects to MySQL/MariaDB, PostgreSQL, and Oracle targets,
//! introspects their catalogs, and normalizes the results into a single
//! canonical model regardless of source engine. Oracle is reached through an
//! embedded cross-runtime bridge installed by the host application rather
//! than a native driver.
//!
//! # Security Guarantees
//! - Passwords never appear in `Debug`/`Display` output or serialized config
//! - All database operations are read-only introspection
//! - Driver errors are reclassified before they cross the API boundary
//!
//! # Architecture
//! - Capability contract ([`backends::DatabaseBackend`]) with a factory per
//!   engine; MariaDB shares the MySQL backend
//! - Scoped connection lifecycle ([`manager::ConnectionManager`]):
//!   connect/operate/disconnect on every path
//! - Pure normalization layer ([`collector::normalize`]) mapping each
//!   engine's catalog vocabulary onto the canonical model

pub mod backends;
pub mod collector;
pub mod error;
pub mod logging;
pub mod manager;
pub mod models;

// Re-export commonly used types
pub use backends::{
    ConnectionConfig, DatabaseBackend, FallbackPolicy, OracleConnect, QueryOutput, RawRow,
    create_backend, create_backend_by_name, is_supported, supported_engines,
};
pub use backends::bridge::{BridgeError, BridgeSession, OracleBridge, install_bridge};
pub use collector::MetadataCollector;
pub use error::{ConnectionContext, ConnectionErrorKind, DbSpecError, Result};
pub use logging::init_logging;
pub use manager::ConnectionManager;
pub use models::{
    CollectionStatistics, ConnectionInfo, DatabaseEngine, DatabaseMetadata, IndexGroup,
    NormalizedColumn, NormalizedForeignKey, NormalizedIndex, Nullable, ProbeReport, TableListing,
    TableSummary,
};
