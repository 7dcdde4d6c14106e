//! Structured error taxonomy for connection and introspection failures.
//!
//! Three unrelated wire protocols (MySQL wire, PostgreSQL wire, the Oracle
//! bridge) signal failures in incompatible ways: numeric driver codes, string
//! matching on messages, and `ORA-NNNNN` codes embedded in exception text.
//! Every backend reclassifies its driver errors into the tagged variants here
//! at the `connect()` boundary, so callers pattern-match on `kind` instead of
//! parsing error text. Raw driver error types never cross that boundary.

use thiserror::Error;

/// Category of a classified connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Credentials were rejected by the server (including locked accounts).
    AuthenticationFailure,
    /// The server is reachable but the named database/schema does not exist.
    DatabaseNotFound,
    /// The server could not be reached, or the connect-phase timeout elapsed.
    ConnectionRefusedOrTimeout,
    /// Anything the engine-specific classifier did not recognize; the
    /// original driver message is preserved.
    GenericConnectionFailure,
}

impl std::fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthenticationFailure => write!(f, "authentication failure"),
            Self::DatabaseNotFound => write!(f, "database not found"),
            Self::ConnectionRefusedOrTimeout => write!(f, "connection refused or timed out"),
            Self::GenericConnectionFailure => write!(f, "connection failure"),
        }
    }
}

/// Diagnostic context attached to every connection error.
///
/// Carries enough structure for a front end to render a useful message
/// without parsing error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    /// User-facing engine name ("MySQL/MariaDB", "PostgreSQL", "Oracle").
    pub dbms: String,
    /// Target host.
    pub host: String,
    /// Target port.
    pub port: u16,
    /// Target database or schema name.
    pub database: String,
}

impl std::fmt::Display for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}:{}/{}",
            self.dbms, self.host, self.port, self.database
        )
    }
}

/// Main error type for dbspec-core operations.
#[derive(Debug, Error)]
pub enum DbSpecError {
    /// The engine identifier is not one of the supported set.
    #[error("Unsupported DBMS: {dbms}")]
    UnsupportedDatabase {
        /// The offending identifier as supplied by the caller.
        dbms: String,
    },

    /// A classified connection failure.
    #[error("{context} {kind}: {message}")]
    Connection {
        /// Failure category, usable for pattern matching by callers.
        kind: ConnectionErrorKind,
        /// Engine, host, port and database of the attempted connection.
        context: ConnectionContext,
        /// Human-readable detail, original driver message preserved.
        message: String,
    },

    /// An introspection query failed after a successful connect.
    #[error("Query failed: {message}")]
    Query {
        /// The offending statement text.
        statement: String,
        /// Human-readable detail.
        message: String,
    },

    /// Invalid configuration supplied by the caller.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What was wrong with the configuration.
        message: String,
    },
}

/// Convenience alias for Results with [`DbSpecError`].
pub type Result<T> = std::result::Result<T, DbSpecError>;

impl DbSpecError {
    /// Creates a classified connection error.
    pub fn connection(
        kind: ConnectionErrorKind,
        context: ConnectionContext,
        message: impl Into<String>,
    ) -> Self {
        Self::Connection {
            kind,
            context,
            message: message.into(),
        }
    }

    /// Creates a query error carrying the offending statement.
    pub fn query_failed(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns the connection failure category, if this is a connection error.
    pub fn connection_kind(&self) -> Option<ConnectionErrorKind> {
        match self {
            Self::Connection { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ctx() -> ConnectionContext {
        ConnectionContext {
            dbms: "PostgreSQL".to_string(),
            host: "db.example.com".to_string(),
            port: 5432,
            database: "appdb".to_string(),
        }
    }

    #[test]
    fn connection_error_display_includes_context() {
        let err = DbSpecError::connection(
            ConnectionErrorKind::AuthenticationFailure,
            ctx(),
            "password authentication failed for user \"app\"",
        );
        let rendered = err.to_string();
        assert!(rendered.contains("PostgreSQL"));
        assert!(rendered.contains("db.example.com:5432/appdb"));
        assert!(rendered.contains("authentication failure"));
    }

    #[test]
    fn query_error_carries_statement() {
        let err = DbSpecError::query_failed("SELECT 1 FROM missing", "table not found");
        match err {
            DbSpecError::Query { statement, .. } => {
                assert_eq!(statement, "SELECT 1 FROM missing");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn connection_kind_accessor() {
        let err = DbSpecError::connection(
            ConnectionErrorKind::DatabaseNotFound,
            ctx(),
            "database \"appdb\" does not exist",
        );
        assert_eq!(
            err.connection_kind(),
            Some(ConnectionErrorKind::DatabaseNotFound)
        );
        assert!(
            DbSpecError::configuration("bad port")
                .connection_kind()
                .is_none()
        );
    }

    #[test]
    fn unsupported_database_names_identifier() {
        let err = DbSpecError::UnsupportedDatabase {
            dbms: "SQLite".to_string(),
        };
        assert!(err.to_string().contains("SQLite"));
    }
}
