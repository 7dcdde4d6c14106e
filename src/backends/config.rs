//! Connection configuration for one collection operation.
//!
//! The password is held for the duration of a connect call but is masked in
//! `Debug` output and skipped during serialization; it never reaches logs or
//! error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DbSpecError, Result};
use crate::models::DatabaseEngine;

/// How the Oracle connect descriptor names the target database.
///
/// The discriminator changes both the descriptor shape (`host:port:db` for a
/// SID, `host:port/db` for a service name) and schema-resolution semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleConnect {
    /// Connect by service name (the default).
    #[default]
    ServiceName,
    /// Connect by SID.
    Sid,
}

/// What the PostgreSQL backend does when the decorated column query fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackPolicy {
    /// Retry with a reduced query without comments or key classification;
    /// partial degradation is preferred to total failure (the default).
    #[default]
    Degrade,
    /// Propagate the original error.
    Fail,
}

/// Caller-supplied, immutable parameters for one connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Target engine.
    pub engine: DatabaseEngine,
    /// Server host.
    pub host: String,
    /// Server port, in `[1, 65535]`.
    pub port: u16,
    /// Database or schema name.
    pub database: String,
    /// Connecting username.
    pub username: String,
    /// Password; masked in Debug, never serialized.
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Connect-phase timeout. The only caller-facing cancellation knob;
    /// once connected, queries run to completion.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Oracle connect-descriptor discriminator; ignored by other engines.
    #[serde(default)]
    pub oracle_connect: OracleConnect,
    /// PostgreSQL degraded-query policy; ignored by other engines.
    #[serde(default)]
    pub postgres_fallback: FallbackPolicy,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ConnectionConfig {
    /// Creates a config with the default timeout and engine-specific knobs.
    pub fn new(
        engine: DatabaseEngine,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            connect_timeout: default_connect_timeout(),
            oracle_connect: OracleConnect::default(),
            postgres_fallback: FallbackPolicy::default(),
        }
    }

    /// Builder method to set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the Oracle connect discriminator.
    pub fn with_oracle_connect(mut self, oracle_connect: OracleConnect) -> Self {
        self.oracle_connect = oracle_connect;
        self
    }

    /// Builder method to set the PostgreSQL fallback policy.
    pub fn with_postgres_fallback(mut self, policy: FallbackPolicy) -> Self {
        self.postgres_fallback = policy;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns a configuration error when the host or database is empty,
    /// the port is zero, or the connect timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(DbSpecError::configuration("host cannot be empty"));
        }
        if self.port == 0 {
            return Err(DbSpecError::configuration("port must be in [1, 65535]"));
        }
        if self.database.is_empty() {
            return Err(DbSpecError::configuration("database cannot be empty"));
        }
        if self.connect_timeout.is_zero() {
            return Err(DbSpecError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Returns the password masked to its length, for display purposes.
    pub fn masked_password(&self) -> String {
        "*".repeat(self.password.len())
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"****")
            .field("connect_timeout", &self.connect_timeout)
            .field("oracle_connect", &self.oracle_connect)
            .field("postgres_fallback", &self.postgres_fallback)
            .finish()
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never include credentials.
        write!(
            f,
            "{}://{}:{}/{}",
            self.engine, self.host, self.port, self.database
        )
    }
}
