//! Scoped connection lifecycle management.
//!
//! The manager holds no connection state of its own; backends own their
//! handles. Its job is the lifecycle discipline: every operation runs inside
//! a connect/operate/disconnect scope, and disconnect runs on every exit
//! path — success, operation error, or probe failure.

use std::time::Instant;

use futures::future::BoxFuture;

use crate::backends::{self, ConnectionConfig, DatabaseBackend};
use crate::error::Result;
use crate::models::ProbeReport;

/// Stateless orchestrator of scoped backend operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionManager;

impl ConnectionManager {
    /// Creates a manager.
    pub fn new() -> Self {
        Self
    }

    /// Runs `op` against a connected backend, disconnecting afterwards.
    ///
    /// The backend is connected before `op` runs and disconnected after it
    /// returns, whether it succeeded or failed. A connect failure skips `op`
    /// entirely and surfaces as-is.
    ///
    /// # Errors
    /// Propagates the connect error or the operation's own error.
    pub async fn run_scoped<T>(
        &self,
        mut backend: Box<dyn DatabaseBackend>,
        op: impl for<'a> FnOnce(&'a mut dyn DatabaseBackend) -> BoxFuture<'a, Result<T>>,
    ) -> Result<T> {
        backend.connect().await?;
        let outcome = op(backend.as_mut()).await;
        backend.disconnect().await;
        outcome
    }

    /// Builds the backend for `config` and runs `op` inside a scope.
    ///
    /// # Errors
    /// Propagates factory, connect, or operation errors.
    pub async fn with_backend<T>(
        &self,
        config: &ConnectionConfig,
        op: impl for<'a> FnOnce(&'a mut dyn DatabaseBackend) -> BoxFuture<'a, Result<T>>,
    ) -> Result<T> {
        let backend = backends::create_backend(config)?;
        self.run_scoped(backend, op).await
    }

    /// Probes connectivity for `config` and reports the structured outcome.
    ///
    /// Never returns an error: configuration problems, connect failures and
    /// probe-query failures all land in a failure-shaped [`ProbeReport`].
    pub async fn test_connection(&self, config: &ConnectionConfig) -> ProbeReport {
        let started = Instant::now();
        match backends::create_backend(config) {
            Ok(backend) => self.probe_backend(backend, config).await,
            Err(e) => ProbeReport::failure(
                config.engine.to_string(),
                e.to_string(),
                elapsed_ms(started),
                config.host.clone(),
                config.port,
                config.database.clone(),
            ),
        }
    }

    /// Probes an already-constructed backend against its target.
    ///
    /// Timing covers connect through result evaluation. The report echoes
    /// the backend's own engine name ("MySQL/MariaDB" for either vendor).
    /// The version banner is best-effort: a failed fetch degrades to
    /// `"Unknown"` rather than failing the probe. The backend is always
    /// disconnected before the report is returned.
    pub async fn probe_backend(
        &self,
        mut backend: Box<dyn DatabaseBackend>,
        config: &ConnectionConfig,
    ) -> ProbeReport {
        let dbms = backend.engine_name().to_string();
        let started = Instant::now();

        if let Err(e) = backend.connect().await {
            backend.disconnect().await;
            return ProbeReport::failure(
                dbms,
                e.to_string(),
                elapsed_ms(started),
                config.host.clone(),
                config.port,
                config.database.clone(),
            );
        }

        let outcome = backend.test_connection().await;
        let report = match outcome {
            Ok(true) => {
                let version = match backend.fetch_version().await {
                    Ok(version) => version,
                    Err(e) => {
                        tracing::debug!("Version fetch failed during probe: {e}");
                        "Unknown".to_string()
                    }
                };
                ProbeReport::success(
                    dbms,
                    version,
                    elapsed_ms(started),
                    config.host.clone(),
                    config.port,
                    config.database.clone(),
                )
            }
            Ok(false) => ProbeReport::failure(
                dbms,
                "probe query returned an unexpected result",
                elapsed_ms(started),
                config.host.clone(),
                config.port,
                config.database.clone(),
            ),
            Err(e) => ProbeReport::failure(
                dbms,
                e.to_string(),
                elapsed_ms(started),
                config.host.clone(),
                config.port,
                config.database.clone(),
            ),
        };

        backend.disconnect().await;
        report
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
