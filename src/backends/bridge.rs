//! Process-wide Oracle bridge contract.
//!
//! Oracle is reached through an embedded cross-runtime bridge rather than a
//! native driver. The core only depends on a query-execute/result-rows
//! contract: a host application installs an [`OracleBridge`] implementation
//! once, and the Oracle backend opens short-lived sessions through it.
//!
//! The bridge is a process-lifetime resource: installation is idempotent
//! (first install wins, later installs are no-ops), it is reused across
//! repeated connect/disconnect cycles, and there is deliberately no teardown
//! API — the bridge lives until process exit. Per-operation logic must never
//! manage the bridge lifecycle.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use thiserror::Error;

use super::row::RawRow;

/// Error raised by a bridge implementation.
///
/// Oracle signals failures through `ORA-NNNNN` codes embedded in exception
/// text; [`BridgeError::ora_code`] extracts the code for classification.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BridgeError {
    /// The bridge-side failure text, original message preserved.
    pub message: String,
}

impl BridgeError {
    /// Creates a bridge error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts an `ORA-NNNNN` code from the message, if one is embedded.
    pub fn ora_code(&self) -> Option<String> {
        let upper = self.message.to_uppercase();
        let start = upper.find("ORA-")?;
        let digits: String = upper[start + 4..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            None
        } else {
            Some(format!("ORA-{digits}"))
        }
    }
}

/// Convenience alias for bridge results.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// One live bridge session, owned by a single backend for one operation.
#[async_trait]
pub trait BridgeSession: Send + Sync {
    /// Executes a read statement and returns its rows.
    ///
    /// Column labels are lowercased by the bridge before packaging, matching
    /// the driver-level metadata convention.
    ///
    /// # Errors
    /// Returns a bridge error with the original message preserved.
    async fn execute(&mut self, sql: &str) -> BridgeResult<Vec<RawRow>>;

    /// Executes a non-read statement and returns the affected-row count.
    ///
    /// # Errors
    /// Returns a bridge error with the original message preserved.
    async fn execute_update(&mut self, sql: &str) -> BridgeResult<u64>;

    /// Bulk driver-level scan of column defaults for the whole schema.
    ///
    /// Defaults cannot be read in the same result set as other column
    /// metadata (long-text type conflict in the engine), so they are
    /// collected in one pass keyed by `TABLE.COLUMN` (uppercased) and
    /// spliced into the primary introspection result afterwards.
    ///
    /// # Errors
    /// Returns a bridge error; callers treat a failed scan as an empty map.
    async fn column_defaults(&mut self, owner: &str) -> BridgeResult<HashMap<String, String>>;

    /// Closes the session. Close failures are reported but backends log and
    /// ignore them.
    ///
    /// # Errors
    /// Returns a bridge error when the underlying close fails.
    async fn close(&mut self) -> BridgeResult<()>;
}

/// The installed cross-runtime execution environment.
#[async_trait]
pub trait OracleBridge: Send + Sync {
    /// Opens a session against `descriptor` (`host:port:db` or
    /// `host:port/db`) with the given credentials.
    ///
    /// # Errors
    /// Returns a bridge error whose message carries any `ORA-` code the
    /// engine reported.
    async fn open_session(
        &self,
        descriptor: &str,
        username: &str,
        password: &str,
    ) -> BridgeResult<Box<dyn BridgeSession>>;

    /// Short description of the bridge runtime, for diagnostics.
    fn runtime_banner(&self) -> String;
}

static BRIDGE: OnceLock<Arc<dyn OracleBridge>> = OnceLock::new();

/// Installs the process-wide bridge.
///
/// Idempotent: the first install wins and returns `true`; later calls leave
/// the existing bridge in place and return `false`. Concurrent installs are
/// safe; losers observe the winner's bridge.
pub fn install_bridge(bridge: Arc<dyn OracleBridge>) -> bool {
    let installed = BRIDGE.set(bridge).is_ok();
    if installed {
        tracing::info!("Oracle bridge installed");
    } else {
        tracing::debug!("Oracle bridge already installed; install request ignored");
    }
    installed
}

/// Returns the installed bridge, if any.
pub fn bridge() -> Option<Arc<dyn OracleBridge>> {
    BRIDGE.get().cloned()
}
