//! Oracle backend tests against an in-memory bridge implementation.
//!
//! The bridge registry is process-wide state, so the lifecycle assertions
//! (no bridge, first install, second install) run inside one sequential test.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use dbspec_core::backends::bridge::{
    BridgeError, BridgeResult, BridgeSession, OracleBridge, install_bridge,
};
use dbspec_core::backends::oracle::OracleBackend;
use dbspec_core::backends::row::RawRow;
use dbspec_core::backends::{ConnectionConfig, DatabaseBackend, OracleConnect};
use dbspec_core::{
    ConnectionErrorKind, ConnectionManager, DatabaseEngine, MetadataCollector, Nullable,
};

fn row(entries: &[(&str, Value)]) -> RawRow {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn config(password: &str) -> ConnectionConfig {
    ConnectionConfig::new(
        DatabaseEngine::Oracle,
        "orahost",
        1521,
        "ORCL",
        "scott",
        password,
    )
    .with_oracle_connect(OracleConnect::ServiceName)
}

/// Serves a one-table schema, dispatching on catalog markers in the SQL.
/// Labels are lowercase, matching the bridge packaging contract.
struct ScriptedSession;

#[async_trait]
impl BridgeSession for ScriptedSession {
    async fn execute(&mut self, sql: &str) -> BridgeResult<Vec<RawRow>> {
        if sql.contains("FROM dual") {
            return Ok(vec![row(&[("test_col", json!("TEST"))])]);
        }
        if sql.contains("v$version") {
            return Ok(vec![row(&[(
                "banner",
                json!("Oracle Database 19c Enterprise Edition Release 19.0.0.0.0"),
            )])]);
        }
        if sql.contains("user_tab_columns") {
            return Ok(vec![
                row(&[
                    ("table_name", json!("USERS")),
                    ("table_comment", json!("accounts")),
                    ("ordinal_position", json!(1)),
                    ("column_name", json!("ID")),
                    ("data_type", json!("NUMBER(10)")),
                    ("default_value", json!("")),
                    ("nullable", json!("N")),
                    ("key_type", json!("PRI")),
                    ("extra", json!("")),
                    ("column_comment", json!("")),
                ]),
                row(&[
                    ("table_name", json!("USERS")),
                    ("table_comment", json!("accounts")),
                    ("ordinal_position", json!(2)),
                    ("column_name", json!("STATUS")),
                    ("data_type", json!("VARCHAR2(20)")),
                    ("default_value", json!("")),
                    ("nullable", json!("Y")),
                    ("key_type", json!("")),
                    ("extra", json!("")),
                    ("column_comment", json!("")),
                ]),
            ]);
        }
        if sql.contains("user_ind_columns") {
            return Ok(Vec::new());
        }
        if sql.contains("user_cons_columns") {
            return Ok(Vec::new());
        }
        if sql.contains("user_tab_comments") {
            return Ok(vec![row(&[
                ("table_name", json!("USERS")),
                ("table_comment", json!("accounts")),
            ])]);
        }
        Err(BridgeError::new(format!("unexpected statement: {sql}")))
    }

    async fn execute_update(&mut self, _sql: &str) -> BridgeResult<u64> {
        Ok(0)
    }

    async fn column_defaults(&mut self, owner: &str) -> BridgeResult<HashMap<String, String>> {
        assert_eq!(owner, "SCOTT");
        Ok(HashMap::from([
            ("USERS.STATUS".to_string(), " 'ACTIVE' ".to_string()),
            ("USERS.ID".to_string(), "NULL".to_string()),
        ]))
    }

    async fn close(&mut self) -> BridgeResult<()> {
        Ok(())
    }
}

struct ScriptedBridge;

#[async_trait]
impl OracleBridge for ScriptedBridge {
    async fn open_session(
        &self,
        descriptor: &str,
        username: &str,
        password: &str,
    ) -> BridgeResult<Box<dyn BridgeSession>> {
        assert_eq!(descriptor, "orahost:1521/ORCL");
        if username != "scott" || password != "tiger" {
            return Err(BridgeError::new(
                "ORA-01017: invalid username/password; logon denied",
            ));
        }
        Ok(Box::new(ScriptedSession))
    }

    fn runtime_banner(&self) -> String {
        "scripted in-memory runtime".to_string()
    }
}

#[tokio::test]
async fn bridge_lifecycle_and_collection() {
    // Before any install, connecting must fail with a generic classified
    // error telling the embedder to install a bridge.
    let mut backend = OracleBackend::new(config("tiger"));
    let err = backend.connect().await.unwrap_err();
    assert_eq!(
        err.connection_kind(),
        Some(ConnectionErrorKind::GenericConnectionFailure)
    );
    assert!(err.to_string().contains("no Oracle bridge installed"));

    // First install wins; the second is a no-op.
    assert!(install_bridge(Arc::new(ScriptedBridge)));
    assert!(!install_bridge(Arc::new(ScriptedBridge)));

    // Full sweep through the installed bridge, with the bulk default pass
    // spliced in: the sentinel default collapses, the real one survives.
    let collector = MetadataCollector::new();
    let metadata = collector
        .collect_database_metadata_with(
            Box::new(OracleBackend::new(config("tiger"))),
            &config("tiger"),
            None,
        )
        .await
        .unwrap();

    assert_eq!(metadata.statistics.total_tables, 1);
    assert_eq!(metadata.statistics.total_columns, 2);
    assert!(metadata.connection_info.version.contains("19c"));

    let id = &metadata.columns[0];
    assert_eq!(id.column_name, "ID");
    assert_eq!(id.key_type, "PRI");
    assert_eq!(id.nullable, Nullable::No);
    assert_eq!(id.default_value, "");

    let status = &metadata.columns[1];
    assert_eq!(status.column_name, "STATUS");
    assert_eq!(status.default_value, "'ACTIVE'");
    assert_eq!(status.nullable, Nullable::Yes);

    // Rejected credentials surface as a classified authentication failure
    // inside a failure-shaped probe report.
    let manager = ConnectionManager::new();
    let report = manager
        .probe_backend(Box::new(OracleBackend::new(config("wrong"))), &config("wrong"))
        .await;
    assert!(!report.success);
    assert!(report.error.unwrap().contains("authentication failure"));

    // A clean probe through the same process-wide bridge still works.
    let report = manager
        .probe_backend(Box::new(OracleBackend::new(config("tiger"))), &config("tiger"))
        .await;
    assert!(report.success);
    assert!(report.version.unwrap().contains("Oracle Database"));
}
