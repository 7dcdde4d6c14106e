//! Pure normalization of heterogeneous catalog rows.
//!
//! Each engine's introspection queries label the same logical fields with a
//! different vocabulary (UPPER, lower, and legacy aliases). Every canonical
//! field has an exhaustive candidate-key list; resolution takes the first
//! present, non-null candidate. Absent fields get the declared empty default,
//! never null.

use std::collections::HashMap;

use serde_json::Value;

use crate::backends::row::RawRow;
use crate::models::{
    IndexColumnEntry, IndexGroup, NormalizedColumn, NormalizedForeignKey, NormalizedIndex,
    Nullable,
};

const TABLE_NAME_KEYS: &[&str] = &["table_name", "TABLE_NAME"];
const TABLE_COMMENT_KEYS: &[&str] = &["comment", "table_comment", "TABLE_COMMENT"];
const COLUMN_POSITION_KEYS: &[&str] = &[
    "NO",
    "no",
    "column_position",
    "ordinal_position",
    "ORDINAL_POSITION",
];
const COLUMN_NAME_KEYS: &[&str] = &["column_name", "COLUMN_NAME"];
const DATA_TYPE_KEYS: &[&str] = &["TYPE", "type", "data_type", "column_type", "COLUMN_TYPE"];
const DEFAULT_VALUE_KEYS: &[&str] = &[
    "DEFAULT_VALUE",
    "default_value",
    "column_default",
    "COLUMN_DEFAULT",
];
const NULLABLE_KEYS: &[&str] = &["NULLABLE", "nullable", "is_nullable", "IS_NULLABLE"];
const KEY_TYPE_KEYS: &[&str] = &["KEY_TYPE", "key_type", "column_key", "COLUMN_KEY"];
const EXTRA_KEYS: &[&str] = &["EXTRA", "extra", "AUTO_INCREMENT"];
const COLUMN_COMMENT_KEYS: &[&str] = &["column_comment", "COLUMN_COMMENT"];

const REFERENCED_TABLE_KEYS: &[&str] = &["referenced_table_name", "REFERENCED_TABLE_NAME"];
const REFERENCED_COLUMN_KEYS: &[&str] = &["referenced_column_name", "REFERENCED_COLUMN_NAME"];
const CONSTRAINT_NAME_KEYS: &[&str] = &["constraint_name", "CONSTRAINT_NAME"];

const INDEX_NAME_KEYS: &[&str] = &["index_name", "INDEX_NAME"];
const NON_UNIQUE_KEYS: &[&str] = &["non_unique", "NON_UNIQUE"];
const SEQ_IN_INDEX_KEYS: &[&str] = &["seq_in_index", "SEQ_IN_INDEX"];

/// Resolves a canonical field: first present, non-null candidate key wins.
pub fn resolve<'a>(row: &'a RawRow, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|key| row.value(key))
        .find(|value| !value.is_null())
}

fn resolve_string(row: &RawRow, candidates: &[&str]) -> String {
    resolve(row, candidates).map(text_of).unwrap_or_default()
}

fn resolve_u32(row: &RawRow, candidates: &[&str]) -> u32 {
    match resolve(row, candidates) {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Renders a JSON scalar as display text; non-scalars render empty.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Collapses an engine nullability token to the two-valued form.
///
/// Unknown or missing tokens lean permissive (`Yes`).
pub fn normalize_nullable(value: Option<&Value>) -> Nullable {
    let token = match value {
        Some(v) => text_of(v).trim().to_uppercase(),
        None => return Nullable::Yes,
    };
    match token.as_str() {
        "N" | "NO" | "FALSE" | "0" => Nullable::No,
        _ => Nullable::Yes,
    }
}

/// Collapses an engine key classification to the canonical `PRI`/`MUL`/`UNI`
/// vocabulary; empty stays empty, unrecognized literals pass through
/// uppercased.
pub fn normalize_key_type(value: Option<&Value>) -> String {
    let token = match value {
        Some(v) => text_of(v).trim().to_uppercase(),
        None => return String::new(),
    };
    match token.as_str() {
        "" => String::new(),
        "PRI" | "PRIMARY" | "P" => "PRI".to_string(),
        "MUL" | "FOREIGN" | "F" | "R" => "MUL".to_string(),
        "UNI" | "UNIQUE" | "U" => "UNI".to_string(),
        other => other.to_string(),
    }
}

/// Missing or null uniqueness reads as `false` (unique), matching the
/// zero default the engines report for unique indexes.
fn non_unique_of(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() != Some(0),
        Some(Value::String(s)) => !matches!(s.trim().to_lowercase().as_str(), "" | "0" | "false"),
        _ => false,
    }
}

/// Normalizes raw (table, column) rows into canonical column descriptors.
pub fn normalize_columns(rows: &[RawRow]) -> Vec<NormalizedColumn> {
    rows.iter()
        .map(|row| NormalizedColumn {
            table_name: resolve_string(row, TABLE_NAME_KEYS),
            table_comment: resolve_string(row, TABLE_COMMENT_KEYS),
            column_position: resolve_u32(row, COLUMN_POSITION_KEYS),
            column_name: resolve_string(row, COLUMN_NAME_KEYS),
            data_type: resolve_string(row, DATA_TYPE_KEYS),
            default_value: resolve_string(row, DEFAULT_VALUE_KEYS),
            nullable: normalize_nullable(resolve(row, NULLABLE_KEYS)),
            key_type: normalize_key_type(resolve(row, KEY_TYPE_KEYS)),
            extra: resolve_string(row, EXTRA_KEYS),
            column_comment: resolve_string(row, COLUMN_COMMENT_KEYS),
        })
        .collect()
}

/// Normalizes raw foreign-key rows.
pub fn normalize_foreign_keys(rows: &[RawRow]) -> Vec<NormalizedForeignKey> {
    rows.iter()
        .map(|row| NormalizedForeignKey {
            table_name: resolve_string(row, TABLE_NAME_KEYS),
            column_name: resolve_string(row, COLUMN_NAME_KEYS),
            referenced_table_name: resolve_string(row, REFERENCED_TABLE_KEYS),
            referenced_column_name: resolve_string(row, REFERENCED_COLUMN_KEYS),
            constraint_name: resolve_string(row, CONSTRAINT_NAME_KEYS),
        })
        .collect()
}

/// Normalizes raw (index, column) rows.
///
/// Rows that resolve to an empty table name or index name are dropped
/// silently; they cannot be grouped.
pub fn normalize_indexes(rows: &[RawRow]) -> Vec<NormalizedIndex> {
    rows.iter()
        .filter_map(|row| {
            let table_name = resolve_string(row, TABLE_NAME_KEYS);
            let index_name = resolve_string(row, INDEX_NAME_KEYS);
            if table_name.is_empty() || index_name.is_empty() {
                return None;
            }
            Some(NormalizedIndex {
                table_name,
                index_name,
                column_name: resolve_string(row, COLUMN_NAME_KEYS),
                seq_in_index: resolve_u32(row, SEQ_IN_INDEX_KEYS),
                non_unique: non_unique_of(resolve(row, NON_UNIQUE_KEYS)),
            })
        })
        .collect()
}

/// Normalizes raw table rows into sequentially numbered summaries.
pub fn normalize_table_summaries(rows: &[RawRow]) -> Vec<crate::models::TableSummary> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| crate::models::TableSummary {
            no: i + 1,
            table_name: resolve_string(row, TABLE_NAME_KEYS),
            table_comment: resolve_string(row, TABLE_COMMENT_KEYS),
        })
        .collect()
}

/// Groups flat index rows into logical indexes.
///
/// Groups appear in the first-seen order of `(table_name, index_name)`;
/// members are ordered by `seq_in_index`. Uniqueness is derived per group:
/// any member marked unique makes the group unique, so the result does not
/// depend on row order within a group.
pub fn group_indexes(rows: &[NormalizedIndex]) -> Vec<IndexGroup> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<&NormalizedIndex>> = HashMap::new();

    for row in rows {
        let key = (row.table_name.clone(), row.index_name.clone());
        let members = groups.entry(key.clone()).or_default();
        if members.is_empty() {
            order.push(key);
        }
        members.push(row);
    }

    order
        .into_iter()
        .map(|key| {
            let mut members = groups.remove(&key).unwrap_or_default();
            members.sort_by_key(|m| m.seq_in_index);
            let non_unique = members.iter().all(|m| m.non_unique);
            let (table_name, index_name) = key;
            IndexGroup {
                table_name,
                index_name,
                non_unique,
                columns: members
                    .into_iter()
                    .map(|m| IndexColumnEntry {
                        column_name: m.column_name.clone(),
                        seq_in_index: m.seq_in_index,
                    })
                    .collect(),
            }
        })
        .collect()
}
