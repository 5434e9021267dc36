//! Typed views over the catalog's JSON payloads.
//!
//! Field names differ between API versions, so each reader tries the known
//! spellings in order. Missing values become the `unknown` marker rather than
//! being guessed.

use serde_json::Value;

use crate::markup::strip_markup;
use crate::UNKNOWN;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSource {
    pub id: Option<i64>,
    pub name: String,
    pub db_type: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSummary {
    pub id: Option<i64>,
    pub name: String,
    pub data_source_id: Option<i64>,
    pub schema_name: String,
    pub table_type: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableDetail {
    pub name: String,
    pub description: String,
    pub owner: String,
    pub steward: String,
    pub certification: String,
    pub trust_status: String,
    pub last_updated: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub description: String,
    pub table_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lineage {
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
    pub transformation: String,
}

/// Treats a JSON array as a list of records and anything else as empty.
pub fn records(payload: &Value) -> &[Value] {
    payload.as_array().map(Vec::as_slice).unwrap_or(&[])
}

pub fn text(record: &Value, fields: &[&str]) -> String {
    fields
        .iter()
        .filter_map(|field| record.get(*field))
        .find_map(scalar_text)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn integer(record: &Value, field: &str) -> Option<i64> {
    match record.get(field)? {
        Value::Number(number) => number.as_i64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) if !raw.trim().is_empty() => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn description(record: &Value) -> String {
    strip_markup(&record.get("description").and_then(scalar_text).unwrap_or_default())
}

impl DataSource {
    pub fn from_record(record: &Value) -> Self {
        Self {
            id: integer(record, "id"),
            name: text(record, &["title", "name"]),
            db_type: text(record, &["dbtype", "db_type"]),
            description: description(record),
        }
    }
}

impl Schema {
    pub fn from_record(record: &Value) -> Self {
        Self { name: text(record, &["name"]), description: description(record) }
    }
}

impl TableSummary {
    pub fn from_record(record: &Value) -> Self {
        let schema_name = match text(record, &["schema_name"]) {
            name if name != UNKNOWN => name,
            _ => schema_from_key(&text(record, &["key"])),
        };
        Self {
            id: integer(record, "id"),
            name: text(record, &["name", "title"]),
            data_source_id: integer(record, "ds_id"),
            schema_name,
            table_type: text(record, &["table_type"]),
            description: description(record),
        }
    }
}

impl TableDetail {
    pub fn from_record(record: &Value) -> Self {
        let trust_flags = record.get("trust_flags").cloned().unwrap_or(Value::Null);
        Self {
            name: text(record, &["name"]),
            description: description(record),
            owner: text(record, &["owner"]),
            steward: text(record, &["steward"]),
            certification: text(&trust_flags, &["certification"]),
            trust_status: text(&trust_flags, &["endorsement"]),
            last_updated: text(record, &["ts_updated"]),
        }
    }
}

impl Column {
    pub fn from_record(record: &Value) -> Self {
        Self {
            name: text(record, &["name", "title"]),
            data_type: text(record, &["column_type", "data_type", "type"]),
            description: description(record),
            table_key: text(record, &["key"]),
        }
    }
}

impl Lineage {
    pub fn from_payload(payload: &Value) -> Self {
        let keys = |field: &str| -> Vec<String> {
            payload
                .get(field)
                .map(records)
                .unwrap_or(&[])
                .iter()
                .map(|node| text(node, &["key"]))
                .collect()
        };
        Self {
            upstream: keys("upstream"),
            downstream: keys("downstream"),
            transformation: text(payload, &["sql"]),
        }
    }
}

/// Keys look like `ds_id.SCHEMA.TABLE`, sometimes with a dotted schema.
fn schema_from_key(key: &str) -> String {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() >= 3 {
        parts[1..parts.len() - 1].join(".")
    } else {
        UNKNOWN.to_string()
    }
}
