use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::Dataset;

/// Shape a column's cells must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Text,
    TextList,
}

impl Shape {
    fn accepts(self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Shape::Text, Some(Value::String(_))) => true,
            (Shape::TextList, Some(Value::Array(items))) => items.iter().all(Value::is_string),
            _ => false,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Text => f.write_str("text"),
            Shape::TextList => f.write_str("list of text"),
        }
    }
}

/// Declared schema of a snapshot, in column order.
pub const SCHEMA: [(&str, Shape); 6] = [
    ("name", Shape::Text),
    ("pulls", Shape::Text),
    ("sizes", Shape::TextList),
    ("capability", Shape::TextList),
    ("updated", Shape::Text),
    ("captured_at", Shape::Text),
];

pub const KEY_COLUMN: &str = "name";

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("duplicate values in column '{column}': {}", .names.join(", "))]
    DuplicateKey { column: String, names: Vec<String> },

    #[error("wrong shape in column '{column}': expected {expected}, found {}", .observed.join(", "))]
    SchemaViolation {
        column: String,
        expected: Shape,
        observed: Vec<String>,
    },
}

/// Gate a batch before it may be persisted. Uniqueness of `name` is checked
/// first, then each column's shape in schema order. All or nothing.
pub fn validate(dataset: &Dataset) -> Result<(), ValidationError> {
    check_unique(dataset)?;
    check_schema(dataset)?;
    info!(rows = dataset.len(), "Dataset passed quality checks");
    Ok(())
}

fn check_unique(dataset: &Dataset) -> Result<(), ValidationError> {
    // keyed on kind as well as text: "1" and 1 are different names
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    let mut order: Vec<(String, String)> = Vec::new();

    for value in dataset.column(KEY_COLUMN) {
        let key = (kind_of(value), display_key(value));
        let count = seen.entry(key.clone()).or_insert(0);
        if *count == 0 {
            order.push(key);
        }
        *count += 1;
    }

    let duplicates: Vec<(String, String)> = order.into_iter().filter(|k| seen[k] > 1).collect();
    if duplicates.is_empty() {
        info!("No duplicate model names");
        return Ok(());
    }

    for key in &duplicates {
        warn!(name = %key.1, count = seen[key], "Duplicate model name");
    }
    Err(ValidationError::DuplicateKey {
        column: KEY_COLUMN.to_string(),
        names: duplicates.into_iter().map(|(_, name)| name).collect(),
    })
}

fn check_schema(dataset: &Dataset) -> Result<(), ValidationError> {
    for (column, expected) in SCHEMA {
        if dataset.column(column).all(|v| expected.accepts(v)) {
            continue;
        }
        let mut observed: Vec<String> = Vec::new();
        for kind in dataset.column(column).map(kind_of) {
            if !observed.contains(&kind) {
                observed.push(kind);
            }
        }
        return Err(ValidationError::SchemaViolation {
            column: column.to_string(),
            expected,
            observed,
        });
    }
    Ok(())
}

fn display_key(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "<missing>".to_string(),
    }
}

fn kind_of(value: Option<&Value>) -> String {
    match value {
        None => "missing".into(),
        Some(Value::Null) => "null".into(),
        Some(Value::Bool(_)) => "bool".into(),
        Some(Value::Number(_)) => "number".into(),
        Some(Value::String(_)) => Shape::Text.to_string(),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => Shape::TextList.to_string(),
        Some(Value::Array(_)) => "list".into(),
        Some(Value::Object(_)) => "object".into(),
    }
}

// ── Tests ──
