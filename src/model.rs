use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Placeholder for a catalog field the page did not render.
pub const SENTINEL: &str = "N/A";

/// Format of `captured_at`, local wall-clock time.
pub const CAPTURED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One catalog entry scraped from the search page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub name: String,
    pub pulls: String,
    pub sizes: Vec<String>,
    pub capability: Vec<String>,
    pub updated: String,
    pub captured_at: String,
}

impl ModelRecord {
    pub fn to_row(&self) -> Row {
        let value = json!({
            "name": self.name,
            "pulls": self.pulls,
            "sizes": self.sizes,
            "capability": self.capability,
            "updated": self.updated,
            "captured_at": self.captured_at,
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Column name -> cell value. Loosely typed on purpose so the validator can
/// reject batches that were not produced by the extractor.
pub type Row = Map<String, Value>;

/// Ordered batch of rows sharing the six-column schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    pub fn from_records(records: &[ModelRecord]) -> Self {
        Dataset {
            rows: records.iter().map(ModelRecord::to_row).collect(),
        }
    }

    #[cfg(test)]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Dataset { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column in row order; `None` where a row lacks the column.
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = Option<&'a Value>> + 'a {
        self.rows.iter().map(move |row| row.get(name))
    }

    /// Typed view of the rows. Only meaningful once the dataset has passed
    /// validation; a malformed row surfaces as a deserialization error.
    pub fn to_records(&self) -> serde_json::Result<Vec<ModelRecord>> {
        self.rows
            .iter()
            .map(|row| serde_json::from_value(Value::Object(row.clone())))
            .collect()
    }
}
