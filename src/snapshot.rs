use std::sync::{Arc, LazyLock};

use anyhow::{anyhow, Context, Result};
use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{Array, ArrayRef, ListArray, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use regex::Regex;
use serde::Deserialize;

use crate::model::{Dataset, ModelRecord};

pub const NAME_PREFIX: &str = "ollama_models_";

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ollama_models_(\d{8})(?:_(\d{2}))?\.parquet$").unwrap());

/// How often a new snapshot file is started. Runs inside the same period
/// share a name and overwrite each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Hourly,
}

pub fn snapshot_name(now: NaiveDateTime, granularity: Granularity) -> String {
    match granularity {
        Granularity::Daily => format!("{}{}.parquet", NAME_PREFIX, now.format("%Y%m%d")),
        Granularity::Hourly => format!("{}{}.parquet", NAME_PREFIX, now.format("%Y%m%d_%H")),
    }
}

/// Recover (date, hour) from a snapshot file name; `None` for anything else.
pub fn parse_snapshot_name(name: &str) -> Option<(NaiveDate, Option<u32>)> {
    let caps = NAME_RE.captures(name)?;
    let date = NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok()?;
    let hour = match caps.get(2) {
        Some(h) => {
            let h: u32 = h.as_str().parse().ok()?;
            if h > 23 {
                return None;
            }
            Some(h)
        }
        None => None,
    };
    Some((date, hour))
}

fn text_list() -> DataType {
    DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)))
}

pub fn arrow_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("pulls", DataType::Utf8, false),
        Field::new("sizes", text_list(), false),
        Field::new("capability", text_list(), false),
        Field::new("updated", DataType::Utf8, false),
        Field::new("captured_at", DataType::Utf8, false),
    ]))
}

/// Serialize a validated dataset to Parquet bytes.
pub fn encode(dataset: &Dataset) -> Result<Vec<u8>> {
    let records = dataset
        .to_records()
        .context("Dataset does not match the snapshot schema")?;

    let batch = RecordBatch::try_new(
        arrow_schema(),
        vec![
            text_array(records.iter().map(|r| r.name.as_str())),
            text_array(records.iter().map(|r| r.pulls.as_str())),
            list_array(records.iter().map(|r| r.sizes.as_slice())),
            list_array(records.iter().map(|r| r.capability.as_slice())),
            text_array(records.iter().map(|r| r.updated.as_str())),
            text_array(records.iter().map(|r| r.captured_at.as_str())),
        ],
    )?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buf)
}

fn text_array<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values))
}

fn list_array<'a>(rows: impl Iterator<Item = &'a [String]>) -> ArrayRef {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for items in rows {
        for item in items {
            builder.values().append_value(item);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

/// Read a snapshot back into records, in stored order.
pub fn decode(bytes: Bytes) -> Result<Vec<ModelRecord>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
    let mut records = Vec::new();

    for batch in reader {
        let batch = batch?;
        let name = text_column(&batch, "name")?;
        let pulls = text_column(&batch, "pulls")?;
        let sizes = list_column(&batch, "sizes")?;
        let capability = list_column(&batch, "capability")?;
        let updated = text_column(&batch, "updated")?;
        let captured_at = text_column(&batch, "captured_at")?;

        for i in 0..batch.num_rows() {
            records.push(ModelRecord {
                name: name.value(i).to_string(),
                pulls: pulls.value(i).to_string(),
                sizes: list_values(sizes, i)?,
                capability: list_values(capability, i)?,
                updated: updated.value(i).to_string(),
                captured_at: captured_at.value(i).to_string(),
            });
        }
    }

    Ok(records)
}

fn text_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("snapshot column '{}' missing or not text", name))
}

fn list_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ListArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<ListArray>())
        .ok_or_else(|| anyhow!("snapshot column '{}' missing or not a list", name))
}

fn list_values(list: &ListArray, row: usize) -> Result<Vec<String>> {
    let values = list.value(row);
    let strings = values
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("list items are not text"))?;
    Ok(strings
        .iter()
        .map(|s| s.unwrap_or_default().to_string())
        .collect())
}
