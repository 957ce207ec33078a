use anyhow::Result;
use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::fetch;
use crate::model::Dataset;
use crate::parser;
use crate::settings::Settings;
use crate::snapshot::{self, Granularity};
use crate::store::SnapshotStore;
use crate::validate::{self, ValidationError};

/// A validated batch and the file name it will be stored under.
#[derive(Debug)]
pub struct Snapshot {
    pub name: String,
    pub dataset: Dataset,
}

#[derive(Debug)]
pub struct RunSummary {
    pub records: usize,
    pub location: String,
}

/// The pure part of a run: page → records → validated dataset → name.
pub fn prepare_snapshot(
    html: &str,
    now: NaiveDateTime,
    granularity: Granularity,
) -> Result<Snapshot, ValidationError> {
    let records = parser::process_page(html);
    info!("Extracted {} models, validating", records.len());

    let dataset = Dataset::from_records(&records);
    validate::validate(&dataset)?;
    if dataset.is_empty() {
        warn!("No catalog entries found on the page");
    }

    Ok(Snapshot {
        name: snapshot::snapshot_name(now, granularity),
        dataset,
    })
}

/// Fetch, extract, validate and persist one snapshot. Nothing is written
/// unless every step before the upload succeeds.
pub async fn run_once(
    settings: &Settings,
    store: &SnapshotStore,
    now: NaiveDateTime,
) -> Result<RunSummary> {
    let html = fetch::fetch_catalog(settings).await?;
    let snapshot = prepare_snapshot(&html, now, settings.granularity)?;

    let bytes = snapshot::encode(&snapshot.dataset)?;
    let location = store.put(&snapshot.name, bytes).await?;
    info!("Saved {} models to {}", snapshot.dataset.len(), location);

    Ok(RunSummary {
        records: snapshot.dataset.len(),
        location,
    })
}

// ── Tests ──
