use std::io::Write;

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::model::ModelRecord;

pub fn connect() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS models (
            id          INTEGER PRIMARY KEY,
            snapshot    TEXT NOT NULL,
            name        TEXT NOT NULL,
            pulls       TEXT NOT NULL,
            sizes       TEXT NOT NULL,   -- JSON array
            capability  TEXT NOT NULL,   -- JSON array
            updated     TEXT NOT NULL,
            captured_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_models_name ON models(name);
        CREATE INDEX IF NOT EXISTS idx_models_day ON models(substr(captured_at, 1, 10));
        ",
    )?;
    Ok(())
}

/// Load one snapshot's records. Returns the number of rows inserted.
pub fn insert_snapshot(conn: &mut Connection, snapshot: &str, records: &[ModelRecord]) -> Result<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO models (snapshot, name, pulls, sizes, capability, updated, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for r in records {
            stmt.execute(params![
                snapshot,
                r.name,
                r.pulls,
                serde_json::to_string(&r.sizes)?,
                serde_json::to_string(&r.capability)?,
                r.updated,
                r.captured_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCount {
    pub day: String,
    pub snapshots: i64,
    pub models: i64,
}

/// Distinct model names seen per capture day.
pub fn models_per_day(conn: &Connection) -> Result<Vec<DailyCount>> {
    let mut stmt = conn.prepare(
        "SELECT substr(captured_at, 1, 10) AS day,
                COUNT(DISTINCT snapshot),
                COUNT(DISTINCT name)
         FROM models
         GROUP BY day
         ORDER BY day",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DailyCount {
                day: row.get(0)?,
                snapshots: row.get(1)?,
                models: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Distinct models per capability tag, most common first.
pub fn capability_counts(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT c.value, COUNT(DISTINCT m.name) AS n
         FROM models m, json_each(m.capability) c
         GROUP BY c.value
         ORDER BY n DESC, c.value",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn total_models(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(DISTINCT name) FROM models", [], |row| row.get(0))?)
}

pub fn print_counts(days: &[DailyCount], capabilities: &[(String, i64)], total: i64) {
    println!("{:<10} | {:>9} | {:>6}", "Day", "Snapshots", "Models");
    println!("{}", "-".repeat(31));
    for d in days {
        println!("{:<10} | {:>9} | {:>6}", d.day, d.snapshots, d.models);
    }

    if !capabilities.is_empty() {
        println!("\n--- Capabilities ---");
        for (tag, n) in capabilities {
            println!("  {:<12} {:>5}", truncate(tag, 12), n);
        }
    }

    println!("\n{} distinct models", total);
}

/// Head of a snapshot, one row per model.
pub fn print_records(records: &[ModelRecord], limit: usize) {
    println!("{} rows x 6 columns", records.len());
    if records.is_empty() {
        return;
    }
    println!(
        "{:>3} | {:<28} | {:>7} | {:<20} | {:<18} | {:<14} | {:<19}",
        "#", "Name", "Pulls", "Sizes", "Capability", "Updated", "Captured at"
    );
    println!("{}", "-".repeat(126));
    for (i, r) in records.iter().take(limit).enumerate() {
        println!(
            "{:>3} | {:<28} | {:>7} | {:<20} | {:<18} | {:<14} | {:<19}",
            i + 1,
            truncate(&r.name, 28),
            r.pulls,
            truncate(&r.sizes.join(","), 20),
            truncate(&r.capability.join(","), 18),
            truncate(&r.updated, 14),
            r.captured_at,
        );
    }
    if records.len() > limit {
        println!("... {} more", records.len() - limit);
    }
}

pub const CSV_HEADER: [&str; 6] = ["name", "pulls", "sizes", "capability", "updated", "captured_at"];

/// Full snapshot as CSV with a header line. List columns are written as JSON
/// arrays so they read back unambiguously.
pub fn write_csv<W: Write>(mut w: W, records: &[ModelRecord]) -> Result<()> {
    write_csv_row(&mut w, CSV_HEADER.map(String::from).as_slice())?;
    for r in records {
        let row = [
            r.name.clone(),
            r.pulls.clone(),
            serde_json::to_string(&r.sizes)?,
            serde_json::to_string(&r.capability)?,
            r.updated.clone(),
            r.captured_at.clone(),
        ];
        write_csv_row(&mut w, &row)?;
    }
    w.flush()?;
    Ok(())
}

fn write_csv_row<W: Write>(w: &mut W, row: &[String]) -> std::io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, ",")?;
        }
        if cell.contains([',', '"', '\n', '\r']) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
