mod fetch;
mod model;
mod parser;
mod pipeline;
mod report;
mod settings;
mod snapshot;
mod store;
mod validate;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use settings::Settings;
use snapshot::Granularity;
use store::SnapshotStore;

#[derive(Parser)]
#[command(name = "ollama_stats", about = "Ollama model catalog snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the catalog once, validate it and store a Parquet snapshot
    Run {
        /// Snapshot period (default from OLLAMA_STATS_GRANULARITY, else hourly)
        #[arg(short, long, value_enum)]
        granularity: Option<Granularity>,
        /// Write to a local directory instead of blob storage
        #[arg(long)]
        local: Option<PathBuf>,
    },
    /// Extract and validate a saved catalog page without storing anything
    Extract {
        /// HTML file saved from the search page
        #[arg(short, long)]
        file: PathBuf,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Print the first rows of one snapshot
    Show {
        /// Snapshot file name, e.g. ollama_models_20250808.parquet
        name: String,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        /// Also export every row of the snapshot to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        local: Option<PathBuf>,
    },
    /// Distinct models per day across stored snapshots
    Count {
        /// Date prefix after "ollama_models_", e.g. 2025090
        #[arg(short, long, default_value = "")]
        pattern: String,
        #[arg(long)]
        local: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;

    let result = match cli.command {
        Commands::Run { granularity, local } => {
            if let Some(g) = granularity {
                settings.granularity = g;
            }
            if local.is_some() {
                settings.local_dir = local;
            }
            let store = SnapshotStore::from_env(&settings)?;
            let now = Local::now().naive_local();
            info!("Scrape run started ({:?} snapshots)", settings.granularity);

            match pipeline::run_once(&settings, &store, now).await {
                Ok(summary) => {
                    println!("Saved {} models to {}", summary.records, summary.location);
                    Ok(())
                }
                Err(e) => {
                    error!("Scrape run failed: {:#}", e);
                    Err(e)
                }
            }
        }
        Commands::Extract { file, limit } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let records = parser::process_page(&html);
            report::print_records(&records, limit);
            validate::validate(&model::Dataset::from_records(&records))?;
            println!("\nValidation passed for {} models.", records.len());
            Ok(())
        }
        Commands::Show { name, limit, csv, local } => {
            if local.is_some() {
                settings.local_dir = local;
            }
            let store = SnapshotStore::from_env(&settings)?;
            let records = snapshot::decode(store.get(&name).await?)
                .with_context(|| format!("Failed to decode {}", store.display_path(&name)))?;
            report::print_records(&records, limit);
            if let Some(path) = csv {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("Failed to create {:?}", path))?;
                report::write_csv(std::io::BufWriter::new(file), &records)?;
                info!("Exported {} rows to {:?}", records.len(), path);
            }
            Ok(())
        }
        Commands::Count { pattern, local } => {
            if local.is_some() {
                settings.local_dir = local;
            }
            let store = SnapshotStore::from_env(&settings)?;
            count_models(&store, &pattern).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

async fn count_models(store: &SnapshotStore, pattern: &str) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let prefix = format!("{}{}", snapshot::NAME_PREFIX, pattern);
    let names: Vec<String> = store
        .list(&prefix)
        .await?
        .into_iter()
        .filter(|n| snapshot::parse_snapshot_name(n).is_some())
        .collect();
    if names.is_empty() {
        println!("No snapshots matching {}* in {}", prefix, store.label());
        return Ok(());
    }

    let pb = ProgressBar::new(names.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut conn = report::connect()?;
    for name in &names {
        pb.set_message(name.clone());
        match store.get(name).await.and_then(snapshot::decode) {
            Ok(records) => {
                report::insert_snapshot(&mut conn, name, &records)?;
            }
            Err(e) => warn!("Skipping {}: {:#}", name, e),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let days = report::models_per_day(&conn)?;
    let capabilities = report::capability_counts(&conn)?;
    let total = report::total_models(&conn)?;
    report::print_counts(&days, &capabilities, total);
    println!("{} snapshots | {}", names.len(), store.label());
    Ok(())
}
