use anyhow::{Context, Result};
use clap::{Arg, Command};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use placesync::config::SyncConfig;
use placesync::pipeline;
use placesync::store::PlaceStore;

fn main() -> Result<()> {
    init_logging();

    let matches = Command::new("placesync")
        .version("0.1.0")
        .about("Sync OpenStreetMap points of interest into a local indexed store")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file (defaults apply when omitted)"),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("FILE")
                .help("Place store path (overrides the config)"),
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .value_name("URL")
                .help("Overpass API endpoint (overrides the config)"),
        )
        .arg(
            Arg::new("watch")
                .long("watch")
                .action(clap::ArgAction::SetTrue)
                .help("Keep syncing on the configured interval"),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .value_name("SECS")
                .help("Seconds between sync cycles in watch mode"),
        )
        .arg(
            Arg::new("export")
                .long("export")
                .value_name("FILE")
                .help("Write a GeoJSON snapshot of the store and exit"),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .action(clap::ArgAction::SetTrue)
                .help("Print store statistics and exit"),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => SyncConfig::load(Path::new(path))?,
        None => SyncConfig::default(),
    };
    if let Some(db) = matches.get_one::<String>("db") {
        config.db_path = Some(PathBuf::from(db));
    }
    if let Some(endpoint) = matches.get_one::<String>("endpoint") {
        config.endpoint = endpoint.clone();
    }
    if let Some(interval) = matches.get_one::<String>("interval") {
        config.interval_secs = interval
            .parse()
            .with_context(|| format!("invalid interval: {interval}"))?;
    }

    if let Some(path) = matches.get_one::<String>("export") {
        let store = PlaceStore::open(config.db_path.as_deref())?;
        pipeline::export_snapshot(&store, Path::new(path))?;
        return Ok(());
    }

    if matches.get_flag("stats") {
        let store = PlaceStore::open(config.db_path.as_deref())?;
        let stats = store.stats()?;
        println!("total records: {}", stats.total);
        println!("by category:");
        for (category, count) in &stats.by_category {
            println!("  {}: {count}", category.as_str());
        }
        println!("top subcategories:");
        for (subcategory, count) in &stats.top_subcategories {
            println!("  {subcategory}: {count}");
        }
        return Ok(());
    }

    if matches.get_flag("watch") {
        pipeline::run_periodic(&config)?;
    } else {
        let report = pipeline::run_cycle(&config)?;
        println!(
            "synced {} categories ({} failed): {} elements fetched, {} inserted, {} updated, {} record errors",
            report.categories_synced,
            report.categories_failed,
            report.fetched_elements,
            report.inserted,
            report.updated,
            report.record_errors
        );
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
