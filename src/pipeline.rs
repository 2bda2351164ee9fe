use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, TryLockError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::converter::resolve_features;
use crate::normalizer::normalize_features;
use crate::query::{build_query, TagSelector};
use crate::store::{PlaceStore, StoreSummary};
use crate::transport::OverpassClient;

/// Outcome of one full sync cycle across all configured categories.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    pub categories_synced: usize,
    pub categories_failed: usize,
    pub fetched_elements: usize,
    pub inserted: usize,
    pub updated: usize,
    pub record_errors: usize,
}

/// Run one sync cycle: open the store, sync every configured category
/// sequentially, optionally write a backup snapshot. The store handle is
/// released when this returns, on every exit path.
pub fn run_cycle(config: &SyncConfig) -> Result<SyncReport> {
    let client = OverpassClient::new(&config.endpoint);
    let mut store =
        PlaceStore::open(config.db_path.as_deref()).context("could not open place store")?;

    let report = run_cycle_with(&client, &mut store, config);

    if let Some(path) = &config.backup_path {
        if let Err(error) = export_snapshot(&store, path) {
            warn!(%error, "backup snapshot failed");
        }
    }
    Ok(report)
}

/// Sync every selector against an already open store, one category at a
/// time with a politeness delay between network calls. A failure in one
/// category is logged and isolated; the remaining categories still run.
pub fn run_cycle_with(
    client: &OverpassClient,
    store: &mut PlaceStore,
    config: &SyncConfig,
) -> SyncReport {
    let mut report = SyncReport::default();
    let mut first = true;
    for selector in &config.selectors {
        if selector.values.is_empty() {
            continue;
        }
        if !first {
            thread::sleep(Duration::from_secs(config.request_delay_secs));
        }
        first = false;

        match sync_selector(client, store, config, selector) {
            Ok((fetched, summary)) => {
                info!(
                    category = selector.category.as_str(),
                    elements = fetched,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    errors = summary.errors,
                    "category synced"
                );
                report.categories_synced += 1;
                report.fetched_elements += fetched;
                report.inserted += summary.inserted;
                report.updated += summary.updated;
                report.record_errors += summary.errors;
            }
            Err(error) => {
                error!(
                    category = selector.category.as_str(),
                    %error,
                    "category sync failed, continuing with remaining categories"
                );
                report.categories_failed += 1;
            }
        }
    }
    report
}

fn sync_selector(
    client: &OverpassClient,
    store: &mut PlaceStore,
    config: &SyncConfig,
    selector: &TagSelector,
) -> Result<(usize, StoreSummary)> {
    let query = build_query(&config.bbox, selector);
    let elements = client.fetch(&query)?;
    let features = resolve_features(&elements);
    let places = normalize_features(features);
    let summary = store.store_places(&places);
    Ok((elements.len(), summary))
}

/// Re-run the pipeline on a fixed wall-clock interval. Each tick
/// dispatches its cycle on its own thread so a slow cycle cannot push the
/// schedule back; the guard keeps cycles mutually exclusive, and a tick
/// whose predecessor is still running is skipped, never queued.
pub fn run_periodic(config: &SyncConfig) -> Result<()> {
    let cycle_guard = Arc::new(Mutex::new(()));
    info!(interval_secs = config.interval_secs, "starting periodic sync");
    loop {
        let guard = Arc::clone(&cycle_guard);
        let cycle_config = config.clone();
        thread::spawn(move || {
            let _running = match guard.try_lock() {
                Ok(running) => running,
                Err(TryLockError::WouldBlock) => {
                    warn!("previous sync cycle still running, skipping this tick");
                    return;
                }
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };
            match run_cycle(&cycle_config) {
                Ok(report) => info!(?report, "sync cycle complete"),
                Err(error) => error!(%error, "sync cycle failed"),
            }
        });
        thread::sleep(Duration::from_secs(config.interval_secs));
    }
}

/// Write the full store contents as a pretty-printed GeoJSON feature
/// collection.
pub fn export_snapshot(store: &PlaceStore, path: &Path) -> Result<()> {
    let collection = store.export_collection()?;
    let file = File::create(path)
        .with_context(|| format!("failed to create export file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &collection)?;
    writer.flush()?;
    info!(
        features = collection.features.len(),
        path = %path.display(),
        "snapshot exported"
    );
    Ok(())
}
