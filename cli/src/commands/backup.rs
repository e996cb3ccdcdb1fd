use anyhow::{Result, bail};
use std::path::Path;

use dietlog_core::models::ImportSummary;
use dietlog_core::store::{DietStore, SharedStore};
use dietlog_core::sync::SyncController;

use super::helpers::{read_input, write_output};
use super::with_store;

pub(crate) fn print_import_summary(summary: &ImportSummary) {
    println!(
        "Restored {} meals over {} days, {} presets, {} weight records",
        summary.meal_entries, summary.meal_days, summary.library_entries, summary.weight_records
    );
}

pub(crate) fn cmd_backup_export(store: &DietStore, path: Option<&Path>) -> Result<()> {
    let text = store.export_json()?;
    write_output(path, &text)?;
    if let Some(p) = path {
        eprintln!("Backup written to {}", p.display());
    }
    Ok(())
}

/// Replace all local data with a backup file. Invalid input leaves the store untouched.
pub(crate) fn cmd_backup_import(store: &mut DietStore, path: &Path, json: bool) -> Result<()> {
    let text = read_input(path)?;
    let summary = store.import_json(&text)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_import_summary(&summary);
    }
    Ok(())
}

/// Erase all local data. Pending cloud pushes are dropped first so the
/// remote copy is left as it was.
pub(crate) fn cmd_reset(
    store: &SharedStore,
    sync: &SyncController,
    yes: bool,
    json: bool,
) -> Result<()> {
    if !yes {
        bail!("This erases every meal, preset, goal and weight record. Re-run with --yes to confirm");
    }
    sync.cancel_pending();
    with_store(store, DietStore::clear_all)?;
    if json {
        println!("{}", serde_json::json!({ "reset": true }));
    } else {
        println!("All local data erased; cloud backup settings kept");
    }
    Ok(())
}
