use anyhow::Result;
use chrono::Local;

use dietlog_core::models::{CloudPatch, CloudSyncState};
use dietlog_core::store::DietStore;
use dietlog_core::sync::SyncController;

use super::backup::print_import_summary;

pub(crate) fn cmd_cloud_config(store: &mut DietStore, patch: CloudPatch, json: bool) -> Result<()> {
    store.set_cloud(patch)?;
    let cloud = store.cloud();
    if json {
        println!("{}", serde_json::to_string_pretty(&cloud.settings())?);
    } else {
        print_settings(cloud);
    }
    Ok(())
}

fn on_off(v: bool) -> &'static str {
    if v { "on" } else { "off" }
}

fn print_settings(cloud: &CloudSyncState) {
    println!("Enabled:    {}", on_off(cloud.enabled));
    println!("User id:    {}", cloud.user_id.as_deref().unwrap_or("-"));
    println!("Auto sync:  {}", on_off(cloud.auto));
}

pub(crate) fn cmd_cloud_status(sync: &SyncController, json: bool) -> Result<()> {
    let cloud = sync.cloud_status();
    if json {
        let mut value = serde_json::to_value(&cloud)?;
        value["endpointConfigured"] = serde_json::Value::Bool(sync.has_client());
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_settings(&cloud);
    println!(
        "Endpoint:   {}",
        if sync.has_client() {
            "configured"
        } else {
            "not configured (set DIETLOG_BACKUP_URL and DIETLOG_BACKUP_KEY)"
        }
    );
    match cloud.last_sync_at {
        Some(at) => println!("Last sync:  {}", at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")),
        None => println!("Last sync:  never"),
    }
    if let Some(e) = &cloud.error {
        println!("Last error: {e}");
    }
    Ok(())
}

pub(crate) async fn cmd_cloud_push(sync: &SyncController, json: bool) -> Result<()> {
    let updated_at = sync.push_to_cloud().await?;
    if json {
        println!("{}", serde_json::json!({ "pushed": true, "updatedAt": updated_at }));
    } else {
        println!(
            "Backup uploaded ({})",
            updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Overwrite local data with the remote backup.
pub(crate) async fn cmd_cloud_pull(sync: &SyncController, json: bool) -> Result<()> {
    let summary = sync.pull_from_cloud().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_import_summary(&summary);
    }
    Ok(())
}

pub(crate) async fn cmd_cloud_test(sync: &SyncController, json: bool) -> Result<()> {
    sync.test_connection().await?;
    if json {
        println!("{}", serde_json::json!({ "ok": true }));
    } else {
        println!("Connection OK");
    }
    Ok(())
}
