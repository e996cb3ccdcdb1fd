use anyhow::Result;
use std::path::Path;

use dietlog_core::models::{MealType, NewPreset};
use dietlog_core::store::DietStore;

use super::helpers::{
    json_error, parse_date, print_library_table, read_input, resolve_id, write_output,
};

fn preset_id(store: &DietStore, query: &str) -> Result<String> {
    resolve_id(store.meal_library().iter().map(|p| p.id.as_str()), query)
}

pub(crate) fn cmd_library_add(store: &mut DietStore, preset: NewPreset, json: bool) -> Result<()> {
    let entry = store.add_preset(preset)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "Added preset '{}' ({:.0} kcal | P:{:.1}g F:{:.1}g C:{:.1}g)",
            entry.name, entry.kcal, entry.protein, entry.fat, entry.carb
        );
    }
    Ok(())
}

pub(crate) fn cmd_library_list(store: &DietStore, query: Option<&str>, json: bool) -> Result<()> {
    let entries = store.search_library(query.unwrap_or_default());
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!("No presets found. Use `dietlog library add` to create one.");
    } else {
        print_library_table(&entries);
    }
    Ok(())
}

pub(crate) fn cmd_library_remove(store: &mut DietStore, id: &str, json: bool) -> Result<()> {
    let id = preset_id(store, id)?;
    let removed = store.remove_preset(&id)?;
    match (removed, json) {
        (true, true) => println!("{}", serde_json::json!({ "deleted": id })),
        (true, false) => println!("Deleted preset {id}"),
        (false, true) => println!("{}", json_error(&format!("No preset {id}"))),
        (false, false) => eprintln!("No preset {id}"),
    }
    Ok(())
}

pub(crate) fn cmd_library_apply(
    store: &mut DietStore,
    id: &str,
    meal_type: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let meal_type: MealType = meal_type.parse()?;
    let id = preset_id(store, id)?;
    let date = parse_date(date)?;
    let entry = store.apply_preset_for_date(&id, meal_type, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let name = entry.name.as_deref().unwrap_or("preset");
        println!("Logged {name} ({meal_type}) for {date}: {:.0} kcal", entry.kcal);
    }
    Ok(())
}

pub(crate) fn cmd_library_import(store: &mut DietStore, path: &Path, json: bool) -> Result<()> {
    let text = read_input(path)?;
    let count = store.import_meal_library_json(&text)?;
    if json {
        println!("{}", serde_json::json!({ "imported": count }));
    } else {
        println!("Imported {count} presets (library replaced)");
    }
    Ok(())
}

pub(crate) fn cmd_library_export(store: &DietStore, path: Option<&Path>) -> Result<()> {
    let text = store.export_meal_library_json()?;
    write_output(path, &text)?;
    if let Some(p) = path {
        eprintln!(
            "Exported {} presets to {}",
            store.meal_library().len(),
            p.display()
        );
    }
    Ok(())
}

pub(crate) fn cmd_library_clear(store: &mut DietStore, json: bool) -> Result<()> {
    let count = store.meal_library().len();
    store.clear_meal_library()?;
    if json {
        println!("{}", serde_json::json!({ "cleared": count }));
    } else {
        println!("Cleared {count} presets");
    }
    Ok(())
}
