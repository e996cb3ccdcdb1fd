use anyhow::Result;
use serde_json::Value;

use dietlog_core::store::{DARK_MODE_KEY, DietStore};

use super::helpers::parse_on_off;

pub(crate) fn cmd_prefs_show(store: &DietStore, json: bool) -> Result<()> {
    let prefs = store.preferences();
    if json {
        println!("{}", serde_json::to_string_pretty(prefs)?);
        return Ok(());
    }
    println!("{DARK_MODE_KEY}: {}", prefs.dark_mode);
    for (key, value) in &prefs.extra {
        println!("{key}: {value}");
    }
    Ok(())
}

/// `on`/`off` set dark mode; no argument toggles it.
pub(crate) fn cmd_prefs_dark_mode(store: &mut DietStore, value: Option<&str>, json: bool) -> Result<()> {
    let enabled = match value {
        Some(v) => {
            let on = parse_on_off(v)?;
            store.set_preference(DARK_MODE_KEY, Value::Bool(on))?;
            on
        }
        None => store.toggle_dark_mode()?,
    };
    if json {
        println!("{}", serde_json::json!({ DARK_MODE_KEY: enabled }));
    } else {
        println!("Dark mode {}", if enabled { "on" } else { "off" });
    }
    Ok(())
}

/// Values are read as JSON when they parse, otherwise stored as strings.
pub(crate) fn cmd_prefs_set(store: &mut DietStore, key: &str, raw: &str, json: bool) -> Result<()> {
    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    store.set_preference(key, value.clone())?;
    if json {
        println!("{}", serde_json::to_string_pretty(store.preferences())?);
    } else {
        println!("Set {key} = {value}");
    }
    Ok(())
}
