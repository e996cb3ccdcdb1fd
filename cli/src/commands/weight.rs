use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use dietlog_core::store::DietStore;

use super::helpers::{json_error, no_neg_zero, parse_date};

const LBS_PER_KG: f64 = 2.20462;
const KG_PER_LB: f64 = 0.453_592;

fn to_kg(value: f64, unit: &str) -> Result<f64> {
    if value <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => {
            let kg = no_neg_zero(value * KG_PER_LB);
            eprintln!("Converting {value:.1} lbs → {kg:.2} kg");
            Ok(kg)
        }
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

pub(crate) fn cmd_weight_log(
    store: &mut DietStore,
    value: f64,
    unit: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let weight = to_kg(value, unit)?;
    let date = parse_date(date)?;
    store.add_weight_record(date, weight)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "date": date, "weight": weight, "profile": store.profile() })
        );
    } else {
        println!(
            "Logged {weight:.1} kg ({:.1} lbs) for {date}",
            weight * LBS_PER_KG
        );
        if let Some(tdee) = store.profile().and_then(|p| p.tdee) {
            println!("  TDEE now {tdee:.0} kcal");
        }
    }
    Ok(())
}

pub(crate) fn cmd_weight_history(store: &DietStore, json: bool) -> Result<()> {
    let history = store.weight_history_sorted();
    let change = store.weight_change();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "history": history,
                "change": change,
            }))?
        );
        return Ok(());
    }
    if history.is_empty() {
        eprintln!("No weight entries found. Use `dietlog weight log` to record your weight.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct WeightRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight (kg)")]
        kg: String,
        #[tabled(rename = "Weight (lbs)")]
        lbs: String,
    }

    let rows: Vec<WeightRow> = history
        .iter()
        .map(|r| WeightRow {
            date: r.date.to_string(),
            kg: format!("{:.1}", r.weight),
            lbs: format!("{:.1}", r.weight * LBS_PER_KG),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    if let Some(delta) = change {
        println!("Change: {:+.1} kg", no_neg_zero(delta));
    }
    Ok(())
}

pub(crate) fn cmd_weight_remove(store: &mut DietStore, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let removed = store.remove_weight_record(date)?;

    match (removed, json) {
        (true, true) => println!("{}", serde_json::json!({ "deleted": date })),
        (true, false) => println!("Deleted weight entry for {date}"),
        (false, true) => println!("{}", json_error(&format!("No weight entry for {date}"))),
        (false, false) => eprintln!("No weight entry for {date}"),
    }
    Ok(())
}
