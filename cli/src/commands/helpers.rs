use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, TimeDelta};
use serde::Serialize;
use std::io::{self, Read};
use std::path::Path;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use dietlog_core::models::{MealEntry, MealLibraryEntry};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - TimeDelta::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + TimeDelta::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Resolve `--from/--to/--days` into an inclusive range ending today by default.
pub(crate) fn parse_range(
    from: Option<String>,
    to: Option<String>,
    days: u32,
) -> Result<(NaiveDate, NaiveDate)> {
    let end = parse_date(to)?;
    let start = match from {
        Some(s) => parse_date(Some(s))?,
        None => {
            if days == 0 {
                bail!("--days must be at least 1");
            }
            end - TimeDelta::days(i64::from(days) - 1)
        }
    };
    if start > end {
        bail!("Range start {start} is after end {end}");
    }
    Ok((start, end))
}

pub(crate) fn parse_on_off(s: &str) -> Result<bool> {
    match s.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => bail!("Expected 'on' or 'off', got '{s}'"),
    }
}

/// Read a file, or stdin when the path is `-`.
pub(crate) fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Write to a file, or stdout when no path is given.
pub(crate) fn write_output(path: Option<&Path>, contents: &str) -> Result<()> {
    match path {
        None => {
            println!("{contents}");
            Ok(())
        }
        Some(p) => std::fs::write(p, contents)
            .with_context(|| format!("Failed to write {}", p.display())),
    }
}

pub(crate) fn print_meal_table(meals: &[MealEntry]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Type")]
        meal_type: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Carb")]
        carb: String,
        #[tabled(rename = "Kcal")]
        kcal: String,
        #[tabled(rename = "ID")]
        id: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .enumerate()
        .map(|(i, m)| MealRow {
            idx: i + 1,
            meal_type: m.meal_type.to_string(),
            name: {
                let name = truncate(m.name.as_deref().unwrap_or("-"), 30);
                if m.photo.is_some() { format!("{name} [photo]") } else { name }
            },
            protein: format!("{:.1}", m.protein),
            fat: format!("{:.1}", m.fat),
            carb: format!("{:.1}", m.carb),
            kcal: format!("{:.0}", m.kcal),
            id: short_id(&m.id),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_library_table(entries: &[&MealLibraryEntry]) {
    #[derive(Tabled)]
    struct PresetRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Carb")]
        carb: String,
        #[tabled(rename = "Kcal")]
        kcal: String,
    }

    let rows: Vec<PresetRow> = entries
        .iter()
        .map(|e| PresetRow {
            id: short_id(&e.id),
            name: truncate(&e.name, 35),
            protein: format!("{:.1}", e.protein),
            fat: format!("{:.1}", e.fat),
            carb: format!("{:.1}", e.carb),
            kcal: format!("{:.0}", e.kcal),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// Resolve a full id or a unique prefix of one.
pub(crate) fn resolve_id<'a, I>(ids: I, query: &str) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let matches: Vec<&str> = ids.into_iter().filter(|id| id.starts_with(query)).collect();
    if let Some(exact) = matches.iter().find(|id| **id == query) {
        return Ok((*exact).to_string());
    }
    match matches.as_slice() {
        [] => bail!("No entry with id '{query}'"),
        [one] => Ok((*one).to_string()),
        _ => bail!("Id prefix '{query}' is ambiguous ({} matches)", matches.len()),
    }
}

pub(crate) fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
