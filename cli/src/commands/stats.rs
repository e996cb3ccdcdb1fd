use anyhow::{Context, Result};
use serde::Serialize;
use std::io;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use dietlog_core::models::{DailyTotals, DayStats};
use dietlog_core::store::DietStore;

use super::helpers::{no_neg_zero, parse_range};

/// Flat row for CSV; the csv writer cannot serialize flattened structs.
#[derive(Serialize)]
struct CsvRow {
    date: String,
    protein: f64,
    fat: f64,
    carb: f64,
    kcal: f64,
}

fn write_csv<W: io::Write>(out: W, days: &[DayStats]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for d in days {
        wtr.serialize(CsvRow {
            date: d.date.to_string(),
            protein: d.totals.protein,
            fat: d.totals.fat,
            carb: d.totals.carb,
            kcal: d.totals.kcal,
        })
        .context("Failed to write CSV row")?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

#[derive(Serialize)]
struct StatsReport {
    days: Vec<DayStats>,
    averages: DailyTotals,
}

pub(crate) fn cmd_stats(
    store: &DietStore,
    from: Option<String>,
    to: Option<String>,
    days: u32,
    csv: bool,
    json: bool,
) -> Result<()> {
    let (start, end) = parse_range(from, to, days)?;
    let report = StatsReport {
        days: store.get_date_range_stats(start, end),
        averages: store.range_averages(start, end),
    };

    if csv {
        return write_csv(io::stdout().lock(), &report.days);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct StatsRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Kcal")]
        kcal: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Carb")]
        carb: String,
    }

    let row = |date: String, t: &DailyTotals| StatsRow {
        date,
        kcal: format!("{:.0}", no_neg_zero(t.kcal)),
        protein: format!("{:.0}g", no_neg_zero(t.protein)),
        fat: format!("{:.0}g", no_neg_zero(t.fat)),
        carb: format!("{:.0}g", no_neg_zero(t.carb)),
    };
    let mut rows: Vec<StatsRow> = report
        .days
        .iter()
        .map(|d| row(d.date.to_string(), &d.totals))
        .collect();
    rows.push(row("AVERAGE".to_string(), &report.averages));

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
