use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use dietlog_core::models::{DailyTotals, GoalProgress, Goals, MealEntry};
use dietlog_core::store::DietStore;
use dietlog_core::suggest::{has_goals, remaining};

use super::helpers::{no_neg_zero, parse_date, print_meal_table};

#[derive(Serialize)]
struct DaySummary<'a> {
    date: NaiveDate,
    meals: &'a [MealEntry],
    totals: DailyTotals,
    goals: &'a Goals,
    remaining: DailyTotals,
    progress: GoalProgress,
}

fn line(label: &str, t: &DailyTotals) {
    let kcal = no_neg_zero(t.kcal);
    let (p, f, c) = (no_neg_zero(t.protein), no_neg_zero(t.fat), no_neg_zero(t.carb));
    println!("  {label:<10} {kcal:>6.0} kcal | P:{p:.0}g F:{f:.0}g C:{c:.0}g");
}

pub(crate) fn cmd_summary(store: &DietStore, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let totals = store.totals_for(date);
    let goals = store.goals();
    let summary = DaySummary {
        date,
        meals: store.meals_for(date),
        totals,
        goals,
        remaining: remaining(goals, &totals),
        progress: store.goal_progress(date),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("=== {date} ===\n");
    if summary.meals.is_empty() {
        println!("  No meals logged\n");
    } else {
        print_meal_table(summary.meals);
        println!();
    }

    line("TOTAL", &summary.totals);
    if has_goals(goals) {
        let target = DailyTotals {
            protein: goals.protein,
            fat: goals.fat,
            carb: goals.carb,
            kcal: goals.kcal,
        };
        line("TARGET", &target);
        line("REMAINING", &summary.remaining);
        let p = summary.progress;
        println!(
            "  PROGRESS   {:>5.0}%     | P:{:.0}% F:{:.0}% C:{:.0}%",
            p.kcal_pct, p.protein_pct, p.fat_pct, p.carb_pct
        );
    } else {
        eprintln!("\nNo goals set. Use `dietlog goals set` or `dietlog goals split`.");
    }
    Ok(())
}
