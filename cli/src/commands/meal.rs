use anyhow::{Result, bail};
use chrono::NaiveDate;

use dietlog_core::models::{MealType, NewMeal};
use dietlog_core::store::DietStore;

use super::helpers::{json_error, parse_date, print_meal_table, resolve_id};

pub(crate) struct LogArgs {
    pub meal_type: String,
    pub name: Option<String>,
    pub protein: f64,
    pub fat: f64,
    pub carb: f64,
    pub kcal: Option<f64>,
    pub photo: Option<String>,
    pub date: Option<String>,
}

pub(crate) fn cmd_log(store: &mut DietStore, args: LogArgs, json: bool) -> Result<()> {
    let meal_type: MealType = args.meal_type.parse()?;
    if args.photo.as_ref().is_some_and(|p| !p.starts_with("data:image/")) {
        bail!("Photo must be an image data URI (data:image/...)");
    }
    let date = parse_date(args.date)?;
    let entry = store.add_meal_for_date(
        date,
        NewMeal {
            meal_type,
            name: args.name,
            protein: args.protein,
            fat: args.fat,
            carb: args.carb,
            kcal: args.kcal,
            photo: args.photo,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let name = entry.name.as_deref().unwrap_or("meal");
        println!(
            "Logged {name} ({meal_type}) for {date}: {:.0} kcal | P:{:.1}g F:{:.1}g C:{:.1}g",
            entry.kcal, entry.protein, entry.fat, entry.carb
        );
    }
    Ok(())
}

pub(crate) fn cmd_meals_list(store: &DietStore, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let meals = store.meals_for(date);

    if json {
        println!("{}", serde_json::to_string_pretty(meals)?);
    } else if meals.is_empty() {
        eprintln!("No meals logged for {date}");
    } else {
        println!("=== {date} ===");
        print_meal_table(meals);
    }
    Ok(())
}

/// A meal named by its 1-based position in the day, or by id (prefix).
fn resolve_position(store: &DietStore, date: NaiveDate, target: &str) -> Result<usize> {
    let meals = store.meals_for(date);
    if let Ok(n) = target.parse::<usize>() {
        if n == 0 || n > meals.len() {
            bail!("No meal #{n} on {date} ({} logged)", meals.len());
        }
        return Ok(n - 1);
    }
    let id = resolve_id(meals.iter().map(|m| m.id.as_str()), target)?;
    meals
        .iter()
        .position(|m| m.id == id)
        .ok_or_else(|| anyhow::anyhow!("No meal with id '{target}' on {date}"))
}

pub(crate) fn cmd_meals_remove(
    store: &mut DietStore,
    target: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let index = resolve_position(store, date, target)?;
    let removed = store.meals_for(date).get(index).cloned();
    let changed = store.remove_meal(date, index)?;

    match removed {
        Some(meal) if changed => {
            if json {
                println!("{}", serde_json::json!({ "removed": meal.id, "date": date }));
            } else {
                let name = meal.name.as_deref().unwrap_or("meal");
                println!("Removed {name} ({:.0} kcal) from {date}", meal.kcal);
            }
        }
        _ if json => println!("{}", json_error("Nothing removed")),
        _ => eprintln!("Nothing removed"),
    }
    Ok(())
}

pub(crate) fn cmd_meals_move(
    store: &mut DietStore,
    target: &str,
    to: usize,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let from = resolve_position(store, date, target)?;
    if to == 0 {
        bail!("Positions start at 1");
    }
    let moved = store.reorder_meals(date, from, to - 1)?;

    if json {
        println!("{}", serde_json::json!({ "moved": moved, "date": date }));
    } else if moved {
        println!("Moved meal #{} to #{to} on {date}", from + 1);
        print_meal_table(store.meals_for(date));
    } else {
        eprintln!("Order unchanged");
    }
    Ok(())
}
