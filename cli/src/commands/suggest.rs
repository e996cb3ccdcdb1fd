use anyhow::{Context, Result};
use serde::Serialize;

use dietlog_core::models::{DailyTotals, MealLibraryEntry};
use dietlog_core::store::DietStore;
use dietlog_core::suggest::{
    MAX_LLM_CANDIDATES, SuggestionLimits, SuggestionRequest, SuggestionResponse, Tip, has_goals,
    rank_library, remaining, tips,
};

use crate::llm::LlmClient;

use super::helpers::{parse_date, print_library_table};

pub(crate) struct SuggestArgs {
    pub date: Option<String>,
    pub limit: usize,
    pub use_llm: bool,
    pub budget: Option<String>,
    pub time: Option<String>,
    pub avoid: Vec<String>,
}

#[derive(Serialize)]
struct LocalPlan {
    remaining: DailyTotals,
    tips: Vec<Tip>,
    presets: Vec<MealLibraryEntry>,
}

fn local_plan(store: &DietStore, args: &SuggestArgs) -> Result<LocalPlan> {
    let date = parse_date(args.date.clone())?;
    let goals = store.goals();
    let left = remaining(goals, &store.totals_for(date));
    let ranked = rank_library(store.meal_library(), &left, args.limit.max(MAX_LLM_CANDIDATES));
    Ok(LocalPlan {
        remaining: left,
        tips: tips(goals, &left),
        presets: ranked.into_iter().cloned().collect(),
    })
}

fn print_llm(resp: &SuggestionResponse) {
    for (i, s) in resp.suggestions.iter().enumerate() {
        let m = s.total_macros;
        println!(
            "\n{}. {} ({:.0} kcal | P:{:.0}g F:{:.0}g C:{:.0}g)",
            i + 1,
            s.title,
            m.kcal,
            m.protein,
            m.fat,
            m.carb
        );
        for item in &s.items {
            println!("   - {} x{}", item.name, item.portion);
        }
        if !s.rationale.is_empty() {
            println!("   {}", s.rationale);
        }
    }
}

/// Print local suggestions, or build the planner request when `--llm` is set.
/// The request is sent by [`cmd_suggest_llm`] so no store lock is held across the call.
pub(crate) fn cmd_suggest(
    store: &DietStore,
    args: SuggestArgs,
    json: bool,
) -> Result<Option<SuggestionRequest>> {
    if !has_goals(store.goals()) {
        eprintln!("No goals set; suggestions assume an empty budget.");
    }
    let mut plan = local_plan(store, &args)?;

    if args.use_llm {
        let defaults = SuggestionLimits::default();
        let limits = SuggestionLimits {
            budget: args.budget.unwrap_or(defaults.budget),
            time: args.time.unwrap_or(defaults.time),
            avoid: args.avoid,
        };
        let candidates: Vec<&MealLibraryEntry> = plan.presets.iter().collect();
        return Ok(Some(SuggestionRequest::new(
            plan.remaining,
            &candidates,
            limits,
        )));
    }

    plan.presets.truncate(args.limit);
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(None);
    }

    let r = plan.remaining;
    println!(
        "Remaining: {:.0} kcal | P:{:.0}g F:{:.0}g C:{:.0}g",
        r.kcal, r.protein, r.fat, r.carb
    );
    for tip in &plan.tips {
        println!("  * {tip}");
    }
    if plan.presets.is_empty() {
        eprintln!("\nNo presets to rank. Use `dietlog library add` to build a library.");
    } else {
        println!("\nClosest presets:");
        let refs: Vec<&MealLibraryEntry> = plan.presets.iter().collect();
        print_library_table(&refs);
    }
    Ok(None)
}

pub(crate) async fn cmd_suggest_llm(
    llm: Option<&LlmClient>,
    request: &SuggestionRequest,
    json: bool,
) -> Result<()> {
    let llm = llm.context("LLM suggestions need DIETLOG_LLM_API_KEY to be set")?;
    let resp = llm.suggest(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
    } else {
        print_llm(&resp);
    }
    Ok(())
}
