//! Meal suggestions: remaining-budget arithmetic, library ranking, heuristic
//! tips, and the request/response shapes for an external LLM planner.

use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::models::{DailyTotals, Goals, MealLibraryEntry, MealType};

pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;
/// Candidates sent to the LLM are capped to keep the prompt small.
pub const MAX_LLM_CANDIDATES: usize = 10;

pub const PLANNER_SYSTEM_PROMPT: &str =
    "You are a nutrition planning assistant. Reply with JSON only, no extra text. Use metric units.";
pub const PLANNER_TASK: &str = "Using the remaining budget and the candidate meals, propose 3 \
     suggestions of 1-2 items each. Portions may be scaled by 0.5x or 1x.";

/// Per-nutrient budget left for the day, never negative.
#[must_use]
pub fn remaining(goals: &Goals, totals: &DailyTotals) -> DailyTotals {
    DailyTotals {
        protein: (goals.protein - totals.protein).max(0.0),
        fat: (goals.fat - totals.fat).max(0.0),
        carb: (goals.carb - totals.carb).max(0.0),
        kcal: (goals.kcal - totals.kcal).max(0.0),
    }
}

#[must_use]
pub fn has_goals(goals: &Goals) -> bool {
    goals.protein > 0.0 || goals.fat > 0.0 || goals.carb > 0.0 || goals.kcal > 0.0
}

/// L1 distance in grams, with energy weighted at a tenth.
fn distance(entry: &MealLibraryEntry, target: &DailyTotals) -> f64 {
    (entry.protein - target.protein).abs()
        + (entry.fat - target.fat).abs()
        + (entry.carb - target.carb).abs()
        + (entry.kcal - target.kcal).abs() / 10.0
}

/// Library presets closest to the remaining budget, best first.
#[must_use]
pub fn rank_library<'a>(
    library: &'a [MealLibraryEntry],
    remaining: &DailyTotals,
    limit: usize,
) -> Vec<&'a MealLibraryEntry> {
    let mut scored: Vec<(f64, &MealLibraryEntry)> = library
        .iter()
        .map(|entry| (distance(entry, remaining), entry))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored.into_iter().take(limit).map(|(_, e)| e).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tip {
    ProteinGap,
    LowEnergyLeft,
    CarbsNearCap,
    Balanced,
}

impl fmt::Display for Tip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProteinGap => {
                "Large protein gap: favour lean, high-protein foods (chicken breast, tofu, yogurt)."
            }
            Self::LowEnergyLeft => {
                "Little energy left today: pick low-calorie options and go easy on fats."
            }
            Self::CarbsNearCap => {
                "Carbs are close to the cap: fill the protein gap first and keep carb portions small."
            }
            Self::Balanced => "Balanced so far: any well-rounded meal will do.",
        })
    }
}

#[must_use]
pub fn tips(goals: &Goals, remaining: &DailyTotals) -> Vec<Tip> {
    let mut tips = Vec::new();
    if goals.protein > 0.0 && remaining.protein > goals.protein * 0.25 {
        tips.push(Tip::ProteinGap);
    }
    if goals.kcal > 0.0 && remaining.kcal < goals.kcal * 0.15 {
        tips.push(Tip::LowEnergyLeft);
    }
    if goals.carb > 0.0 && remaining.carb < goals.carb * 0.15 && remaining.protein > 0.0 {
        tips.push(Tip::CarbsNearCap);
    }
    if tips.is_empty() {
        tips.push(Tip::Balanced);
    }
    tips
}

// --- LLM planner wire shapes ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionLimits {
    pub budget: String,
    pub time: String,
    pub avoid: Vec<String>,
}

impl Default for SuggestionLimits {
    fn default() -> Self {
        Self {
            budget: "normal".to_string(),
            time: "any".to_string(),
            avoid: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub meal_type: MealType,
    pub protein: f64,
    pub fat: f64,
    pub carb: f64,
    pub kcal: f64,
}

impl From<&MealLibraryEntry> for Candidate {
    fn from(entry: &MealLibraryEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            meal_type: MealType::Snack,
            protein: entry.protein,
            fat: entry.fat,
            carb: entry.carb,
            kcal: entry.kcal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carb: f64,
    #[serde(default)]
    pub kcal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionItem {
    pub name: String,
    #[serde(default = "default_portion")]
    pub portion: f64,
    #[serde(default)]
    pub macros: Macros,
}

fn default_portion() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub title: String,
    #[serde(default)]
    pub items: Vec<SuggestionItem>,
    #[serde(default)]
    pub total_macros: Macros,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub suggestions: Vec<Suggestion>,
}

/// The user message sent to the planner: the task, the budget, and the
/// expected reply format.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionRequest {
    pub task: &'static str,
    pub remaining: DailyTotals,
    pub limits: SuggestionLimits,
    pub candidates: Vec<Candidate>,
    pub format: SuggestionResponse,
}

impl SuggestionRequest {
    #[must_use]
    pub fn new(
        remaining: DailyTotals,
        candidates: &[&MealLibraryEntry],
        limits: SuggestionLimits,
    ) -> Self {
        Self {
            task: PLANNER_TASK,
            remaining,
            limits,
            candidates: candidates
                .iter()
                .take(MAX_LLM_CANDIDATES)
                .map(|e| Candidate::from(*e))
                .collect(),
            format: format_example(),
        }
    }
}

fn format_example() -> SuggestionResponse {
    SuggestionResponse {
        suggestions: vec![Suggestion {
            title: "string".to_string(),
            items: vec![SuggestionItem {
                name: "string".to_string(),
                portion: 0.5,
                macros: Macros::default(),
            }],
            total_macros: Macros::default(),
            rationale: "string".to_string(),
        }],
    }
}

/// Decode the planner's message content. Non-JSON content and a missing
/// `suggestions` array are distinct errors.
pub fn parse_suggestions(content: &str) -> Result<SuggestionResponse> {
    let content = content.trim();
    if content.is_empty() {
        bail!("LLM returned an empty response");
    }
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|_| anyhow::anyhow!("LLM response is not JSON"))?;
    if !value.get("suggestions").is_some_and(serde_json::Value::is_array) {
        bail!("LLM response is missing the suggestions array");
    }
    serde_json::from_value(value)
        .map_err(|e| anyhow::anyhow!("LLM response has an unexpected shape: {e}"))
}
