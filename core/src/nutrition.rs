//! Energy estimates and macro arithmetic. Pure functions, no state.

use serde::{Deserialize, Serialize};

use crate::models::{ActivityLevel, GoalType, Goals, Gender, ShortTermGoal};

pub const KCAL_PER_G_PROTEIN: f64 = 4.0;
pub const KCAL_PER_G_FAT: f64 = 9.0;
pub const KCAL_PER_G_CARB: f64 = 4.0;

/// Energy in one kilogram of body weight, used for deficit planning.
pub const KCAL_PER_KG_BODY_WEIGHT: f64 = 7700.0;
pub const MIN_DIET_KCAL: f64 = 1200.0;
pub const MUSCLE_GAIN_SURPLUS: f64 = 300.0;

/// Mifflin-St Jeor resting energy, rounded to the nearest kcal.
#[must_use]
pub fn estimate_bmr(gender: Gender, weight_kg: f64, height_cm: f64, age: u32) -> f64 {
    let offset = match gender {
        Gender::Male => 5.0,
        Gender::Female => -161.0,
    };
    (10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age) + offset).round()
}

/// Activity multiplier. Unknown levels fall back to sedentary.
#[must_use]
pub fn activity_factor(level: Option<ActivityLevel>) -> f64 {
    match level {
        Some(ActivityLevel::Moderate) => 1.55,
        Some(ActivityLevel::Active) => 1.725,
        Some(ActivityLevel::Sedentary) | None => 1.2,
    }
}

#[must_use]
pub fn estimate_tdee(bmr: f64, level: Option<ActivityLevel>) -> f64 {
    (bmr * activity_factor(level)).round()
}

/// 4/9/4 kcal per gram, rounded.
#[must_use]
pub fn macros_to_energy(protein: f64, fat: f64, carb: f64) -> f64 {
    (protein * KCAL_PER_G_PROTEIN + fat * KCAL_PER_G_FAT + carb * KCAL_PER_G_CARB).round()
}

/// Share of energy assigned to each macro, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroSplit {
    pub protein_pct: f64,
    pub fat_pct: f64,
    pub carb_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalPreset {
    Maintenance,
    WeightLoss,
    MuscleGain,
    LowCarb,
}

pub const GOAL_PRESETS: &[&str] = &["maintenance", "weight-loss", "muscle-gain", "low-carb"];

impl GoalPreset {
    #[must_use]
    pub fn split(self) -> MacroSplit {
        let (protein_pct, fat_pct, carb_pct) = match self {
            Self::Maintenance => (25.0, 20.0, 55.0),
            Self::WeightLoss => (30.0, 25.0, 45.0),
            Self::MuscleGain => (35.0, 20.0, 45.0),
            Self::LowCarb => (30.0, 35.0, 35.0),
        };
        MacroSplit {
            protein_pct,
            fat_pct,
            carb_pct,
        }
    }
}

impl std::str::FromStr for GoalPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "maintenance" => Ok(Self::Maintenance),
            "weightloss" => Ok(Self::WeightLoss),
            "musclegain" => Ok(Self::MuscleGain),
            "lowcarb" => Ok(Self::LowCarb),
            _ => anyhow::bail!(
                "Unknown preset '{s}'. Must be one of: {}",
                GOAL_PRESETS.join(", ")
            ),
        }
    }
}

/// Turn an energy target and a percentage split into gram goals.
///
/// Each percentage is clamped to 0..=100 and normalised by their sum, so a
/// split that does not add up to 100 still distributes the whole target.
#[must_use]
pub fn goals_from_split(kcal: f64, split: MacroSplit) -> Goals {
    let clamp = |pct: f64| if pct.is_finite() { pct.clamp(0.0, 100.0) } else { 0.0 };
    let (p, f, c) = (
        clamp(split.protein_pct),
        clamp(split.fat_pct),
        clamp(split.carb_pct),
    );
    let sum = p + f + c;
    let norm = if sum > 0.0 { sum } else { 1.0 };
    Goals {
        protein: (kcal * p / norm / KCAL_PER_G_PROTEIN).round(),
        fat: (kcal * f / norm / KCAL_PER_G_FAT).round(),
        carb: (kcal * c / norm / KCAL_PER_G_CARB).round(),
        kcal,
    }
}

/// Daily energy target for a time-boxed weight goal.
///
/// Weight loss spreads the energy of the kilograms to lose over the period
/// and never drops below [`MIN_DIET_KCAL`].
#[must_use]
pub fn short_term_kcal(tdee: f64, current_weight: f64, goal: &ShortTermGoal) -> f64 {
    match goal.goal_type {
        GoalType::WeightLoss => {
            if goal.target_weeks == 0 || goal.target_weight <= 0.0 {
                return tdee;
            }
            let to_lose = current_weight - goal.target_weight;
            let weekly = to_lose / f64::from(goal.target_weeks) * KCAL_PER_KG_BODY_WEIGHT;
            (tdee - weekly / 7.0).max(MIN_DIET_KCAL).round()
        }
        GoalType::MuscleGain => tdee + MUSCLE_GAIN_SURPLUS,
        GoalType::Maintenance => tdee,
    }
}
