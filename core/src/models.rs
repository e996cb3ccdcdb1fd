use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::nutrition::{estimate_bmr, estimate_tdee, macros_to_energy};

/// Schema version written into every backup payload.
pub const BACKUP_VERSION: i64 = 1;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_true() -> bool {
    true
}

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// --- Profile ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            _ => bail!("Invalid gender '{s}'. Must be one of: male, female"),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Male => "male",
            Self::Female => "female",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Sedentary,
    Moderate,
    Active,
}

impl FromStr for ActivityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sedentary" => Ok(Self::Sedentary),
            "moderate" => Ok(Self::Moderate),
            "active" => Ok(Self::Active),
            _ => bail!("Invalid activity level '{s}'. Must be one of: sedentary, moderate, active"),
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sedentary => "sedentary",
            Self::Moderate => "moderate",
            Self::Active => "active",
        })
    }
}

/// Body metrics plus the energy estimates derived from them.
///
/// `bmr` and `tdee` are only ever written together by [`Profile::recompute_energy`]
/// (or supplied wholesale by the caller of `set_profile`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub activity_level: Option<ActivityLevel>,
    pub bmr: Option<f64>,
    pub tdee: Option<f64>,
}

impl Profile {
    /// Build a profile and derive its BMR/TDEE from the supplied metrics.
    #[must_use]
    pub fn new(
        name: &str,
        height: f64,
        weight: f64,
        age: u32,
        gender: Gender,
        activity_level: ActivityLevel,
    ) -> Self {
        let mut profile = Self {
            name: name.to_string(),
            height: Some(height),
            weight: Some(weight),
            age: Some(age),
            gender: Some(gender),
            activity_level: Some(activity_level),
            bmr: None,
            tdee: None,
        };
        profile.recompute_energy();
        profile
    }

    /// True when gender, height, weight, age and activity level are all present
    /// and the numeric ones are positive.
    #[must_use]
    pub fn has_energy_inputs(&self) -> bool {
        self.gender.is_some()
            && self.activity_level.is_some()
            && self.height.is_some_and(|h| h > 0.0)
            && self.weight.is_some_and(|w| w > 0.0)
            && self.age.is_some_and(|a| a > 0)
    }

    /// Recompute `bmr` and `tdee` together. Returns false (leaving both untouched)
    /// when an input is missing.
    pub fn recompute_energy(&mut self) -> bool {
        if !self.has_energy_inputs() {
            return false;
        }
        let (Some(gender), Some(weight), Some(height), Some(age)) =
            (self.gender, self.weight, self.height, self.age)
        else {
            return false;
        };
        let bmr = estimate_bmr(gender, weight, height, age);
        self.bmr = Some(bmr);
        self.tdee = Some(estimate_tdee(bmr, self.activity_level));
        true
    }
}

// --- Goals & preferences ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Goals {
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carb: f64,
    #[serde(default)]
    pub kcal: f64,
}

/// Partial goals update; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoalsPatch {
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carb: Option<f64>,
    pub kcal: Option<f64>,
}

impl Goals {
    pub fn merge(&mut self, patch: GoalsPatch) {
        if let Some(v) = patch.protein {
            self.protein = v;
        }
        if let Some(v) = patch.fat {
            self.fat = v;
        }
        if let Some(v) = patch.carb {
            self.carb = v;
        }
        if let Some(v) = patch.kcal {
            self.kcal = v;
        }
    }
}

impl From<Goals> for GoalsPatch {
    fn from(goals: Goals) -> Self {
        Self {
            protein: Some(goals.protein),
            fat: Some(goals.fat),
            carb: Some(goals.carb),
            kcal: Some(goals.kcal),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub dark_mode: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            dark_mode: true,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GoalType {
    Maintenance,
    WeightLoss,
    MuscleGain,
}

impl FromStr for GoalType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "maintenance" | "maintain" => Ok(Self::Maintenance),
            "weightloss" | "loss" | "cut" => Ok(Self::WeightLoss),
            "musclegain" | "gain" | "bulk" => Ok(Self::MuscleGain),
            _ => bail!("Invalid goal type '{s}'. Must be one of: maintenance, weight-loss, muscle-gain"),
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Maintenance => "maintenance",
            Self::WeightLoss => "weight-loss",
            Self::MuscleGain => "muscle-gain",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortTermGoal {
    pub target_weight: f64,
    pub target_weeks: u32,
    pub goal_type: GoalType,
}

// --- Meals ---

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "snack"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    #[default]
    Snack,
}

impl FromStr for MealType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            "snack" => Ok(Self::Snack),
            _ => bail!(
                "Invalid meal type '{s}'. Must be one of: {}",
                MEAL_TYPES.join(", ")
            ),
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        })
    }
}

/// A logged meal. Position within its date's sequence is the display order;
/// `id` is the stable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealEntry {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub meal_type: MealType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carb: f64,
    #[serde(default)]
    pub kcal: f64,
    /// Image encoded as a data URI.
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewMeal {
    pub meal_type: MealType,
    pub name: Option<String>,
    pub protein: f64,
    pub fat: f64,
    pub carb: f64,
    /// User-entered energy. When absent it is derived from the macros once, here.
    pub kcal: Option<f64>,
    pub photo: Option<String>,
}

impl NewMeal {
    pub fn into_entry(self) -> Result<MealEntry> {
        validate_macros(self.protein, self.fat, self.carb, self.kcal)?;
        let kcal = self
            .kcal
            .unwrap_or_else(|| macros_to_energy(self.protein, self.fat, self.carb));
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(MealEntry {
            id: new_id(),
            meal_type: self.meal_type,
            name,
            protein: self.protein,
            fat: self.fat,
            carb: self.carb,
            kcal,
            photo: self.photo,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealLibraryEntry {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carb: f64,
    #[serde(default)]
    pub kcal: f64,
}

#[derive(Debug, Clone, Default)]
pub struct NewPreset {
    pub name: String,
    pub protein: f64,
    pub fat: f64,
    pub carb: f64,
    pub kcal: Option<f64>,
}

pub const UNTITLED_PRESET: &str = "Untitled";

impl NewPreset {
    pub fn into_entry(self) -> Result<MealLibraryEntry> {
        validate_macros(self.protein, self.fat, self.carb, self.kcal)?;
        let name = match self.name.trim() {
            "" => UNTITLED_PRESET.to_string(),
            n => n.to_string(),
        };
        Ok(MealLibraryEntry {
            id: new_id(),
            name,
            protein: self.protein,
            fat: self.fat,
            carb: self.carb,
            kcal: self
                .kcal
                .unwrap_or_else(|| macros_to_energy(self.protein, self.fat, self.carb)),
        })
    }
}

/// Meal-library interchange item: a preset without its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub fat: f64,
    #[serde(default)]
    pub carb: f64,
    #[serde(default)]
    pub kcal: f64,
}

impl From<&MealLibraryEntry> for LibraryItem {
    fn from(entry: &MealLibraryEntry) -> Self {
        Self {
            name: Some(entry.name.clone()),
            protein: entry.protein,
            fat: entry.fat,
            carb: entry.carb,
            kcal: entry.kcal,
        }
    }
}

// --- Derived totals ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTotals {
    pub protein: f64,
    pub fat: f64,
    pub carb: f64,
    pub kcal: f64,
}

impl DailyTotals {
    #[must_use]
    pub fn from_meals(meals: &[MealEntry]) -> Self {
        meals.iter().fold(Self::default(), |acc, m| Self {
            protein: acc.protein + m.protein,
            fat: acc.fat + m.fat,
            carb: acc.carb + m.carb,
            kcal: acc.kcal + m.kcal,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayStats {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: DailyTotals,
}

/// Percent of each goal reached; a zero goal reports 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub protein_pct: f64,
    pub fat_pct: f64,
    pub carb_pct: f64,
    pub kcal_pct: f64,
}

impl GoalProgress {
    #[must_use]
    pub fn of(totals: &DailyTotals, goals: &Goals) -> Self {
        let pct = |eaten: f64, goal: f64| {
            if goal > 0.0 {
                (eaten / goal * 100.0).round()
            } else {
                0.0
            }
        };
        Self {
            protein_pct: pct(totals.protein, goals.protein),
            fat_pct: pct(totals.fat, goals.fat),
            carb_pct: pct(totals.carb, goals.carb),
            kcal_pct: pct(totals.kcal, goals.kcal),
        }
    }
}

// --- Weight ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub date: NaiveDate,
    pub weight: f64,
}

// --- Cloud sync ---

/// Observable cloud-sync status. `syncing`, `error`, `retry_attempts` and
/// `next_retry_at` are transient and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSyncState {
    pub enabled: bool,
    pub user_id: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub auto: bool,
    pub syncing: bool,
    pub error: Option<String>,
    pub retry_attempts: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl Default for CloudSyncState {
    fn default() -> Self {
        Self {
            enabled: true,
            user_id: None,
            last_sync_at: None,
            auto: true,
            syncing: false,
            error: None,
            retry_attempts: 0,
            next_retry_at: None,
        }
    }
}

impl CloudSyncState {
    /// Debounced pushes only fire when sync is enabled, automatic, and a user id is set.
    #[must_use]
    pub fn auto_sync_active(&self) -> bool {
        self.enabled && self.auto && self.user_id.as_deref().is_some_and(|u| !u.is_empty())
    }

    #[must_use]
    pub fn settings(&self) -> CloudSettings {
        CloudSettings {
            enabled: self.enabled,
            user_id: self.user_id.clone(),
            auto: self.auto,
            last_sync_at: self.last_sync_at,
        }
    }

    #[must_use]
    pub fn from_settings(settings: CloudSettings) -> Self {
        Self {
            enabled: settings.enabled,
            user_id: settings.user_id,
            auto: settings.auto,
            last_sync_at: settings.last_sync_at,
            ..Self::default()
        }
    }
}

/// The durable subset of [`CloudSyncState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_true")]
    pub auto: bool,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Default for CloudSettings {
    fn default() -> Self {
        CloudSyncState::default().settings()
    }
}

/// User edits to the cloud settings. `user_id: Some(None)` clears the id.
#[derive(Debug, Clone, Default)]
pub struct CloudPatch {
    pub enabled: Option<bool>,
    pub user_id: Option<Option<String>>,
    pub auto: Option<bool>,
}

// --- Persisted aggregate / backup payload ---

/// Every persisted domain field. Derived totals and cloud status live elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietState {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub goals: Goals,
    #[serde(default, deserialize_with = "null_as_default")]
    pub preferences: Preferences,
    #[serde(default)]
    pub short_term_goal: Option<ShortTermGoal>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meal_library: Vec<MealLibraryEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meals_by_date: BTreeMap<NaiveDate, Vec<MealEntry>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub weight_history: Vec<WeightRecord>,
}

/// The backup file / cloud blob: `{version, exportedAt, ...DietState}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayload {
    #[serde(default = "default_backup_version")]
    pub version: i64,
    #[serde(default = "Utc::now")]
    pub exported_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: DietState,
}

fn default_backup_version() -> i64 {
    BACKUP_VERSION
}

/// What the local durable slot holds: the backup fields plus cloud settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(flatten)]
    pub state: DietState,
    #[serde(default)]
    pub cloud: CloudSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct ImportSummary {
    pub meal_days: usize,
    pub meal_entries: usize,
    pub library_entries: usize,
    pub weight_records: usize,
}

impl ImportSummary {
    #[must_use]
    pub fn of(state: &DietState) -> Self {
        Self {
            meal_days: state.meals_by_date.len(),
            meal_entries: state.meals_by_date.values().map(Vec::len).sum(),
            library_entries: state.meal_library.len(),
            weight_records: state.weight_history.len(),
        }
    }
}

// --- Validation ---

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| anyhow::anyhow!("Invalid date '{s}'. Must be YYYY-MM-DD"))
}

/// Macros must be finite and non-negative; a supplied kcal likewise.
pub fn validate_macros(protein: f64, fat: f64, carb: f64, kcal: Option<f64>) -> Result<()> {
    for (label, value) in [("protein", protein), ("fat", fat), ("carb", carb)] {
        if !value.is_finite() {
            bail!("{label} must be a number");
        }
        if value < 0.0 {
            bail!("{label} must not be negative");
        }
    }
    if let Some(kcal) = kcal {
        if !kcal.is_finite() {
            bail!("kcal must be a number");
        }
        if kcal < 0.0 {
            bail!("kcal must not be negative");
        }
    }
    Ok(())
}

pub fn validate_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    Ok(())
}

pub fn validate_goals(patch: &GoalsPatch) -> Result<()> {
    for (label, value) in [
        ("protein", patch.protein),
        ("fat", patch.fat),
        ("carb", patch.carb),
        ("kcal", patch.kcal),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                bail!("Goal {label} must be a non-negative number");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_meal_type_parse_case_insensitive() {
        assert_eq!("Lunch".parse::<MealType>().unwrap(), MealType::Lunch);
        assert_eq!("BREAKFAST".parse::<MealType>().unwrap(), MealType::Breakfast);
        assert!("brunch".parse::<MealType>().is_err());
        assert!("".parse::<MealType>().is_err());
    }

    #[test]
    fn test_profile_new_derives_energy() {
        let p = Profile::new("Ann", 175.0, 70.0, 30, Gender::Male, ActivityLevel::Sedentary);
        assert_eq!(p.bmr, Some(1649.0));
        assert_eq!(p.tdee, Some(1979.0));
    }

    #[test]
    fn test_profile_recompute_requires_all_inputs() {
        let mut p = Profile {
            name: "Bo".to_string(),
            height: Some(160.0),
            weight: Some(55.0),
            age: None,
            gender: Some(Gender::Female),
            activity_level: Some(ActivityLevel::Active),
            bmr: None,
            tdee: None,
        };
        assert!(!p.recompute_energy());
        assert!(p.bmr.is_none());
        assert!(p.tdee.is_none());

        p.age = Some(0);
        assert!(!p.recompute_energy());
    }

    #[test]
    fn test_goals_merge_keeps_unpatched_fields() {
        let mut goals = Goals {
            protein: 120.0,
            fat: 60.0,
            carb: 200.0,
            kcal: 1900.0,
        };
        goals.merge(GoalsPatch {
            kcal: Some(2100.0),
            ..GoalsPatch::default()
        });
        assert_eq!(goals.kcal, 2100.0);
        assert_eq!(goals.protein, 120.0);
        assert_eq!(goals.carb, 200.0);
    }

    #[test]
    fn test_new_meal_derives_kcal_when_missing() {
        let entry = NewMeal {
            meal_type: MealType::Lunch,
            protein: 30.0,
            fat: 10.0,
            carb: 40.0,
            ..NewMeal::default()
        }
        .into_entry()
        .unwrap();
        assert_eq!(entry.kcal, 370.0);
        assert!(!entry.id.is_empty());
    }

    #[test]
    fn test_new_meal_keeps_user_kcal_verbatim() {
        let entry = NewMeal {
            protein: 30.0,
            fat: 10.0,
            carb: 40.0,
            kcal: Some(400.0),
            ..NewMeal::default()
        }
        .into_entry()
        .unwrap();
        assert_eq!(entry.kcal, 400.0);
    }

    #[test]
    fn test_new_meal_rejects_negative_or_nan() {
        let negative = NewMeal {
            protein: -1.0,
            ..NewMeal::default()
        };
        assert!(negative.into_entry().is_err());

        let nan = NewMeal {
            carb: f64::NAN,
            ..NewMeal::default()
        };
        assert!(nan.into_entry().is_err());

        let bad_kcal = NewMeal {
            kcal: Some(-5.0),
            ..NewMeal::default()
        };
        assert!(bad_kcal.into_entry().is_err());
    }

    #[test]
    fn test_new_preset_defaults_name() {
        let entry = NewPreset {
            name: "   ".to_string(),
            protein: 10.0,
            ..NewPreset::default()
        }
        .into_entry()
        .unwrap();
        assert_eq!(entry.name, UNTITLED_PRESET);
        assert_eq!(entry.kcal, 40.0);
    }

    #[test]
    fn test_daily_totals_sum() {
        let meals = vec![
            NewMeal {
                protein: 10.0,
                fat: 5.0,
                carb: 20.0,
                kcal: Some(200.0),
                ..NewMeal::default()
            }
            .into_entry()
            .unwrap(),
            NewMeal {
                protein: 25.0,
                fat: 1.5,
                carb: 0.0,
                kcal: Some(120.0),
                ..NewMeal::default()
            }
            .into_entry()
            .unwrap(),
        ];
        let totals = DailyTotals::from_meals(&meals);
        assert_eq!(totals.protein, 35.0);
        assert_eq!(totals.fat, 6.5);
        assert_eq!(totals.carb, 20.0);
        assert_eq!(totals.kcal, 320.0);
    }

    #[test]
    fn test_goal_progress_zero_goal() {
        let totals = DailyTotals {
            protein: 50.0,
            fat: 20.0,
            carb: 100.0,
            kcal: 800.0,
        };
        let goals = Goals {
            protein: 100.0,
            fat: 0.0,
            carb: 300.0,
            kcal: 2000.0,
        };
        let progress = GoalProgress::of(&totals, &goals);
        assert_eq!(progress.protein_pct, 50.0);
        assert_eq!(progress.fat_pct, 0.0);
        assert_eq!(progress.carb_pct, 33.0);
        assert_eq!(progress.kcal_pct, 40.0);
    }

    #[test]
    fn test_backup_payload_wire_shape() {
        let mut state = DietState::default();
        state.meals_by_date.insert(
            date("2024-06-15"),
            vec![MealEntry {
                id: "m1".to_string(),
                meal_type: MealType::Dinner,
                name: None,
                protein: 1.0,
                fat: 2.0,
                carb: 3.0,
                kcal: 34.0,
                photo: None,
            }],
        );
        let payload = BackupPayload {
            version: BACKUP_VERSION,
            exported_at: Utc::now(),
            state,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["version"], 1);
        assert!(value["exportedAt"].is_string());
        assert!(value["profile"].is_null());
        assert!(value["shortTermGoal"].is_null());
        assert_eq!(value["preferences"]["darkMode"], true);
        assert_eq!(value["goals"]["kcal"], 0.0);
        assert_eq!(value["mealsByDate"]["2024-06-15"][0]["type"], "dinner");
        assert!(value["mealsByDate"]["2024-06-15"][0]["photo"].is_null());
        assert!(value["mealLibrary"].as_array().unwrap().is_empty());
        assert!(value["weightHistory"].as_array().unwrap().is_empty());
        assert!(value.get("cloud").is_none());
    }

    #[test]
    fn test_backup_payload_null_fields_fall_back_to_defaults() {
        let json = r#"{
            "version": 1,
            "goals": null,
            "preferences": null,
            "mealLibrary": null,
            "mealsByDate": null,
            "weightHistory": null
        }"#;
        let payload: BackupPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.state, DietState::default());
        assert!(payload.state.preferences.dark_mode);
    }

    #[test]
    fn test_backup_payload_rejects_wrong_shapes() {
        let not_array = r#"{"mealLibrary": {"a": 1}}"#;
        assert!(serde_json::from_str::<BackupPayload>(not_array).is_err());

        let bad_date = r#"{"mealsByDate": {"June 15": []}}"#;
        assert!(serde_json::from_str::<BackupPayload>(bad_date).is_err());
    }

    #[test]
    fn test_meal_entry_without_id_gets_one() {
        let entry: MealEntry =
            serde_json::from_str(r#"{"type":"lunch","protein":10,"fat":2,"carb":5,"kcal":78}"#)
                .unwrap();
        assert!(!entry.id.is_empty());
        assert_eq!(entry.meal_type, MealType::Lunch);
        assert!(entry.name.is_none());
    }

    #[test]
    fn test_preferences_keep_extra_keys() {
        let prefs: Preferences =
            serde_json::from_str(r#"{"darkMode":false,"units":"metric"}"#).unwrap();
        assert!(!prefs.dark_mode);
        assert_eq!(prefs.extra["units"], "metric");
        let back = serde_json::to_value(&prefs).unwrap();
        assert_eq!(back["units"], "metric");
    }

    #[test]
    fn test_persisted_state_carries_cloud_settings() {
        let mut persisted = PersistedState::default();
        persisted.cloud.user_id = Some("u-1".to_string());
        let json = serde_json::to_string(&persisted).unwrap();
        let back: PersistedState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cloud.user_id.as_deref(), Some("u-1"));
        assert!(back.cloud.auto);
    }

    #[test]
    fn test_cloud_auto_sync_active() {
        let mut cloud = CloudSyncState::default();
        assert!(!cloud.auto_sync_active());
        cloud.user_id = Some("abc".to_string());
        assert!(cloud.auto_sync_active());
        cloud.auto = false;
        assert!(!cloud.auto_sync_active());
    }

    #[test]
    fn test_validate_weight() {
        assert!(validate_weight(70.5).is_ok());
        assert!(validate_weight(0.0).is_err());
        assert!(validate_weight(-3.0).is_err());
        assert!(validate_weight(f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert!(parse_date("15/01/2024").is_err());
    }

    #[test]
    fn test_goal_type_parse() {
        assert_eq!("weight-loss".parse::<GoalType>().unwrap(), GoalType::WeightLoss);
        assert_eq!("muscleGain".parse::<GoalType>().unwrap(), GoalType::MuscleGain);
        assert!("shred".parse::<GoalType>().is_err());
    }
}
