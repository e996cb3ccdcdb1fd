use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::models::{
    BACKUP_VERSION, BackupPayload, CloudPatch, CloudSettings, CloudSyncState, DailyTotals,
    DayStats, DietState, GoalProgress, Goals, GoalsPatch, ImportSummary, LibraryItem, MealEntry,
    MealLibraryEntry, MealType, NewMeal, NewPreset, Preferences, Profile, ShortTermGoal,
    UNTITLED_PRESET, WeightRecord, new_id, validate_goals, validate_macros, validate_weight,
};
use crate::nutrition::macros_to_energy;

/// Called after every committed mutation with the current cloud status.
pub type ChangeHook = Box<dyn Fn(&CloudSyncState) + Send + Sync>;

/// The store as shared between the presentation layer and the sync controller.
pub type SharedStore = Arc<Mutex<DietStore>>;

pub const DARK_MODE_KEY: &str = "darkMode";

#[must_use]
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// The single owner of all diet data.
///
/// Every mutation applies its delta, recomputes the touched date's totals,
/// persists the whole state and then fires the change hook (which the sync
/// controller uses to schedule a debounced push).
pub struct DietStore {
    db: Database,
    state: DietState,
    totals: BTreeMap<NaiveDate, DailyTotals>,
    cloud: CloudSyncState,
    on_change: Option<ChangeHook>,
}

impl DietStore {
    /// Seed the store from the durable slot, falling back to defaults.
    pub fn open(db: Database) -> Result<Self> {
        let persisted = db.load_state()?.unwrap_or_default();
        let mut store = Self {
            db,
            state: persisted.state,
            totals: BTreeMap::new(),
            cloud: CloudSyncState::from_settings(persisted.cloud),
            on_change: None,
        };
        store.rebuild_totals();
        debug!(
            days = store.state.meals_by_date.len(),
            library = store.state.meal_library.len(),
            "loaded diet state"
        );
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(Database::open_in_memory()?)
    }

    #[must_use]
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn set_change_hook(&mut self, hook: ChangeHook) {
        self.on_change = Some(hook);
    }

    // --- Read access ---

    #[must_use]
    pub fn state(&self) -> &DietState {
        &self.state
    }

    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        self.state.profile.as_ref()
    }

    #[must_use]
    pub fn goals(&self) -> &Goals {
        &self.state.goals
    }

    #[must_use]
    pub fn preferences(&self) -> &Preferences {
        &self.state.preferences
    }

    #[must_use]
    pub fn short_term_goal(&self) -> Option<&ShortTermGoal> {
        self.state.short_term_goal.as_ref()
    }

    #[must_use]
    pub fn meal_library(&self) -> &[MealLibraryEntry] {
        &self.state.meal_library
    }

    #[must_use]
    pub fn cloud(&self) -> &CloudSyncState {
        &self.cloud
    }

    // --- Internals ---

    fn rebuild_totals(&mut self) {
        self.totals = self
            .state
            .meals_by_date
            .iter()
            .map(|(date, meals)| (*date, DailyTotals::from_meals(meals)))
            .collect();
    }

    fn recompute_date(&mut self, date: NaiveDate) {
        match self.state.meals_by_date.get(&date) {
            Some(meals) => {
                self.totals.insert(date, DailyTotals::from_meals(meals));
            }
            None => {
                self.totals.remove(&date);
            }
        }
    }

    fn persist(&self) -> Result<()> {
        self.db
            .save_state(&self.state, &self.cloud.settings())
            .context("Failed to persist diet state")
    }

    fn notify(&self) {
        if let Some(hook) = &self.on_change {
            hook(&self.cloud);
        }
    }

    /// Persist and announce a completed mutation.
    fn commit(&self) -> Result<()> {
        self.persist()?;
        self.notify();
        Ok(())
    }

    // --- Profile, goals, preferences ---

    /// Replace the profile wholesale. Energy fields are taken as given.
    pub fn set_profile(&mut self, profile: Profile) -> Result<()> {
        self.state.profile = Some(profile);
        self.commit()
    }

    pub fn set_goals(&mut self, patch: GoalsPatch) -> Result<()> {
        validate_goals(&patch)?;
        self.state.goals.merge(patch);
        self.commit()
    }

    pub fn set_preference(&mut self, key: &str, value: Value) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            bail!("Preference key must not be empty");
        }
        if key == DARK_MODE_KEY {
            let Some(enabled) = value.as_bool() else {
                bail!("{DARK_MODE_KEY} must be true or false");
            };
            self.state.preferences.dark_mode = enabled;
        } else {
            self.state.preferences.extra.insert(key.to_string(), value);
        }
        self.commit()
    }

    pub fn toggle_dark_mode(&mut self) -> Result<bool> {
        self.state.preferences.dark_mode = !self.state.preferences.dark_mode;
        self.commit()?;
        Ok(self.state.preferences.dark_mode)
    }

    pub fn set_short_term_goal(&mut self, goal: Option<ShortTermGoal>) -> Result<()> {
        if let Some(g) = &goal {
            validate_weight(g.target_weight)?;
            if g.target_weeks == 0 {
                bail!("Target weeks must be at least 1");
            }
        }
        self.state.short_term_goal = goal;
        self.commit()
    }

    // --- Meal library ---

    pub fn add_preset(&mut self, preset: NewPreset) -> Result<MealLibraryEntry> {
        let entry = preset.into_entry()?;
        self.state.meal_library.push(entry.clone());
        self.commit()?;
        Ok(entry)
    }

    pub fn remove_preset(&mut self, id: &str) -> Result<bool> {
        let before = self.state.meal_library.len();
        self.state.meal_library.retain(|p| p.id != id);
        if self.state.meal_library.len() == before {
            return Ok(false);
        }
        self.commit()?;
        Ok(true)
    }

    pub fn set_meal_library(&mut self, library: Vec<MealLibraryEntry>) -> Result<()> {
        for entry in &library {
            validate_macros(entry.protein, entry.fat, entry.carb, Some(entry.kcal))?;
        }
        self.state.meal_library = library;
        self.commit()
    }

    pub fn clear_meal_library(&mut self) -> Result<()> {
        self.set_meal_library(Vec::new())
    }

    #[must_use]
    pub fn find_preset(&self, id: &str) -> Option<&MealLibraryEntry> {
        self.state.meal_library.iter().find(|p| p.id == id)
    }

    /// Case-insensitive substring match on preset names.
    #[must_use]
    pub fn search_library(&self, query: &str) -> Vec<&MealLibraryEntry> {
        let needle = query.trim().to_lowercase();
        self.state
            .meal_library
            .iter()
            .filter(|p| needle.is_empty() || p.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Log a preset as a meal for today.
    pub fn apply_preset(&mut self, id: &str, meal_type: MealType) -> Result<MealEntry> {
        self.apply_preset_for_date(id, meal_type, today())
    }

    pub fn apply_preset_for_date(
        &mut self,
        id: &str,
        meal_type: MealType,
        date: NaiveDate,
    ) -> Result<MealEntry> {
        let Some(preset) = self.find_preset(id) else {
            bail!("Preset not found: {id}");
        };
        let meal = NewMeal {
            meal_type,
            name: Some(preset.name.clone()),
            protein: preset.protein,
            fat: preset.fat,
            carb: preset.carb,
            kcal: Some(preset.kcal),
            photo: None,
        };
        self.add_meal_for_date(date, meal)
    }

    #[must_use]
    pub fn export_meal_library(&self) -> Vec<LibraryItem> {
        self.state.meal_library.iter().map(LibraryItem::from).collect()
    }

    pub fn export_meal_library_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.export_meal_library())
            .context("Failed to encode meal library")
    }

    /// Replace the library from the id-less interchange format. Ids are
    /// regenerated; a zero or missing kcal is derived from the macros.
    pub fn import_meal_library_json(&mut self, json: &str) -> Result<usize> {
        let value: Value = serde_json::from_str(json).context("Meal library is not valid JSON")?;
        let Value::Array(items) = value else {
            bail!("Meal library import must be a JSON array");
        };
        let mut library = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let item: LibraryItem = serde_json::from_value(item)
                .with_context(|| format!("Invalid meal library item at position {i}"))?;
            validate_macros(item.protein, item.fat, item.carb, None)
                .with_context(|| format!("Invalid meal library item at position {i}"))?;
            let name = item
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNTITLED_PRESET.to_string());
            let kcal = if item.kcal.is_finite() && item.kcal > 0.0 {
                item.kcal
            } else {
                macros_to_energy(item.protein, item.fat, item.carb)
            };
            library.push(MealLibraryEntry {
                id: new_id(),
                name,
                protein: item.protein,
                fat: item.fat,
                carb: item.carb,
                kcal,
            });
        }
        let count = library.len();
        self.state.meal_library = library;
        self.commit()?;
        info!(count, "imported meal library");
        Ok(count)
    }

    // --- Meal log ---

    pub fn add_meal(&mut self, meal: NewMeal) -> Result<MealEntry> {
        self.add_meal_for_date(today(), meal)
    }

    pub fn add_meal_for_date(&mut self, date: NaiveDate, meal: NewMeal) -> Result<MealEntry> {
        let entry = meal.into_entry()?;
        self.state
            .meals_by_date
            .entry(date)
            .or_default()
            .push(entry.clone());
        self.recompute_date(date);
        self.commit()?;
        Ok(entry)
    }

    #[must_use]
    pub fn meals_for(&self, date: NaiveDate) -> &[MealEntry] {
        self.state
            .meals_by_date
            .get(&date)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Remove by position. An index past the end is a no-op returning false.
    pub fn remove_meal(&mut self, date: NaiveDate, index: usize) -> Result<bool> {
        let Some(meals) = self.state.meals_by_date.get_mut(&date) else {
            return Ok(false);
        };
        if index >= meals.len() {
            return Ok(false);
        }
        meals.remove(index);
        self.recompute_date(date);
        self.commit()?;
        Ok(true)
    }

    /// Remove a meal wherever it is logged. Returns the date it was removed from.
    pub fn remove_meal_by_id(&mut self, id: &str) -> Result<Option<NaiveDate>> {
        let found = self.state.meals_by_date.iter().find_map(|(date, meals)| {
            meals.iter().position(|m| m.id == id).map(|pos| (*date, pos))
        });
        let Some((date, index)) = found else {
            return Ok(None);
        };
        self.remove_meal(date, index)?;
        Ok(Some(date))
    }

    /// Move one entry within a date. Equal or out-of-range indices leave the
    /// state untouched and return false.
    pub fn reorder_meals(&mut self, date: NaiveDate, from: usize, to: usize) -> Result<bool> {
        let Some(meals) = self.state.meals_by_date.get_mut(&date) else {
            return Ok(false);
        };
        if from == to || from >= meals.len() || to >= meals.len() {
            return Ok(false);
        }
        let entry = meals.remove(from);
        meals.insert(to, entry);
        self.recompute_date(date);
        self.commit()?;
        Ok(true)
    }

    pub fn move_meal_by_id(&mut self, date: NaiveDate, id: &str, to: usize) -> Result<bool> {
        let Some(from) = self.meals_for(date).iter().position(|m| m.id == id) else {
            return Ok(false);
        };
        self.reorder_meals(date, from, to)
    }

    // --- Totals & statistics ---

    #[must_use]
    pub fn totals_for(&self, date: NaiveDate) -> DailyTotals {
        self.totals.get(&date).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn today_totals(&self) -> DailyTotals {
        self.totals_for(today())
    }

    #[must_use]
    pub fn goal_progress(&self, date: NaiveDate) -> GoalProgress {
        GoalProgress::of(&self.totals_for(date), &self.state.goals)
    }

    /// One entry per calendar day in `[start, end]`, ascending. Empty when
    /// `start` is after `end`.
    #[must_use]
    pub fn get_date_range_stats(&self, start: NaiveDate, end: NaiveDate) -> Vec<DayStats> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|date| DayStats {
                date,
                totals: self.totals_for(date),
            })
            .collect()
    }

    /// Rounded per-day mean over the inclusive range; days without meals count as zero.
    #[must_use]
    pub fn range_averages(&self, start: NaiveDate, end: NaiveDate) -> DailyTotals {
        let days = self.get_date_range_stats(start, end);
        if days.is_empty() {
            return DailyTotals::default();
        }
        #[allow(clippy::cast_precision_loss)]
        let n = days.len() as f64;
        let sum = days.iter().fold(DailyTotals::default(), |acc, d| DailyTotals {
            protein: acc.protein + d.totals.protein,
            fat: acc.fat + d.totals.fat,
            carb: acc.carb + d.totals.carb,
            kcal: acc.kcal + d.totals.kcal,
        });
        DailyTotals {
            protein: (sum.protein / n).round(),
            fat: (sum.fat / n).round(),
            carb: (sum.carb / n).round(),
            kcal: (sum.kcal / n).round(),
        }
    }

    // --- Weight ---

    /// Upsert by date. The profile's weight follows the new record and its
    /// energy estimates are recomputed when every input is present.
    pub fn add_weight_record(&mut self, date: NaiveDate, weight: f64) -> Result<()> {
        validate_weight(weight)?;
        if let Some(existing) = self
            .state
            .weight_history
            .iter_mut()
            .find(|r| r.date == date)
        {
            existing.weight = weight;
        } else {
            self.state.weight_history.push(WeightRecord { date, weight });
        }
        if let Some(profile) = self.state.profile.as_mut() {
            profile.weight = Some(weight);
            profile.recompute_energy();
        }
        self.commit()
    }

    pub fn remove_weight_record(&mut self, date: NaiveDate) -> Result<bool> {
        let before = self.state.weight_history.len();
        self.state.weight_history.retain(|r| r.date != date);
        if self.state.weight_history.len() == before {
            return Ok(false);
        }
        self.commit()?;
        Ok(true)
    }

    #[must_use]
    pub fn weight_history_sorted(&self) -> Vec<WeightRecord> {
        let mut history = self.state.weight_history.clone();
        history.sort_by_key(|r| r.date);
        history
    }

    /// Latest minus earliest weight by date.
    #[must_use]
    pub fn weight_change(&self) -> Option<f64> {
        let first = self.state.weight_history.iter().min_by_key(|r| r.date)?;
        let last = self.state.weight_history.iter().max_by_key(|r| r.date)?;
        Some(last.weight - first.weight)
    }

    // --- Backup ---

    #[must_use]
    pub fn export_all(&self) -> BackupPayload {
        BackupPayload {
            version: BACKUP_VERSION,
            exported_at: Utc::now(),
            state: self.state.clone(),
        }
    }

    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.export_all()).context("Failed to encode backup")
    }

    /// Replace every persisted field from serialized backup text.
    pub fn import_json(&mut self, json: &str) -> Result<ImportSummary> {
        let value: Value = serde_json::from_str(json).context("Backup is not valid JSON")?;
        self.import_value(value)
    }

    /// Replace every persisted field from a parsed backup. Nothing is touched
    /// unless the whole payload decodes.
    pub fn import_value(&mut self, value: Value) -> Result<ImportSummary> {
        let state = decode_backup(value)?;
        let summary = self.install(state);
        self.commit()?;
        info!(
            days = summary.meal_days,
            entries = summary.meal_entries,
            "imported backup"
        );
        Ok(summary)
    }

    /// Overwrite local state with a remote copy. Persists but does not fire
    /// the change hook, so a pull never schedules a push of what it just fetched.
    pub fn replace_from_remote(&mut self, value: Value) -> Result<ImportSummary> {
        let state = decode_backup(value)?;
        let summary = self.install(state);
        self.persist()?;
        Ok(summary)
    }

    fn install(&mut self, state: DietState) -> ImportSummary {
        let summary = ImportSummary::of(&state);
        self.state = state;
        self.rebuild_totals();
        summary
    }

    /// Reset every persisted field and drop the durable slot. Cloud settings
    /// survive: if they differ from the defaults they are written back next
    /// to the empty state. No push is scheduled.
    pub fn clear_all(&mut self) -> Result<()> {
        self.state = DietState::default();
        self.totals.clear();
        self.db.clear_state()?;
        if self.cloud.settings() != CloudSettings::default() {
            self.persist()?;
        }
        info!("cleared all diet data");
        Ok(())
    }

    // --- Cloud settings ---

    /// Merge user edits into the cloud settings. Persisted, never triggers a push.
    pub fn set_cloud(&mut self, patch: CloudPatch) -> Result<()> {
        if let Some(enabled) = patch.enabled {
            self.cloud.enabled = enabled;
        }
        if let Some(user_id) = patch.user_id {
            self.cloud.user_id = user_id
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty());
        }
        if let Some(auto) = patch.auto {
            self.cloud.auto = auto;
        }
        self.persist()
    }

    /// Apply a status change from the sync controller. Persists only when a
    /// durable field changed.
    pub fn update_cloud(&mut self, f: impl FnOnce(&mut CloudSyncState)) {
        let before = self.cloud.settings();
        f(&mut self.cloud);
        if self.cloud.settings() != before {
            if let Err(e) = self.persist() {
                warn!(error = %e, "failed to persist cloud settings");
            }
        }
    }
}

fn decode_backup(value: Value) -> Result<DietState> {
    if !value.is_object() {
        bail!("Backup data must be a JSON object");
    }
    let payload: BackupPayload =
        serde_json::from_value(value).context("Backup data has an invalid shape")?;
    if payload.version != BACKUP_VERSION {
        debug!(version = payload.version, "importing backup with unexpected version");
    }
    Ok(payload.state)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::models::{ActivityLevel, Gender, GoalType, parse_date};

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn meal(meal_type: MealType, protein: f64, fat: f64, carb: f64) -> NewMeal {
        NewMeal {
            meal_type,
            protein,
            fat,
            carb,
            ..NewMeal::default()
        }
    }

    fn assert_totals_consistent(store: &DietStore, d: NaiveDate) {
        let expected = DailyTotals::from_meals(store.meals_for(d));
        assert_eq!(store.totals_for(d), expected);
    }

    fn counting_hook(store: &mut DietStore) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        store.set_change_hook(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        calls
    }

    #[test]
    fn test_add_meal_for_date_updates_totals() {
        let mut store = DietStore::in_memory().unwrap();
        let d = date("2024-06-15");
        store
            .add_meal_for_date(d, meal(MealType::Breakfast, 20.0, 10.0, 50.0))
            .unwrap();
        store
            .add_meal_for_date(d, meal(MealType::Lunch, 30.0, 10.0, 40.0))
            .unwrap();

        let totals = store.totals_for(d);
        assert_eq!(totals.protein, 50.0);
        assert_eq!(totals.fat, 20.0);
        assert_eq!(totals.carb, 90.0);
        assert_eq!(totals.kcal, 370.0 + 370.0);
        assert_totals_consistent(&store, d);
        assert_eq!(store.totals_for(date("2024-06-16")), DailyTotals::default());
    }

    #[test]
    fn test_invalid_meal_never_enters_store() {
        let mut store = DietStore::in_memory().unwrap();
        let d = date("2024-06-15");
        let calls = counting_hook(&mut store);
        assert!(
            store
                .add_meal_for_date(d, meal(MealType::Lunch, -5.0, 0.0, 0.0))
                .is_err()
        );
        assert!(store.meals_for(d).is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_totals_hold_after_every_operation() {
        let mut store = DietStore::in_memory().unwrap();
        let d = date("2024-06-15");
        for (i, t) in [MealType::Breakfast, MealType::Lunch, MealType::Dinner, MealType::Snack]
            .into_iter()
            .enumerate()
        {
            #[allow(clippy::cast_precision_loss)]
            let g = i as f64;
            store
                .add_meal_for_date(d, meal(t, 10.0 + g, 2.0 * g, 30.0))
                .unwrap();
            assert_totals_consistent(&store, d);
        }
        assert!(store.reorder_meals(d, 0, 3).unwrap());
        assert_totals_consistent(&store, d);
        assert!(store.remove_meal(d, 1).unwrap());
        assert_totals_consistent(&store, d);
        assert!(store.reorder_meals(d, 2, 0).unwrap());
        assert_totals_consistent(&store, d);
        assert!(store.remove_meal(d, 0).unwrap());
        assert!(store.remove_meal(d, 0).unwrap());
        assert!(store.remove_meal(d, 0).unwrap());
        assert_totals_consistent(&store, d);
        assert_eq!(store.totals_for(d), DailyTotals::default());
    }

    #[test]
    fn test_remove_meal_out_of_range_is_noop() {
        let mut store = DietStore::in_memory().unwrap();
        let d = date("2024-06-15");
        store
            .add_meal_for_date(d, meal(MealType::Lunch, 10.0, 0.0, 0.0))
            .unwrap();
        let calls = counting_hook(&mut store);
        assert!(!store.remove_meal(d, 5).unwrap());
        assert!(!store.remove_meal(date("2024-01-01"), 0).unwrap());
        assert_eq!(store.meals_for(d).len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reorder_same_index_is_noop() {
        let mut store = DietStore::in_memory().unwrap();
        let d = date("2024-06-15");
        store
            .add_meal_for_date(d, meal(MealType::Breakfast, 10.0, 0.0, 0.0))
            .unwrap();
        store
            .add_meal_for_date(d, meal(MealType::Dinner, 20.0, 0.0, 0.0))
            .unwrap();
        let before = store.export_all().state;
        let calls = counting_hook(&mut store);

        assert!(!store.reorder_meals(d, 1, 1).unwrap());
        assert!(!store.reorder_meals(d, 0, 9).unwrap());
        assert_eq!(store.export_all().state, before);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reorder_moves_entry() {
        let mut store = DietStore::in_memory().unwrap();
        let d = date("2024-06-15");
        let a = store
            .add_meal_for_date(d, meal(MealType::Breakfast, 1.0, 0.0, 0.0))
            .unwrap();
        let b = store
            .add_meal_for_date(d, meal(MealType::Lunch, 2.0, 0.0, 0.0))
            .unwrap();
        let c = store
            .add_meal_for_date(d, meal(MealType::Dinner, 3.0, 0.0, 0.0))
            .unwrap();

        assert!(store.reorder_meals(d, 0, 2).unwrap());
        let ids: Vec<&str> = store.meals_for(d).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![b.id.as_str(), c.id.as_str(), a.id.as_str()]);

        assert!(store.move_meal_by_id(d, &a.id, 0).unwrap());
        assert_eq!(store.meals_for(d)[0].id, a.id);
        assert!(!store.move_meal_by_id(d, "missing", 0).unwrap());
    }

    #[test]
    fn test_remove_meal_by_id() {
        let mut store = DietStore::in_memory().unwrap();
        let d1 = date("2024-06-14");
        let d2 = date("2024-06-15");
        store
            .add_meal_for_date(d1, meal(MealType::Lunch, 10.0, 0.0, 0.0))
            .unwrap();
        let target = store
            .add_meal_for_date(d2, meal(MealType::Dinner, 25.0, 5.0, 0.0))
            .unwrap();

        assert_eq!(store.remove_meal_by_id(&target.id).unwrap(), Some(d2));
        assert!(store.meals_for(d2).is_empty());
        assert_eq!(store.meals_for(d1).len(), 1);
        assert_eq!(store.remove_meal_by_id(&target.id).unwrap(), None);
        assert_totals_consistent(&store, d2);
    }

    #[test]
    fn test_weight_upsert_keeps_latest_value() {
        let mut store = DietStore::in_memory().unwrap();
        let d = date("2024-06-15");
        store.add_weight_record(d, 80.0).unwrap();
        store.add_weight_record(d, 79.4).unwrap();
        let on_date: Vec<_> = store
            .state()
            .weight_history
            .iter()
            .filter(|r| r.date == d)
            .collect();
        assert_eq!(on_date.len(), 1);
        assert_eq!(on_date[0].weight, 79.4);
    }

    #[test]
    fn test_weight_record_updates_profile_energy() {
        let mut store = DietStore::in_memory().unwrap();
        store
            .set_profile(Profile::new(
                "Ann",
                175.0,
                70.0,
                30,
                Gender::Male,
                ActivityLevel::Sedentary,
            ))
            .unwrap();
        store.add_weight_record(date("2024-06-15"), 80.0).unwrap();

        let profile = store.profile().unwrap();
        assert_eq!(profile.weight, Some(80.0));
        assert_eq!(profile.bmr, Some(1749.0));
        assert_eq!(profile.tdee, Some(2099.0));
    }

    #[test]
    fn test_weight_record_without_full_profile_keeps_energy() {
        let mut store = DietStore::in_memory().unwrap();
        store
            .set_profile(Profile {
                name: "Bo".to_string(),
                weight: Some(60.0),
                bmr: Some(1300.0),
                tdee: Some(1600.0),
                ..Profile::default()
            })
            .unwrap();
        store.add_weight_record(date("2024-06-15"), 61.0).unwrap();
        let profile = store.profile().unwrap();
        assert_eq!(profile.weight, Some(61.0));
        assert_eq!(profile.bmr, Some(1300.0));
        assert_eq!(profile.tdee, Some(1600.0));
    }

    #[test]
    fn test_weight_rejects_non_positive() {
        let mut store = DietStore::in_memory().unwrap();
        assert!(store.add_weight_record(date("2024-06-15"), 0.0).is_err());
        assert!(store.state().weight_history.is_empty());
    }

    #[test]
    fn test_weight_history_sorted_and_change() {
        let mut store = DietStore::in_memory().unwrap();
        store.add_weight_record(date("2024-06-20"), 78.0).unwrap();
        store.add_weight_record(date("2024-06-01"), 81.0).unwrap();
        store.add_weight_record(date("2024-06-10"), 80.0).unwrap();

        let sorted = store.weight_history_sorted();
        assert_eq!(sorted[0].date, date("2024-06-01"));
        assert_eq!(sorted[2].date, date("2024-06-20"));
        assert_eq!(store.weight_change(), Some(-3.0));

        assert!(store.remove_weight_record(date("2024-06-01")).unwrap());
        assert!(!store.remove_weight_record(date("2024-06-01")).unwrap());
        assert_eq!(store.weight_change(), Some(-2.0));
    }

    #[test]
    fn test_range_stats_empty_day() {
        let store = DietStore::in_memory().unwrap();
        let d = date("2024-06-15");
        let stats = store.get_date_range_stats(d, d);
        assert_eq!(
            stats,
            vec![DayStats {
                date: d,
                totals: DailyTotals::default()
            }]
        );
    }

    #[test]
    fn test_range_stats_inclusive_and_ordered() {
        let mut store = DietStore::in_memory().unwrap();
        store
            .add_meal_for_date(date("2024-02-28"), meal(MealType::Lunch, 10.0, 0.0, 0.0))
            .unwrap();
        store
            .add_meal_for_date(date("2024-03-01"), meal(MealType::Lunch, 20.0, 0.0, 0.0))
            .unwrap();

        let stats = store.get_date_range_stats(date("2024-02-28"), date("2024-03-01"));
        let dates: Vec<NaiveDate> = stats.iter().map(|s| s.date).collect();
        assert_eq!(
            dates,
            vec![date("2024-02-28"), date("2024-02-29"), date("2024-03-01")]
        );
        assert_eq!(stats[0].totals.protein, 10.0);
        assert_eq!(stats[1].totals.protein, 0.0);
        assert_eq!(stats[2].totals.protein, 20.0);

        assert!(
            store
                .get_date_range_stats(date("2024-03-02"), date("2024-03-01"))
                .is_empty()
        );

        let avg = store.range_averages(date("2024-02-28"), date("2024-03-01"));
        assert_eq!(avg.protein, 10.0);
        assert_eq!(avg.kcal, 40.0);
    }

    #[test]
    fn test_set_goals_merges() {
        let mut store = DietStore::in_memory().unwrap();
        store
            .set_goals(GoalsPatch {
                protein: Some(150.0),
                kcal: Some(2200.0),
                ..GoalsPatch::default()
            })
            .unwrap();
        store
            .set_goals(GoalsPatch {
                fat: Some(70.0),
                ..GoalsPatch::default()
            })
            .unwrap();
        let goals = store.goals();
        assert_eq!(goals.protein, 150.0);
        assert_eq!(goals.fat, 70.0);
        assert_eq!(goals.carb, 0.0);
        assert_eq!(goals.kcal, 2200.0);

        assert!(
            store
                .set_goals(GoalsPatch {
                    carb: Some(-1.0),
                    ..GoalsPatch::default()
                })
                .is_err()
        );
        assert_eq!(store.goals().carb, 0.0);
    }

    #[test]
    fn test_preferences() {
        let mut store = DietStore::in_memory().unwrap();
        assert!(store.preferences().dark_mode);
        assert!(!store.toggle_dark_mode().unwrap());
        store.set_preference("units", json!("imperial")).unwrap();
        store.set_preference(DARK_MODE_KEY, json!(true)).unwrap();
        assert!(store.preferences().dark_mode);
        assert_eq!(store.preferences().extra["units"], "imperial");
        assert!(store.set_preference(DARK_MODE_KEY, json!("yes")).is_err());
        assert!(store.set_preference(" ", json!(1)).is_err());
    }

    #[test]
    fn test_short_term_goal_validation() {
        let mut store = DietStore::in_memory().unwrap();
        let goal = ShortTermGoal {
            target_weight: 65.0,
            target_weeks: 0,
            goal_type: GoalType::WeightLoss,
        };
        assert!(store.set_short_term_goal(Some(goal)).is_err());
        store
            .set_short_term_goal(Some(ShortTermGoal {
                target_weeks: 6,
                ..goal
            }))
            .unwrap();
        assert_eq!(store.short_term_goal().unwrap().target_weeks, 6);
        store.set_short_term_goal(None).unwrap();
        assert!(store.short_term_goal().is_none());
    }

    #[test]
    fn test_library_add_search_remove_apply() {
        let mut store = DietStore::in_memory().unwrap();
        let oats = store
            .add_preset(NewPreset {
                name: "Overnight Oats".to_string(),
                protein: 15.0,
                fat: 8.0,
                carb: 55.0,
                kcal: None,
            })
            .unwrap();
        store
            .add_preset(NewPreset {
                name: "Chicken Bowl".to_string(),
                protein: 45.0,
                fat: 12.0,
                carb: 60.0,
                kcal: Some(550.0),
            })
            .unwrap();
        assert_eq!(oats.kcal, 352.0);

        let hits = store.search_library("oAtS");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, oats.id);
        assert_eq!(store.search_library("").len(), 2);

        let d = date("2024-06-15");
        let logged = store
            .apply_preset_for_date(&oats.id, MealType::Breakfast, d)
            .unwrap();
        assert_eq!(logged.name.as_deref(), Some("Overnight Oats"));
        assert_eq!(logged.kcal, 352.0);
        assert_eq!(store.totals_for(d).kcal, 352.0);
        assert!(
            store
                .apply_preset_for_date("nope", MealType::Lunch, d)
                .is_err()
        );

        assert!(store.remove_preset(&oats.id).unwrap());
        assert!(!store.remove_preset(&oats.id).unwrap());
        assert_eq!(store.meal_library().len(), 1);

        store.clear_meal_library().unwrap();
        assert!(store.meal_library().is_empty());
    }

    #[test]
    fn test_library_interchange() {
        let mut store = DietStore::in_memory().unwrap();
        let json = r#"[
            {"name": "Yogurt", "protein": 10, "fat": 3, "carb": 12, "kcal": 0},
            {"protein": 5, "fat": 0, "carb": 0, "kcal": 30},
            {"name": "Rice", "protein": 4, "fat": 0.5, "carb": 45}
        ]"#;
        assert_eq!(store.import_meal_library_json(json).unwrap(), 3);
        let lib = store.meal_library();
        assert_eq!(lib[0].kcal, 115.0);
        assert_eq!(lib[1].name, UNTITLED_PRESET);
        assert_eq!(lib[1].kcal, 30.0);
        assert_eq!(lib[2].kcal, 201.0);
        assert_ne!(lib[0].id, lib[1].id);

        let exported: Value =
            serde_json::from_str(&store.export_meal_library_json().unwrap()).unwrap();
        assert!(exported[0].get("id").is_none());
        assert_eq!(exported[0]["name"], "Yogurt");

        assert!(store.import_meal_library_json(r#"{"name":"x"}"#).is_err());
        assert!(
            store
                .import_meal_library_json(r#"[{"name":"bad","protein":-1}]"#)
                .is_err()
        );
        assert_eq!(store.meal_library().len(), 3);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut store = DietStore::in_memory().unwrap();
        store
            .set_profile(Profile::new(
                "Ann",
                168.0,
                62.0,
                34,
                Gender::Female,
                ActivityLevel::Moderate,
            ))
            .unwrap();
        store
            .set_goals(GoalsPatch::from(Goals {
                protein: 110.0,
                fat: 60.0,
                carb: 200.0,
                kcal: 1850.0,
            }))
            .unwrap();
        store
            .add_meal_for_date(
                date("2024-06-15"),
                NewMeal {
                    meal_type: MealType::Dinner,
                    name: Some("Salmon".to_string()),
                    protein: 35.0,
                    fat: 18.0,
                    carb: 5.0,
                    kcal: Some(400.0),
                    photo: Some("data:image/png;base64,AAAA".to_string()),
                },
            )
            .unwrap();
        store.add_weight_record(date("2024-06-15"), 61.5).unwrap();
        store.set_preference("units", json!("metric")).unwrap();

        let exported = store.export_json().unwrap();
        let first: Value = serde_json::from_str(&exported).unwrap();

        let mut other = DietStore::in_memory().unwrap();
        other.import_json(&exported).unwrap();
        let second = serde_json::to_value(other.export_all()).unwrap();

        let strip = |mut v: Value| {
            v.as_object_mut().unwrap().remove("exportedAt");
            v
        };
        assert_eq!(strip(first), strip(second));
        assert_eq!(
            other.totals_for(date("2024-06-15")),
            store.totals_for(date("2024-06-15"))
        );
    }

    #[test]
    fn test_import_defaults_missing_fields() {
        let mut store = DietStore::in_memory().unwrap();
        store.add_weight_record(date("2024-06-15"), 70.0).unwrap();
        let summary = store
            .import_json(r#"{"mealsByDate":{"2024-06-15":[{"type":"lunch","protein":10,"fat":0,"carb":0,"kcal":40}]}}"#)
            .unwrap();
        assert_eq!(summary.meal_days, 1);
        assert_eq!(summary.meal_entries, 1);
        assert!(store.state().weight_history.is_empty());
        assert!(store.preferences().dark_mode);
        assert_eq!(*store.goals(), Goals::default());
        assert_eq!(store.totals_for(date("2024-06-15")).kcal, 40.0);
    }

    #[test]
    fn test_import_failure_leaves_state_untouched() {
        let mut store = DietStore::in_memory().unwrap();
        store
            .add_meal_for_date(date("2024-06-15"), meal(MealType::Lunch, 10.0, 0.0, 0.0))
            .unwrap();
        let before = store.export_all().state;

        assert!(store.import_json("not json").is_err());
        assert!(store.import_json("[1,2,3]").is_err());
        assert!(store.import_json("\"text\"").is_err());
        assert!(
            store
                .import_json(r#"{"mealsByDate":{"2024-06-16":"oops"}}"#)
                .is_err()
        );
        assert_eq!(store.export_all().state, before);
    }

    #[test]
    fn test_import_fires_hook_but_remote_replace_does_not() {
        let mut store = DietStore::in_memory().unwrap();
        let calls = counting_hook(&mut store);
        store.import_value(json!({"goals": {"kcal": 1800}})).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        store
            .replace_from_remote(json!({"goals": {"kcal": 2000}}))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.goals().kcal, 2000.0);
    }

    #[test]
    fn test_state_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diet.db");
        let d = date("2024-06-15");
        {
            let mut store = DietStore::open(Database::open(&path).unwrap()).unwrap();
            store
                .add_meal_for_date(d, meal(MealType::Lunch, 30.0, 10.0, 40.0))
                .unwrap();
            store
                .set_cloud(CloudPatch {
                    user_id: Some(Some("user-1".to_string())),
                    auto: Some(false),
                    ..CloudPatch::default()
                })
                .unwrap();
        }
        let store = DietStore::open(Database::open(&path).unwrap()).unwrap();
        assert_eq!(store.totals_for(d).kcal, 370.0);
        assert_eq!(store.cloud().user_id.as_deref(), Some("user-1"));
        assert!(!store.cloud().auto);
        assert!(!store.cloud().syncing);
    }

    #[test]
    fn test_clear_all_removes_slot_without_hook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diet.db");
        let mut store = DietStore::open(Database::open(&path).unwrap()).unwrap();
        store
            .add_meal_for_date(date("2024-06-15"), meal(MealType::Lunch, 30.0, 10.0, 40.0))
            .unwrap();
        store.toggle_dark_mode().unwrap();
        let calls = counting_hook(&mut store);

        store.clear_all().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*store.state(), DietState::default());
        assert!(store.preferences().dark_mode);
        assert_eq!(store.totals_for(date("2024-06-15")), DailyTotals::default());

        let db = Database::open(&path).unwrap();
        assert!(db.load_state().unwrap().is_none());
    }

    #[test]
    fn test_clear_all_keeps_cloud_settings_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diet.db");
        let mut store = DietStore::open(Database::open(&path).unwrap()).unwrap();
        store
            .set_cloud(CloudPatch {
                user_id: Some(Some("user-1".to_string())),
                auto: Some(false),
                ..CloudPatch::default()
            })
            .unwrap();
        store
            .add_meal_for_date(date("2024-06-15"), meal(MealType::Lunch, 30.0, 10.0, 40.0))
            .unwrap();
        let calls = counting_hook(&mut store);

        store.clear_all().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let reopened = DietStore::open(Database::open(&path).unwrap()).unwrap();
        assert_eq!(*reopened.state(), DietState::default());
        assert_eq!(reopened.cloud().user_id.as_deref(), Some("user-1"));
        assert!(!reopened.cloud().auto);
    }

    #[test]
    fn test_set_cloud_blank_user_clears_id() {
        let mut store = DietStore::in_memory().unwrap();
        let calls = counting_hook(&mut store);
        store
            .set_cloud(CloudPatch {
                user_id: Some(Some("  ".to_string())),
                ..CloudPatch::default()
            })
            .unwrap();
        assert!(store.cloud().user_id.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
