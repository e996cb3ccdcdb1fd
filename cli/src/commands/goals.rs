use anyhow::{Context, Result, bail};
use serde::Serialize;

use dietlog_core::models::{GoalType, Goals, GoalsPatch, ShortTermGoal};
use dietlog_core::nutrition::{GoalPreset, MacroSplit, goals_from_split, short_term_kcal};
use dietlog_core::store::DietStore;

fn print_goals(goals: &Goals) {
    println!(
        "Goals: {:.0} kcal | P:{:.0}g F:{:.0}g C:{:.0}g",
        goals.kcal, goals.protein, goals.fat, goals.carb
    );
}

pub(crate) fn cmd_goals_set(store: &mut DietStore, patch: GoalsPatch, json: bool) -> Result<()> {
    if patch.protein.is_none() && patch.fat.is_none() && patch.carb.is_none() && patch.kcal.is_none()
    {
        bail!("Nothing to update. Pass at least one of --protein, --fat, --carb, --kcal");
    }
    store.set_goals(patch)?;

    if json {
        println!("{}", serde_json::to_string_pretty(store.goals())?);
    } else {
        print_goals(store.goals());
    }
    Ok(())
}

/// Energy target for split-based goals: explicit, else the profile's TDEE.
fn target_kcal(store: &DietStore, kcal: Option<f64>) -> Result<f64> {
    if let Some(k) = kcal {
        if !k.is_finite() || k <= 0.0 {
            bail!("Energy target must be greater than 0");
        }
        return Ok(k);
    }
    store
        .profile()
        .and_then(|p| p.tdee)
        .context("No energy target. Pass --kcal or complete your profile so TDEE can be estimated")
}

pub(crate) fn cmd_goals_split(
    store: &mut DietStore,
    kcal: Option<f64>,
    preset: Option<String>,
    custom: [Option<f64>; 3],
    json: bool,
) -> Result<()> {
    let kcal = target_kcal(store, kcal)?;
    let mut split = match preset {
        Some(p) => p.parse::<GoalPreset>()?.split(),
        None => GoalPreset::Maintenance.split(),
    };
    let [protein_pct, fat_pct, carb_pct] = custom;
    if let Some(p) = protein_pct {
        split.protein_pct = p;
    }
    if let Some(f) = fat_pct {
        split.fat_pct = f;
    }
    if let Some(c) = carb_pct {
        split.carb_pct = c;
    }

    let goals = goals_from_split(kcal, split);
    store.set_goals(goals.into())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&goals)?);
    } else {
        println!(
            "Split {:.0}/{:.0}/{:.0} (protein/fat/carb %) of {kcal:.0} kcal",
            split.protein_pct, split.fat_pct, split.carb_pct
        );
        print_goals(&goals);
    }
    Ok(())
}

#[derive(Serialize)]
struct GoalsView<'a> {
    goals: &'a Goals,
    #[serde(rename = "shortTermGoal")]
    short_term_goal: Option<&'a ShortTermGoal>,
    #[serde(rename = "shortTermKcal")]
    short_term_kcal: Option<f64>,
}

/// Daily target for the stored short-term goal, when the profile allows it.
fn short_term_target(store: &DietStore) -> Option<f64> {
    let goal = store.short_term_goal()?;
    let profile = store.profile()?;
    Some(short_term_kcal(profile.tdee?, profile.weight?, goal))
}

pub(crate) fn cmd_goals_show(store: &DietStore, json: bool) -> Result<()> {
    let view = GoalsView {
        goals: store.goals(),
        short_term_goal: store.short_term_goal(),
        short_term_kcal: short_term_target(store),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    print_goals(view.goals);
    if let Some(g) = view.short_term_goal {
        println!(
            "Short-term: {} to {:.1} kg in {} weeks",
            g.goal_type, g.target_weight, g.target_weeks
        );
        match view.short_term_kcal {
            Some(k) => println!("  Daily target: {k:.0} kcal"),
            None => println!("  Daily target: complete your profile to estimate it"),
        }
    }
    Ok(())
}

fn preset_for(goal_type: GoalType) -> GoalPreset {
    match goal_type {
        GoalType::Maintenance => GoalPreset::Maintenance,
        GoalType::WeightLoss => GoalPreset::WeightLoss,
        GoalType::MuscleGain => GoalPreset::MuscleGain,
    }
}

pub(crate) struct ShortTermArgs {
    pub target_weight: Option<f64>,
    pub weeks: Option<u32>,
    pub goal_type: Option<String>,
    pub clear: bool,
    pub apply: bool,
}

pub(crate) fn cmd_goals_short_term(
    store: &mut DietStore,
    args: ShortTermArgs,
    json: bool,
) -> Result<()> {
    if args.clear {
        store.set_short_term_goal(None)?;
        if json {
            println!("{}", serde_json::json!({ "shortTermGoal": null }));
        } else {
            println!("Cleared short-term goal");
        }
        return Ok(());
    }

    let (Some(target_weight), Some(target_weeks)) = (args.target_weight, args.weeks) else {
        bail!("Pass --target-weight and --weeks (or --clear)");
    };
    let goal_type = match args.goal_type {
        Some(t) => t.parse::<GoalType>()?,
        None => GoalType::WeightLoss,
    };
    let goal = ShortTermGoal {
        target_weight,
        target_weeks,
        goal_type,
    };
    store.set_short_term_goal(Some(goal))?;

    let kcal = short_term_target(store);
    if args.apply {
        let kcal = kcal.context(
            "Cannot apply: the profile needs weight and a TDEE estimate for a daily target",
        )?;
        let split: MacroSplit = preset_for(goal_type).split();
        store.set_goals(goals_from_split(kcal, split).into())?;
    }

    if json {
        let view = GoalsView {
            goals: store.goals(),
            short_term_goal: store.short_term_goal(),
            short_term_kcal: kcal,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("Short-term: {goal_type} to {target_weight:.1} kg in {target_weeks} weeks");
        if let Some(k) = kcal {
            println!("  Daily target: {k:.0} kcal");
        }
        if args.apply {
            print_goals(store.goals());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dietlog_core::models::{ActivityLevel, Gender, Profile};

    fn store_with_profile() -> DietStore {
        let mut store = DietStore::in_memory().unwrap();
        let profile = Profile::new("", 175.0, 80.0, 30, Gender::Male, ActivityLevel::Sedentary);
        store.set_profile(profile).unwrap();
        store
    }

    #[test]
    fn test_goals_set_partial() {
        let mut store = DietStore::in_memory().unwrap();
        let patch = GoalsPatch {
            protein: Some(120.0),
            ..GoalsPatch::default()
        };
        cmd_goals_set(&mut store, patch, true).unwrap();
        assert_eq!(store.goals().protein, 120.0);
        assert_eq!(store.goals().kcal, 0.0);

        assert!(cmd_goals_set(&mut store, GoalsPatch::default(), true).is_err());
    }

    #[test]
    fn test_goals_split_explicit_kcal() {
        let mut store = DietStore::in_memory().unwrap();
        cmd_goals_split(&mut store, Some(2000.0), None, [None; 3], true).unwrap();
        let g = store.goals();
        assert_eq!(g.kcal, 2000.0);
        assert_eq!(g.protein, 125.0);
        assert_eq!(g.fat, 44.0);
        assert_eq!(g.carb, 275.0);
    }

    #[test]
    fn test_goals_split_falls_back_to_tdee() {
        let mut store = store_with_profile();
        let tdee = store.profile().unwrap().tdee.unwrap();
        cmd_goals_split(
            &mut store,
            None,
            Some("low-carb".to_string()),
            [None; 3],
            true,
        )
        .unwrap();
        assert_eq!(store.goals().kcal, tdee);

        let mut empty = DietStore::in_memory().unwrap();
        assert!(cmd_goals_split(&mut empty, None, None, [None; 3], true).is_err());
    }

    #[test]
    fn test_short_term_apply_sets_goals() {
        let mut store = store_with_profile();
        let tdee = store.profile().unwrap().tdee.unwrap();
        let args = ShortTermArgs {
            target_weight: Some(76.0),
            weeks: Some(8),
            goal_type: Some("weight-loss".to_string()),
            clear: false,
            apply: true,
        };
        cmd_goals_short_term(&mut store, args, true).unwrap();

        assert!(store.short_term_goal().is_some());
        // 4 kg over 8 weeks is 550 kcal/day below maintenance.
        assert_eq!(store.goals().kcal, (tdee - 550.0).max(1200.0).round());
    }

    #[test]
    fn test_short_term_clear_and_missing_args() {
        let mut store = store_with_profile();
        let args = ShortTermArgs {
            target_weight: Some(76.0),
            weeks: None,
            goal_type: None,
            clear: false,
            apply: false,
        };
        assert!(cmd_goals_short_term(&mut store, args, true).is_err());

        let args = ShortTermArgs {
            target_weight: None,
            weeks: None,
            goal_type: None,
            clear: true,
            apply: false,
        };
        cmd_goals_short_term(&mut store, args, true).unwrap();
        assert!(store.short_term_goal().is_none());
    }
}
