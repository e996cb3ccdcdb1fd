use anyhow::{Result, bail};

use dietlog_core::models::{ActivityLevel, Gender, Profile};
use dietlog_core::store::DietStore;

use super::helpers::json_error;

/// Fields to change; `None` keeps the stored value.
#[derive(Default)]
pub(crate) struct ProfileUpdate {
    pub name: Option<String>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub activity: Option<String>,
}

impl ProfileUpdate {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.height.is_none()
            && self.weight.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.activity.is_none()
    }

    fn apply(self, profile: &mut Profile) -> Result<()> {
        if let Some(h) = self.height {
            if h <= 0.0 {
                bail!("Height must be greater than 0");
            }
            profile.height = Some(h);
        }
        if let Some(w) = self.weight {
            if w <= 0.0 {
                bail!("Weight must be greater than 0");
            }
            profile.weight = Some(w);
        }
        if let Some(a) = self.age {
            if a == 0 {
                bail!("Age must be greater than 0");
            }
            profile.age = Some(a);
        }
        if let Some(g) = self.gender {
            profile.gender = Some(g.parse::<Gender>()?);
        }
        if let Some(a) = self.activity {
            profile.activity_level = Some(a.parse::<ActivityLevel>()?);
        }
        if let Some(n) = self.name {
            profile.name = n.trim().to_string();
        }
        Ok(())
    }
}

pub(crate) fn cmd_profile_set(store: &mut DietStore, update: ProfileUpdate, json: bool) -> Result<()> {
    if update.is_empty() {
        bail!("Nothing to update. Pass at least one of --name, --height, --weight, --age, --gender, --activity");
    }

    let mut profile = store.profile().cloned().unwrap_or_default();
    update.apply(&mut profile)?;
    let derived = profile.recompute_energy();
    store.set_profile(profile.clone())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        print_profile(&profile);
        if !derived {
            eprintln!("Note: BMR/TDEE need gender, height, weight, age and activity level");
        }
    }
    Ok(())
}

pub(crate) fn cmd_profile_show(store: &DietStore, json: bool) -> Result<()> {
    match store.profile() {
        Some(profile) if json => println!("{}", serde_json::to_string_pretty(profile)?),
        Some(profile) => print_profile(profile),
        None if json => println!("{}", json_error("No profile set")),
        None => eprintln!("No profile set. Use `dietlog profile set` to create one."),
    }
    Ok(())
}

fn print_profile(p: &Profile) {
    let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    if !p.name.is_empty() {
        println!("Name:      {}", p.name);
    }
    println!("Height:    {}", or_dash(p.height.map(|h| format!("{h:.0} cm"))));
    println!("Weight:    {}", or_dash(p.weight.map(|w| format!("{w:.1} kg"))));
    println!("Age:       {}", or_dash(p.age.map(|a| a.to_string())));
    println!("Gender:    {}", or_dash(p.gender.map(|g| g.to_string())));
    println!("Activity:  {}", or_dash(p.activity_level.map(|a| a.to_string())));
    println!("BMR:       {}", or_dash(p.bmr.map(|b| format!("{b:.0} kcal"))));
    println!("TDEE:      {}", or_dash(p.tdee.map(|t| format!("{t:.0} kcal"))));
}
