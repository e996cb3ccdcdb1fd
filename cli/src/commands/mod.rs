mod backup;
mod cloud;
mod goals;
mod helpers;
mod library;
mod meal;
mod prefs;
mod profile;
mod stats;
mod suggest;
mod summary;
mod weight;

use std::sync::PoisonError;

use dietlog_core::store::{DietStore, SharedStore};

pub(crate) use backup::{cmd_backup_export, cmd_backup_import, cmd_reset};
pub(crate) use cloud::{cmd_cloud_config, cmd_cloud_pull, cmd_cloud_push, cmd_cloud_status, cmd_cloud_test};
pub(crate) use goals::{
    ShortTermArgs, cmd_goals_set, cmd_goals_short_term, cmd_goals_show, cmd_goals_split,
};
pub(crate) use helpers::parse_on_off;
pub(crate) use library::{
    cmd_library_add, cmd_library_apply, cmd_library_clear, cmd_library_export, cmd_library_import,
    cmd_library_list, cmd_library_remove,
};
pub(crate) use meal::{LogArgs, cmd_log, cmd_meals_list, cmd_meals_move, cmd_meals_remove};
pub(crate) use prefs::{cmd_prefs_dark_mode, cmd_prefs_set, cmd_prefs_show};
pub(crate) use profile::{ProfileUpdate, cmd_profile_set, cmd_profile_show};
pub(crate) use stats::cmd_stats;
pub(crate) use suggest::{SuggestArgs, cmd_suggest, cmd_suggest_llm};
pub(crate) use summary::cmd_summary;
pub(crate) use weight::{cmd_weight_history, cmd_weight_log, cmd_weight_remove};

/// Run a synchronous command against the locked store. The guard never
/// outlives the call, so it is never held across an await.
pub(crate) fn with_store<T>(store: &SharedStore, f: impl FnOnce(&mut DietStore) -> T) -> T {
    let mut guard = store.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}
