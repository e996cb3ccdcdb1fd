mod backup_client;
mod commands;
mod config;
mod llm;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::backup_client::RestBackupClient;
use crate::commands::{
    LogArgs, ProfileUpdate, ShortTermArgs, SuggestArgs, cmd_backup_export, cmd_backup_import,
    cmd_cloud_config, cmd_cloud_pull, cmd_cloud_push, cmd_cloud_status, cmd_cloud_test,
    cmd_goals_set, cmd_goals_short_term, cmd_goals_show, cmd_goals_split, cmd_library_add,
    cmd_library_apply, cmd_library_clear, cmd_library_export, cmd_library_import,
    cmd_library_list, cmd_library_remove, cmd_log, cmd_meals_list, cmd_meals_move,
    cmd_meals_remove, cmd_prefs_dark_mode, cmd_prefs_set, cmd_prefs_show, cmd_profile_set,
    cmd_profile_show, cmd_reset, cmd_stats, cmd_suggest, cmd_suggest_llm, cmd_summary,
    cmd_weight_history, cmd_weight_log, cmd_weight_remove, parse_on_off, with_store,
};
use crate::config::Config;
use crate::llm::LlmClient;
use dietlog_core::db::Database;
use dietlog_core::models::{CloudPatch, GoalsPatch, NewPreset};
use dietlog_core::remote::BackupClient;
use dietlog_core::store::{DietStore, SharedStore};
use dietlog_core::suggest::DEFAULT_SUGGESTION_LIMIT;
use dietlog_core::sync::SyncController;

#[derive(Parser)]
#[command(
    name = "dietlog",
    version,
    about = "A local-first diet tracker with cloud backup",
    long_about = "Track meals and macros against daily goals. Data lives in a local \
                  SQLite file and can be mirrored to a REST backup endpoint."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage body metrics and energy estimates
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Manage daily macro and energy goals
    Goals {
        #[command(subcommand)]
        command: GoalsCommands,
    },
    /// Log a meal
    Log {
        /// Protein in grams
        #[arg(short, long)]
        protein: f64,
        /// Fat in grams
        #[arg(short, long)]
        fat: f64,
        /// Carbohydrate in grams
        #[arg(short, long)]
        carb: f64,
        /// Energy in kcal (derived from macros when omitted)
        #[arg(long)]
        kcal: Option<f64>,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short = 't', long = "type", default_value = "snack")]
        meal_type: String,
        /// Optional name
        #[arg(short, long)]
        name: Option<String>,
        /// Photo as an image data URI
        #[arg(long)]
        photo: Option<String>,
        /// Date to log for (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List, remove or reorder logged meals
    Meals {
        #[command(subcommand)]
        command: MealsCommands,
    },
    /// Show daily totals against goals (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-day totals and averages over a date range
    Stats {
        /// First day (YYYY-MM-DD); overrides --days
        #[arg(long)]
        from: Option<String>,
        /// Last day (YYYY-MM-DD, default: today)
        #[arg(long)]
        to: Option<String>,
        /// Number of days ending at --to
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as CSV
        #[arg(long, conflicts_with = "json")]
        csv: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Track body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Manage the meal preset library
    Library {
        #[command(subcommand)]
        command: LibraryCommands,
    },
    /// Export or restore a full backup file
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Cloud backup settings and manual sync
    Cloud {
        #[command(subcommand)]
        command: CloudCommands,
    },
    /// View or change preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },
    /// Suggest what to eat with the remaining budget
    Suggest {
        /// Date to plan for (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,
        /// Number of presets to show
        #[arg(short, long, default_value_t = DEFAULT_SUGGESTION_LIMIT)]
        limit: usize,
        /// Ask the configured LLM planner instead of ranking locally
        #[arg(long)]
        llm: bool,
        /// Budget hint for the planner (e.g. low, normal)
        #[arg(long, requires = "llm")]
        budget: Option<String>,
        /// Preparation time hint for the planner (e.g. quick, any)
        #[arg(long, requires = "llm")]
        time: Option<String>,
        /// Ingredients to avoid (repeatable)
        #[arg(long, requires = "llm")]
        avoid: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Erase all local data
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Set profile fields; BMR and TDEE are recomputed when all are present
    Set {
        #[arg(long)]
        name: Option<String>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Weight in kg
        #[arg(long)]
        weight: Option<f64>,
        #[arg(long)]
        age: Option<u32>,
        /// male or female
        #[arg(long)]
        gender: Option<String>,
        /// sedentary, moderate or active
        #[arg(long)]
        activity: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GoalsCommands {
    /// Set gram and energy goals directly
    Set {
        #[arg(long)]
        protein: Option<f64>,
        #[arg(long)]
        fat: Option<f64>,
        #[arg(long)]
        carb: Option<f64>,
        #[arg(long)]
        kcal: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Derive goals from an energy target and a macro split
    Split {
        /// Energy target (default: profile TDEE)
        #[arg(long)]
        kcal: Option<f64>,
        /// maintenance, weight-loss, muscle-gain or low-carb
        #[arg(long)]
        preset: Option<String>,
        /// Protein share in percent
        #[arg(long)]
        protein_pct: Option<f64>,
        /// Fat share in percent
        #[arg(long)]
        fat_pct: Option<f64>,
        /// Carbohydrate share in percent
        #[arg(long)]
        carb_pct: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show goals and the short-term goal
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set or clear a time-boxed weight goal
    ShortTerm {
        /// Target weight in kg
        #[arg(long)]
        target_weight: Option<f64>,
        /// Weeks to reach it
        #[arg(long)]
        weeks: Option<u32>,
        /// maintenance, weight-loss or muscle-gain (default: weight-loss)
        #[arg(long = "type")]
        goal_type: Option<String>,
        /// Remove the short-term goal
        #[arg(long, conflicts_with_all = ["target_weight", "weeks", "goal_type", "apply"])]
        clear: bool,
        /// Also set daily goals from the resulting energy target
        #[arg(long)]
        apply: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealsCommands {
    /// List meals for a day
    List {
        /// Date (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a meal by position (1-based) or id prefix
    Remove {
        target: String,
        #[arg(short, long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a meal to another position within the day
    Move {
        /// Position (1-based) or id prefix
        target: String,
        /// New position (1-based)
        to: usize,
        #[arg(short, long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight entry (replaces any entry for that date)
    Log {
        /// Weight value
        value: f64,
        /// Unit: kg or lbs
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history and overall change
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the weight entry for a date
    Remove {
        /// Date (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum LibraryCommands {
    /// Add a meal preset
    Add {
        name: String,
        #[arg(short, long)]
        protein: f64,
        #[arg(short, long)]
        fat: f64,
        #[arg(short, long)]
        carb: f64,
        /// Energy in kcal (derived from macros when omitted)
        #[arg(long)]
        kcal: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List presets, optionally filtered by name
    List {
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a preset by id (prefix)
    Remove {
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a preset as a meal
    Apply {
        id: String,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short = 't', long = "type", default_value = "snack")]
        meal_type: String,
        #[arg(short, long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the library from a JSON array file (`-` for stdin)
    Import {
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the library as a JSON array (stdout by default)
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove every preset
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Write a full backup (stdout by default)
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace all local data from a backup file (`-` for stdin)
    Import {
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CloudCommands {
    /// Change cloud settings
    Config {
        /// User id the backup row is stored under
        #[arg(long)]
        user: Option<String>,
        /// Forget the user id
        #[arg(long, conflicts_with = "user")]
        clear_user: bool,
        /// Automatic sync after changes: on or off
        #[arg(long)]
        auto: Option<String>,
        /// Cloud sync: on or off
        #[arg(long)]
        enabled: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show cloud settings and last sync
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload a full backup now
    Push {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace local data with the cloud backup
    Pull {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that the endpoint is reachable
    Test {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PrefsCommands {
    /// Show preferences
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set dark mode on or off, or toggle it when no value is given
    DarkMode {
        value: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set any preference; the value is parsed as JSON when possible
    Set {
        key: String,
        value: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DIETLOG_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    debug!(db = %config.db_path.display(), "opening store");
    let db = Database::open(&config.db_path)?;
    let store = DietStore::open(db)?.into_shared();

    let client: Option<Arc<dyn BackupClient>> = match &config.backup {
        Some(endpoint) => Some(Arc::new(RestBackupClient::new(endpoint)?)),
        None => None,
    };
    let sync = SyncController::new(Arc::clone(&store), client)?;
    let llm = config.llm.map(LlmClient::new).transpose()?;

    let result = dispatch(cli.command, &store, &sync, llm.as_ref()).await;

    // Mutations schedule a debounced push; send it before the process exits.
    if let Err(e) = sync.flush().await {
        eprintln!("Warning: cloud backup failed: {e}");
    }
    result
}

#[allow(clippy::too_many_lines)]
async fn dispatch(
    command: Commands,
    store: &SharedStore,
    sync: &SyncController,
    llm: Option<&LlmClient>,
) -> Result<()> {
    match command {
        Commands::Profile { command } => match command {
            ProfileCommands::Set {
                name,
                height,
                weight,
                age,
                gender,
                activity,
                json,
            } => {
                let update = ProfileUpdate {
                    name,
                    height,
                    weight,
                    age,
                    gender,
                    activity,
                };
                with_store(store, |s| cmd_profile_set(s, update, json))
            }
            ProfileCommands::Show { json } => with_store(store, |s| cmd_profile_show(s, json)),
        },
        Commands::Goals { command } => match command {
            GoalsCommands::Set {
                protein,
                fat,
                carb,
                kcal,
                json,
            } => {
                let patch = GoalsPatch {
                    protein,
                    fat,
                    carb,
                    kcal,
                };
                with_store(store, |s| cmd_goals_set(s, patch, json))
            }
            GoalsCommands::Split {
                kcal,
                preset,
                protein_pct,
                fat_pct,
                carb_pct,
                json,
            } => with_store(store, |s| {
                cmd_goals_split(s, kcal, preset, [protein_pct, fat_pct, carb_pct], json)
            }),
            GoalsCommands::Show { json } => with_store(store, |s| cmd_goals_show(s, json)),
            GoalsCommands::ShortTerm {
                target_weight,
                weeks,
                goal_type,
                clear,
                apply,
                json,
            } => {
                let args = ShortTermArgs {
                    target_weight,
                    weeks,
                    goal_type,
                    clear,
                    apply,
                };
                with_store(store, |s| cmd_goals_short_term(s, args, json))
            }
        },
        Commands::Log {
            protein,
            fat,
            carb,
            kcal,
            meal_type,
            name,
            photo,
            date,
            json,
        } => {
            let args = LogArgs {
                meal_type,
                name,
                protein,
                fat,
                carb,
                kcal,
                photo,
                date,
            };
            with_store(store, |s| cmd_log(s, args, json))
        }
        Commands::Meals { command } => match command {
            MealsCommands::List { date, json } => with_store(store, |s| cmd_meals_list(s, date, json)),
            MealsCommands::Remove { target, date, json } => {
                with_store(store, |s| cmd_meals_remove(s, &target, date, json))
            }
            MealsCommands::Move {
                target,
                to,
                date,
                json,
            } => with_store(store, |s| cmd_meals_move(s, &target, to, date, json)),
        },
        Commands::Summary { date, json } => with_store(store, |s| cmd_summary(s, date, json)),
        Commands::Stats {
            from,
            to,
            days,
            csv,
            json,
        } => with_store(store, |s| cmd_stats(s, from, to, days, csv, json)),
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                json,
            } => with_store(store, |s| cmd_weight_log(s, value, &unit, date, json)),
            WeightCommands::History { json } => with_store(store, |s| cmd_weight_history(s, json)),
            WeightCommands::Remove { date, json } => {
                with_store(store, |s| cmd_weight_remove(s, date, json))
            }
        },
        Commands::Library { command } => match command {
            LibraryCommands::Add {
                name,
                protein,
                fat,
                carb,
                kcal,
                json,
            } => {
                let preset = NewPreset {
                    name,
                    protein,
                    fat,
                    carb,
                    kcal,
                };
                with_store(store, |s| cmd_library_add(s, preset, json))
            }
            LibraryCommands::List { search, json } => {
                with_store(store, |s| cmd_library_list(s, search.as_deref(), json))
            }
            LibraryCommands::Remove { id, json } => {
                with_store(store, |s| cmd_library_remove(s, &id, json))
            }
            LibraryCommands::Apply {
                id,
                meal_type,
                date,
                json,
            } => with_store(store, |s| cmd_library_apply(s, &id, &meal_type, date, json)),
            LibraryCommands::Import { file, json } => {
                with_store(store, |s| cmd_library_import(s, &file, json))
            }
            LibraryCommands::Export { output } => {
                with_store(store, |s| cmd_library_export(s, output.as_deref()))
            }
            LibraryCommands::Clear { json } => with_store(store, |s| cmd_library_clear(s, json)),
        },
        Commands::Backup { command } => match command {
            BackupCommands::Export { output } => {
                with_store(store, |s| cmd_backup_export(s, output.as_deref()))
            }
            BackupCommands::Import { file, json } => {
                with_store(store, |s| cmd_backup_import(s, &file, json))
            }
        },
        Commands::Cloud { command } => match command {
            CloudCommands::Config {
                user,
                clear_user,
                auto,
                enabled,
                json,
            } => {
                let patch = CloudPatch {
                    enabled: enabled.as_deref().map(parse_on_off).transpose()?,
                    user_id: if clear_user { Some(None) } else { user.map(Some) },
                    auto: auto.as_deref().map(parse_on_off).transpose()?,
                };
                with_store(store, |s| cmd_cloud_config(s, patch, json))
            }
            CloudCommands::Status { json } => cmd_cloud_status(sync, json),
            CloudCommands::Push { json } => cmd_cloud_push(sync, json).await,
            CloudCommands::Pull { json } => cmd_cloud_pull(sync, json).await,
            CloudCommands::Test { json } => cmd_cloud_test(sync, json).await,
        },
        Commands::Prefs { command } => match command {
            PrefsCommands::Show { json } => with_store(store, |s| cmd_prefs_show(s, json)),
            PrefsCommands::DarkMode { value, json } => {
                with_store(store, |s| cmd_prefs_dark_mode(s, value.as_deref(), json))
            }
            PrefsCommands::Set { key, value, json } => {
                with_store(store, |s| cmd_prefs_set(s, &key, &value, json))
            }
        },
        Commands::Suggest {
            date,
            limit,
            llm: use_llm,
            budget,
            time,
            avoid,
            json,
        } => {
            let args = SuggestArgs {
                date,
                limit,
                use_llm,
                budget,
                time,
                avoid,
            };
            let request = with_store(store, |s| cmd_suggest(s, args, json))?;
            match request {
                Some(request) => cmd_suggest_llm(llm, &request, json).await,
                None => Ok(()),
            }
        }
        Commands::Reset { yes, json } => cmd_reset(store, sync, yes, json),
    }
}
