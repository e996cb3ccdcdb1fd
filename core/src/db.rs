use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{CloudSettings, DietState, PersistedState};

/// Slot holding the whole persisted diet state.
pub const STATE_KEY: &str = "diet-store";

/// Borrowed mirror of [`PersistedState`] so saving never clones the meal log.
#[derive(Serialize)]
struct PersistedStateRef<'a> {
    #[serde(flatten)]
    state: &'a DietState,
    cloud: &'a CloudSettings,
}

/// Key-value slot storage on SQLite.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS slots (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    pub fn read_slot(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM slots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn write_slot(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn remove_slot(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM slots WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// Read the persisted state. A missing slot yields `None`; so does one that
    /// no longer parses, after logging it, so a damaged slot never blocks startup.
    pub fn load_state(&self) -> Result<Option<PersistedState>> {
        let Some(raw) = self.read_slot(STATE_KEY)? else {
            debug!("no persisted state, starting from defaults");
            return Ok(None);
        };
        match serde_json::from_str::<PersistedState>(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(error = %e, key = STATE_KEY, "ignoring unreadable persisted state");
                Ok(None)
            }
        }
    }

    pub fn save_state(&self, state: &DietState, cloud: &CloudSettings) -> Result<()> {
        let json = serde_json::to_string(&PersistedStateRef { state, cloud })
            .context("Failed to encode state")?;
        self.write_slot(STATE_KEY, &json)?;
        debug!(bytes = json.len(), "persisted state");
        Ok(())
    }

    pub fn clear_state(&self) -> Result<bool> {
        self.remove_slot(STATE_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Goals, WeightRecord, parse_date};

    #[test]
    fn test_slot_roundtrip_and_overwrite() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.read_slot("k").unwrap().is_none());

        db.write_slot("k", "one").unwrap();
        db.write_slot("k", "two").unwrap();
        assert_eq!(db.read_slot("k").unwrap().as_deref(), Some("two"));

        assert!(db.remove_slot("k").unwrap());
        assert!(!db.remove_slot("k").unwrap());
        assert!(db.read_slot("k").unwrap().is_none());
    }

    #[test]
    fn test_load_state_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_state().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_state() {
        let db = Database::open_in_memory().unwrap();
        let mut persisted = PersistedState::default();
        persisted.state.goals = Goals {
            protein: 140.0,
            fat: 70.0,
            carb: 220.0,
            kcal: 2100.0,
        };
        persisted.state.weight_history.push(WeightRecord {
            date: parse_date("2024-03-01").unwrap(),
            weight: 81.2,
        });
        persisted.cloud.user_id = Some("user-9".to_string());
        db.save_state(&persisted.state, &persisted.cloud).unwrap();

        let loaded = db.load_state().unwrap().unwrap();
        assert_eq!(loaded, persisted);
    }

    #[test]
    fn test_corrupt_state_is_ignored() {
        let db = Database::open_in_memory().unwrap();
        db.write_slot(STATE_KEY, "{not json").unwrap();
        assert!(db.load_state().unwrap().is_none());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diet.db");
        {
            let db = Database::open(&path).unwrap();
            let mut persisted = PersistedState::default();
            persisted.state.preferences.dark_mode = false;
            db.save_state(&persisted.state, &persisted.cloud).unwrap();
        }
        let db = Database::open(&path).unwrap();
        let loaded = db.load_state().unwrap().unwrap();
        assert!(!loaded.state.preferences.dark_mode);

        assert!(db.clear_state().unwrap());
        assert!(db.load_state().unwrap().is_none());
    }
}
