//! rozklad-store: SQLite persistence for subscribers and global bot state.
//!
//! The store is the source of truth: preference and week-mode reads always
//! hit SQLite, so a failed write can never leave memory ahead of disk.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use rozklad_types::{Preferences, WeekMode};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const WEEK_MODE_KEY: &str = "week_mode";
const AUTO_ROTATE_KEY: &str = "auto_rotate";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS subscribers (
        chat_id                INTEGER PRIMARY KEY,
        notify_hour_before     INTEGER NOT NULL DEFAULT 0,
        notify_five_min_before INTEGER NOT NULL DEFAULT 0,
        created_at             TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS bot_state (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );";

/// Subscriber preferences and global bot state, on disk.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!("Store opened: {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ─── Subscribers ───────────────────────────────────

    /// Record a chat on first contact. Existing rows are untouched.
    pub fn ensure_subscriber(&self, chat_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO subscribers (chat_id, created_at) VALUES (?1, ?2)",
            rusqlite::params![chat_id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Reminder switches for a chat. A chat the store has never seen
    /// reads as all-off.
    pub fn preferences(&self, chat_id: i64) -> Result<Preferences> {
        let conn = self.conn.lock().unwrap();
        let prefs = conn
            .query_row(
                "SELECT notify_hour_before, notify_five_min_before
                 FROM subscribers WHERE chat_id = ?1",
                rusqlite::params![chat_id],
                |row| {
                    Ok(Preferences {
                        notify_hour_before: row.get::<_, i64>(0)? != 0,
                        notify_five_min_before: row.get::<_, i64>(1)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(prefs.unwrap_or_default())
    }

    /// Persist reminder switches, creating the subscriber row if needed.
    pub fn set_preferences(&self, chat_id: i64, prefs: Preferences) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO subscribers (chat_id, notify_hour_before, notify_five_min_before, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_id) DO UPDATE SET
                notify_hour_before = excluded.notify_hour_before,
                notify_five_min_before = excluded.notify_five_min_before",
            rusqlite::params![
                chat_id,
                prefs.notify_hour_before as i64,
                prefs.notify_five_min_before as i64,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Every chat that has ever talked to the bot, for replan sweeps.
    pub fn subscriber_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT chat_id FROM subscribers ORDER BY chat_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // ─── Global state ───────────────────────────────────

    /// The week mode currently in effect. Defaults to practical.
    pub fn active_week_mode(&self) -> Result<WeekMode> {
        match self.state_get(WEEK_MODE_KEY)? {
            Some(value) => match WeekMode::from_key(&value) {
                Some(mode) => Ok(mode),
                None => {
                    tracing::warn!("Corrupt week_mode value {value:?}, defaulting to practical");
                    Ok(WeekMode::Practical)
                }
            },
            None => Ok(WeekMode::Practical),
        }
    }

    pub fn set_active_week_mode(&self, mode: WeekMode) -> Result<()> {
        self.state_set(WEEK_MODE_KEY, mode.key())
    }

    /// Whether the weekly trigger flips the mode. Defaults to on.
    pub fn auto_rotate_enabled(&self) -> Result<bool> {
        match self.state_get(AUTO_ROTATE_KEY)? {
            Some(value) => Ok(value != "0"),
            None => Ok(true),
        }
    }

    pub fn set_auto_rotate(&self, enabled: bool) -> Result<()> {
        self.state_set(AUTO_ROTATE_KEY, if enabled { "1" } else { "0" })
    }

    fn state_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM bot_state WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn state_set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO bot_state (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_subscriber_reads_as_default() {
        let store = Store::open_in_memory().unwrap();
        let prefs = store.preferences(42).unwrap();
        assert_eq!(prefs, Preferences::default());
        assert!(!prefs.any_enabled());
        assert!(store.subscriber_ids().unwrap().is_empty());
    }

    #[test]
    fn test_ensure_subscriber_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_subscriber(42).unwrap();
        store
            .set_preferences(42, Preferences {
                notify_hour_before: true,
                notify_five_min_before: false,
            })
            .unwrap();
        // A later /start must not reset the switches
        store.ensure_subscriber(42).unwrap();

        let prefs = store.preferences(42).unwrap();
        assert!(prefs.notify_hour_before);
        assert_eq!(store.subscriber_ids().unwrap(), vec![42]);
    }

    #[test]
    fn test_preferences_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let both = Preferences {
            notify_hour_before: true,
            notify_five_min_before: true,
        };
        // set_preferences on an unseen chat creates the row
        store.set_preferences(7, both).unwrap();
        assert_eq!(store.preferences(7).unwrap(), both);

        let one = Preferences {
            notify_hour_before: false,
            notify_five_min_before: true,
        };
        store.set_preferences(7, one).unwrap();
        assert_eq!(store.preferences(7).unwrap(), one);
    }

    #[test]
    fn test_subscriber_ids_enumerates_everyone() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_subscriber(3).unwrap();
        store.ensure_subscriber(1).unwrap();
        store.ensure_subscriber(2).unwrap();
        assert_eq!(store.subscriber_ids().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_week_mode_defaults_to_practical() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.active_week_mode().unwrap(), WeekMode::Practical);

        store.set_active_week_mode(WeekMode::Lecture).unwrap();
        assert_eq!(store.active_week_mode().unwrap(), WeekMode::Lecture);
    }

    #[test]
    fn test_auto_rotate_defaults_to_on() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.auto_rotate_enabled().unwrap());

        store.set_auto_rotate(false).unwrap();
        assert!(!store.auto_rotate_enabled().unwrap());
        store.set_auto_rotate(true).unwrap();
        assert!(store.auto_rotate_enabled().unwrap());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("rozklad.db");

        {
            let store = Store::open(&db_path).unwrap();
            store.set_active_week_mode(WeekMode::Lecture).unwrap();
            store
                .set_preferences(42, Preferences {
                    notify_hour_before: true,
                    notify_five_min_before: true,
                })
                .unwrap();
        }

        let store = Store::open(&db_path).unwrap();
        assert_eq!(store.active_week_mode().unwrap(), WeekMode::Lecture);
        assert!(store.preferences(42).unwrap().notify_hour_before);
    }
}
