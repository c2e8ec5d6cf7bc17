//! SQLite persistence for pending jobs.
//!
//! Jobs survive restarts so a reminder that came due while the process
//! was down can still fire within its grace window.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::ScheduledJob;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS jobs (
        id         TEXT PRIMARY KEY,
        fire_at    TEXT NOT NULL,
        grace_secs INTEGER NOT NULL,
        payload    TEXT NOT NULL,
        recurrence TEXT
    );";

/// Persistent mirror of the pending job set.
pub struct JobStore {
    conn: Mutex<Connection>,
}

impl JobStore {
    /// Open or create the job store.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory job store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Load every persisted job. Rows that no longer parse are dropped
    /// with a warning rather than wedging startup.
    pub fn list(&self) -> Result<Vec<ScheduledJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, fire_at, grace_secs, payload, recurrence FROM jobs")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut jobs = Vec::with_capacity(rows.len());
        for (id, fire_at, grace_secs, payload, recurrence) in rows {
            match parse_row(&id, &fire_at, grace_secs, &payload, recurrence.as_deref()) {
                Some(job) => jobs.push(job),
                None => tracing::warn!(job_id = %id, "Dropping unreadable persisted job"),
            }
        }
        Ok(jobs)
    }

    /// Insert or replace a job by id.
    pub fn upsert(&self, job: &ScheduledJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO jobs (id, fire_at, grace_secs, payload, recurrence)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                job.id,
                job.fire_at.to_rfc3339(),
                job.grace_secs,
                serde_json::to_string(&job.payload)?,
                job.recurrence
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ],
        )?;
        Ok(())
    }

    /// Delete a job by id.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM jobs WHERE id = ?1", rusqlite::params![id])?;
        Ok(count > 0)
    }

    /// Delete every job whose id starts with `prefix`. substr comparison
    /// keeps LIKE wildcards in ids from matching anything extra.
    pub fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "DELETE FROM jobs WHERE substr(id, 1, length(?1)) = ?1",
            rusqlite::params![prefix],
        )?;
        Ok(count)
    }
}

fn parse_row(
    id: &str,
    fire_at: &str,
    grace_secs: u32,
    payload: &str,
    recurrence: Option<&str>,
) -> Option<ScheduledJob> {
    let fire_at = fire_at.parse::<DateTime<Utc>>().ok()?;
    let payload = serde_json::from_str(payload).ok()?;
    let recurrence = match recurrence {
        Some(raw) => Some(serde_json::from_str(raw).ok()?),
        None => None,
    };
    Some(ScheduledJob {
        id: id.to_string(),
        fire_at,
        grace_secs,
        payload,
        recurrence,
    })
}
