//! rozklad-timetable: the shared timetable index.
//!
//! Owns the loaded practical/lecture schedules plus the bell table and
//! renders them for menus and reminders. Reload swaps the whole snapshot
//! atomically: readers see either the old data or the new data, never a
//! mix, and a failed reload leaves the old snapshot in place.

use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{NaiveTime, Weekday};
use rozklad_types::{LessonEntry, PeriodSlot, WeekMode};

mod loader;
mod render;

pub use loader::{ReloadReport, TimetableSnapshot, load_snapshot};
pub use render::{
    render_bells, render_day_detailed, render_day_short, render_five_min_reminder,
    render_hour_reminder, render_pairs_detailed, render_pairs_short, week_title,
};

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("IO error reading {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("JSON parse error in {0}: {1}")]
    Json(String, #[source] serde_json::Error),
    #[error("{0}: duplicate period {2} on {1}")]
    DuplicateOrdinal(String, String, u8),
    #[error("bells.json: period {0} starts at {1}, not before its end {2}")]
    BellOrder(u8, NaiveTime, NaiveTime),
    #[error("bells.json: bad period key {0:?}")]
    BadBellKey(String),
    #[error("bad time {0:?}, expected HH:MM")]
    BadTime(String),
}

/// Hot-reloadable view of the timetable data, shared across the bot.
pub struct TimetableIndex {
    snapshot: RwLock<Arc<TimetableSnapshot>>,
}

impl TimetableIndex {
    /// An index with no lessons and the built-in bell table.
    pub fn empty() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(TimetableSnapshot::empty())),
        }
    }

    /// Load an index from the data directory.
    pub fn load(data_dir: &Path) -> Result<(Self, ReloadReport), DataError> {
        let (snapshot, report) = loader::load_snapshot(data_dir)?;
        Ok((
            Self {
                snapshot: RwLock::new(Arc::new(snapshot)),
            },
            report,
        ))
    }

    /// Re-read the data directory and swap the snapshot in. On error the
    /// current snapshot stays.
    pub fn reload(&self, data_dir: &Path) -> Result<ReloadReport, DataError> {
        let (snapshot, report) = loader::load_snapshot(data_dir)?;
        *self.snapshot.write().unwrap() = Arc::new(snapshot);
        Ok(report)
    }

    /// The current snapshot. Callers doing multi-step reads should hold
    /// one snapshot rather than hitting the index repeatedly.
    pub fn snapshot(&self) -> Arc<TimetableSnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    pub fn periods_on(&self, mode: WeekMode, day: Weekday) -> Vec<LessonEntry> {
        self.snapshot().periods_on(mode, day).to_vec()
    }

    pub fn first_period_on(&self, mode: WeekMode, day: Weekday) -> Option<u8> {
        self.snapshot().first_period_on(mode, day)
    }

    pub fn lesson(&self, mode: WeekMode, day: Weekday, ordinal: u8) -> Option<LessonEntry> {
        self.snapshot().lesson(mode, day, ordinal).cloned()
    }

    pub fn start_time_of(&self, ordinal: u8) -> Option<NaiveTime> {
        self.snapshot().start_time_of(ordinal)
    }

    pub fn bells(&self) -> Vec<PeriodSlot> {
        self.snapshot().bells()
    }

    pub fn mode_is_empty(&self, mode: WeekMode) -> bool {
        self.snapshot().mode_is_empty(mode)
    }
}
