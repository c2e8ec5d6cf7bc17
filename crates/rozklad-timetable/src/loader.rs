//! Timetable data loading and validation.
//!
//! Reads `practical.json` / `lecture.json` / `bells.json` from the data
//! directory into an immutable snapshot. Loading is all-or-nothing: any
//! parse or validation error surfaces to the caller and the previous
//! snapshot stays in place. A missing mode file is not an error, that
//! mode is just empty.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{NaiveTime, Weekday};
use once_cell::sync::Lazy;
use rozklad_types::{LessonEntry, PeriodSlot, WeekMode, weekday_from_name};
use serde::Deserialize;

use crate::DataError;

/// Bell table used when the data directory has no `bells.json`.
static DEFAULT_BELLS: Lazy<BTreeMap<u8, PeriodSlot>> = Lazy::new(|| {
    [
        (1u8, (9, 0), (10, 20)),
        (2, (10, 30), (11, 50)),
        (3, (12, 20), (13, 40)),
        (4, (13, 50), (15, 10)),
        (5, (15, 20), (16, 40)),
        (6, (16, 50), (18, 10)),
    ]
    .into_iter()
    .filter_map(|(ordinal, (sh, sm), (eh, em))| {
        Some((
            ordinal,
            PeriodSlot {
                ordinal,
                start: NaiveTime::from_hms_opt(sh, sm, 0)?,
                end: NaiveTime::from_hms_opt(eh, em, 0)?,
            },
        ))
    })
    .collect()
});

/// Immutable view of the loaded timetable data. Swapped wholesale on
/// reload, so a reader holding one never observes a half-applied edit.
#[derive(Debug, Clone)]
pub struct TimetableSnapshot {
    lessons: HashMap<(WeekMode, Weekday), Vec<LessonEntry>>,
    bells: BTreeMap<u8, PeriodSlot>,
}

impl TimetableSnapshot {
    /// No lessons, built-in bell table.
    pub fn empty() -> Self {
        Self {
            lessons: HashMap::new(),
            bells: DEFAULT_BELLS.clone(),
        }
    }

    /// Lessons for one (mode, weekday) bucket, ordered by period number.
    pub fn periods_on(&self, mode: WeekMode, day: Weekday) -> &[LessonEntry] {
        self.lessons
            .get(&(mode, day))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Period number of the first lesson of the day, if any.
    pub fn first_period_on(&self, mode: WeekMode, day: Weekday) -> Option<u8> {
        self.periods_on(mode, day).first().map(|l| l.ordinal)
    }

    /// Look up a single lesson by its period number.
    pub fn lesson(&self, mode: WeekMode, day: Weekday, ordinal: u8) -> Option<&LessonEntry> {
        self.periods_on(mode, day)
            .iter()
            .find(|l| l.ordinal == ordinal)
    }

    /// Bell start time for a period number, if the bell table has it.
    pub fn start_time_of(&self, ordinal: u8) -> Option<NaiveTime> {
        self.bells.get(&ordinal).map(|slot| slot.start)
    }

    /// The bell table in period order.
    pub fn bells(&self) -> Vec<PeriodSlot> {
        self.bells.values().copied().collect()
    }

    /// True when a mode has no lessons at all (its file is missing or
    /// holds only empty days).
    pub fn mode_is_empty(&self, mode: WeekMode) -> bool {
        !self.lessons.keys().any(|(m, _)| *m == mode)
    }
}

/// Summary of a successful (re)load, reported back to whoever asked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub practical_lessons: usize,
    pub lecture_lessons: usize,
    pub bell_slots: usize,
    /// True when `bells.json` was absent and the built-in table applies.
    pub default_bells: bool,
    /// Day keys that were not recognized and got skipped.
    pub unknown_days: usize,
}

type RawModeFile = HashMap<String, Vec<LessonEntry>>;

#[derive(Deserialize)]
struct RawBell {
    start: String,
    end: String,
}

/// Load a full snapshot from the data directory.
pub fn load_snapshot(data_dir: &Path) -> Result<(TimetableSnapshot, ReloadReport), DataError> {
    let mut lessons = HashMap::new();
    let mut report = ReloadReport::default();

    for mode in [WeekMode::Practical, WeekMode::Lecture] {
        let path = data_dir.join(format!("{}.json", mode.key()));
        let Some(raw) = read_mode_file(&path)? else {
            tracing::debug!("{} not present, {mode} week is empty", path.display());
            continue;
        };
        let count = insert_mode(&mut lessons, mode, raw, &path, &mut report)?;
        match mode {
            WeekMode::Practical => report.practical_lessons = count,
            WeekMode::Lecture => report.lecture_lessons = count,
        }
    }

    let bells = match read_bells_file(&data_dir.join("bells.json"))? {
        Some(bells) => bells,
        None => {
            report.default_bells = true;
            DEFAULT_BELLS.clone()
        }
    };
    report.bell_slots = bells.len();

    Ok((TimetableSnapshot { lessons, bells }, report))
}

fn read_mode_file(path: &Path) -> Result<Option<RawModeFile>, DataError> {
    if !path.exists() {
        return Ok(None);
    }
    let name = file_name(path);
    let content = std::fs::read_to_string(path).map_err(|e| DataError::Io(name.clone(), e))?;
    let raw = serde_json::from_str(&content).map_err(|e| DataError::Json(name, e))?;
    Ok(Some(raw))
}

fn insert_mode(
    lessons: &mut HashMap<(WeekMode, Weekday), Vec<LessonEntry>>,
    mode: WeekMode,
    raw: RawModeFile,
    path: &Path,
    report: &mut ReloadReport,
) -> Result<usize, DataError> {
    let mut total = 0;
    for (day_key, mut entries) in raw {
        let Some(day) = weekday_from_name(&day_key) else {
            tracing::warn!("{}: unknown day key {day_key:?}, skipped", file_name(path));
            report.unknown_days += 1;
            continue;
        };
        if entries.is_empty() {
            continue;
        }
        entries.sort_by_key(|l| l.ordinal);
        if let Some(dup) = entries.windows(2).find(|w| w[0].ordinal == w[1].ordinal) {
            return Err(DataError::DuplicateOrdinal(
                file_name(path),
                day_key,
                dup[0].ordinal,
            ));
        }
        total += entries.len();
        lessons.insert((mode, day), entries);
    }
    Ok(total)
}

fn read_bells_file(path: &Path) -> Result<Option<BTreeMap<u8, PeriodSlot>>, DataError> {
    if !path.exists() {
        return Ok(None);
    }
    let name = file_name(path);
    let content = std::fs::read_to_string(path).map_err(|e| DataError::Io(name.clone(), e))?;
    let raw: HashMap<String, RawBell> =
        serde_json::from_str(&content).map_err(|e| DataError::Json(name, e))?;

    let mut bells = BTreeMap::new();
    for (key, slot) in raw {
        let ordinal: u8 = key.parse().map_err(|_| DataError::BadBellKey(key.clone()))?;
        let start = parse_bell_time(&slot.start)?;
        let end = parse_bell_time(&slot.end)?;
        if start >= end {
            return Err(DataError::BellOrder(ordinal, start, end));
        }
        bells.insert(ordinal, PeriodSlot {
            ordinal,
            start,
            end,
        });
    }
    Ok(Some(bells))
}

fn parse_bell_time(value: &str) -> Result<NaiveTime, DataError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| DataError::BadTime(value.to_string()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
