use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

// ──────────────────── Week mode ────────────────────

/// Which of the two parallel weekly timetables is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekMode {
    Practical,
    Lecture,
}

impl WeekMode {
    /// The other mode; week rotation flips between the two.
    pub fn other(self) -> WeekMode {
        match self {
            WeekMode::Practical => WeekMode::Lecture,
            WeekMode::Lecture => WeekMode::Practical,
        }
    }

    /// Stable key used in storage, data file names and callback data.
    pub fn key(self) -> &'static str {
        match self {
            WeekMode::Practical => "practical",
            WeekMode::Lecture => "lecture",
        }
    }

    pub fn from_key(key: &str) -> Option<WeekMode> {
        match key {
            "practical" => Some(WeekMode::Practical),
            "lecture" => Some(WeekMode::Lecture),
            _ => None,
        }
    }
}

impl std::fmt::Display for WeekMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for WeekMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WeekMode::from_key(s).ok_or_else(|| format!("unknown week mode: {s}"))
    }
}

// ──────────────────── Weekdays ────────────────────

/// Weekdays that carry lessons, in timetable order.
pub const LESSON_DAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

const DAY_NAMES: [(Weekday, &str); 7] = [
    (Weekday::Mon, "Понеділок"),
    (Weekday::Tue, "Вівторок"),
    (Weekday::Wed, "Середа"),
    (Weekday::Thu, "Четвер"),
    (Weekday::Fri, "Пʼятниця"),
    (Weekday::Sat, "Субота"),
    (Weekday::Sun, "Неділя"),
];

/// True for Mon..Fri; Saturday and Sunday never carry lessons.
pub fn has_lessons(day: Weekday) -> bool {
    LESSON_DAYS.contains(&day)
}

/// Ukrainian day name as used in the data files and menus.
pub fn day_name(day: Weekday) -> &'static str {
    DAY_NAMES
        .iter()
        .find(|(d, _)| *d == day)
        .map(|(_, name)| *name)
        .unwrap_or("")
}

/// Reverse lookup for data-file keys and callback payloads.
pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    DAY_NAMES
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(d, _)| *d)
}

// ──────────────────── Timetable entries ────────────────────

/// One numbered slot of the bell table with its civil start/end time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSlot {
    pub ordinal: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// One lesson inside a (week mode, weekday) bucket.
///
/// The JSON field is `pair`, since "пара" is what the timetable files and
/// the menus call a class slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonEntry {
    #[serde(rename = "pair")]
    pub ordinal: u8,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

// ──────────────────── Subscriber preferences ────────────────────

/// Per-chat reminder switches. A chat the store has never seen reads as
/// all-off, which is observably identical to an explicit all-off record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub notify_hour_before: bool,
    #[serde(default)]
    pub notify_five_min_before: bool,
}

impl Preferences {
    pub fn any_enabled(self) -> bool {
        self.notify_hour_before || self.notify_five_min_before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_mode_other_flips() {
        assert_eq!(WeekMode::Practical.other(), WeekMode::Lecture);
        assert_eq!(WeekMode::Lecture.other(), WeekMode::Practical);
    }

    #[test]
    fn test_week_mode_key_round_trip() {
        for mode in [WeekMode::Practical, WeekMode::Lecture] {
            assert_eq!(WeekMode::from_key(mode.key()), Some(mode));
            assert_eq!(mode.key().parse::<WeekMode>().unwrap(), mode);
        }
        assert_eq!(WeekMode::from_key("midterm"), None);
    }

    #[test]
    fn test_week_mode_serde_snake_case() {
        let json = serde_json::to_string(&WeekMode::Practical).unwrap();
        assert_eq!(json, "\"practical\"");
        let parsed: WeekMode = serde_json::from_str("\"lecture\"").unwrap();
        assert_eq!(parsed, WeekMode::Lecture);
    }

    #[test]
    fn test_lesson_days_exclude_weekend() {
        assert!(has_lessons(Weekday::Mon));
        assert!(has_lessons(Weekday::Fri));
        assert!(!has_lessons(Weekday::Sat));
        assert!(!has_lessons(Weekday::Sun));
    }

    #[test]
    fn test_day_name_round_trip() {
        for day in LESSON_DAYS {
            assert_eq!(weekday_from_name(day_name(day)), Some(day));
        }
        assert_eq!(day_name(Weekday::Mon), "Понеділок");
        assert_eq!(weekday_from_name("Середа"), Some(Weekday::Wed));
        assert_eq!(weekday_from_name("Monday"), None);
    }

    #[test]
    fn test_lesson_entry_parses_data_file_shape() {
        let json = r#"{"pair": 2, "subject": "Фізика", "teacher": "Коваленко О. І.", "room": "215"}"#;
        let lesson: LessonEntry = serde_json::from_str(json).unwrap();
        assert_eq!(lesson.ordinal, 2);
        assert_eq!(lesson.subject, "Фізика");
        assert_eq!(lesson.teacher.as_deref(), Some("Коваленко О. І."));
        assert_eq!(lesson.room.as_deref(), Some("215"));
    }

    #[test]
    fn test_lesson_entry_optional_fields_default() {
        let lesson: LessonEntry = serde_json::from_str(r#"{"pair": 1}"#).unwrap();
        assert_eq!(lesson.ordinal, 1);
        assert_eq!(lesson.subject, "");
        assert!(lesson.teacher.is_none());
        assert!(lesson.room.is_none());
    }

    #[test]
    fn test_preferences_default_all_off() {
        let prefs = Preferences::default();
        assert!(!prefs.notify_hour_before);
        assert!(!prefs.notify_five_min_before);
        assert!(!prefs.any_enabled());
    }

    #[test]
    fn test_preferences_serde_missing_fields() {
        let prefs: Preferences = serde_json::from_str("{}").unwrap();
        assert_eq!(prefs, Preferences::default());
    }
}
