//! HTML rendering for menus and reminders.
//!
//! All user-facing text is Ukrainian, Telegram HTML parse mode. Menu
//! formats match what the bot has always sent, and reminders reuse the
//! same lesson blocks.

use chrono::NaiveTime;
use rozklad_types::{LessonEntry, PeriodSlot, WeekMode};

const NO_LESSONS: &str = "❌ Пар немає.";

/// Menu title for a week mode.
pub fn week_title(mode: WeekMode) -> &'static str {
    match mode {
        WeekMode::Practical => "🛠️ Практичний тиждень",
        WeekMode::Lecture => "📘 Лекційний тиждень",
    }
}

fn subject(entry: &LessonEntry) -> &str {
    if entry.subject.is_empty() {
        "—"
    } else {
        &entry.subject
    }
}

fn opt_field(value: Option<&String>) -> &str {
    value
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("—")
}

fn hm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// One line per lesson.
pub fn render_pairs_short(entries: &[LessonEntry]) -> String {
    if entries.is_empty() {
        return NO_LESSONS.to_string();
    }
    entries
        .iter()
        .map(|e| format!("• <b>{} пара</b>: {}", e.ordinal, subject(e)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-lesson block with teacher and room.
pub fn render_pairs_detailed(entries: &[LessonEntry]) -> String {
    if entries.is_empty() {
        return NO_LESSONS.to_string();
    }
    entries
        .iter()
        .map(|e| {
            format!(
                "📚 <b>{} пара</b>\n   • Предмет: <b>{}</b>\n   • Викладач: {}\n   • Аудиторія: {}",
                e.ordinal,
                subject(e),
                opt_field(e.teacher.as_ref()),
                opt_field(e.room.as_ref()),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Day view, short form.
pub fn render_day_short(day_name: &str, entries: &[LessonEntry]) -> String {
    format!("📅 <b>{day_name}</b>\n\n{}", render_pairs_short(entries))
}

/// Day view, detailed form.
pub fn render_day_detailed(day_name: &str, entries: &[LessonEntry]) -> String {
    format!("📅 <b>{day_name}</b>\n\n{}", render_pairs_detailed(entries))
}

fn keycap(ordinal: u8) -> String {
    match ordinal {
        1..=9 => format!("{ordinal}\u{fe0f}\u{20e3}"),
        10 => "🔟".to_string(),
        _ => format!("{ordinal}."),
    }
}

/// Bell table with the break length between consecutive periods.
pub fn render_bells(slots: &[PeriodSlot]) -> String {
    let mut out = String::from("⏰ <b>Розклад дзвінків (магістри 1 курс)</b>\n");
    let mut prev_end: Option<NaiveTime> = None;
    for slot in slots {
        match prev_end {
            Some(end) => {
                let brk = (slot.start - end).num_minutes();
                if brk > 0 {
                    out.push_str(&format!("— перерва {brk} хв —\n"));
                }
            }
            None => out.push('\n'),
        }
        out.push_str(&format!(
            "{} {}–{}\n",
            keycap(slot.ordinal),
            hm(slot.start),
            hm(slot.end)
        ));
        prev_end = Some(slot.end);
    }
    out.trim_end().to_string()
}

/// Hour-before reminder: the first bell time plus the day at a glance.
pub fn render_hour_reminder(entries: &[LessonEntry], first_start: NaiveTime) -> String {
    format!(
        "⏰ <b>Нагадування</b>: перша пара сьогодні о <b>{}</b>.\n\n{}",
        hm(first_start),
        render_pairs_short(entries)
    )
}

/// Five-minute reminder for a single lesson.
pub fn render_five_min_reminder(entry: &LessonEntry, start: NaiveTime) -> String {
    format!(
        "🔔 <b>Пара за 5 хвилин!</b> Початок о <b>{}</b>.\n\n{}",
        hm(start),
        render_pairs_detailed(std::slice::from_ref(entry))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(ordinal: u8, subject: &str) -> LessonEntry {
        LessonEntry {
            ordinal,
            subject: subject.to_string(),
            teacher: None,
            room: None,
        }
    }

    #[test]
    fn test_short_format() {
        let entries = vec![lesson(1, "Математика"), lesson(2, "Фізика")];
        assert_eq!(
            render_pairs_short(&entries),
            "• <b>1 пара</b>: Математика\n• <b>2 пара</b>: Фізика"
        );
    }

    #[test]
    fn test_empty_day() {
        assert_eq!(render_pairs_short(&[]), "❌ Пар немає.");
        assert_eq!(render_pairs_detailed(&[]), "❌ Пар немає.");
        assert_eq!(
            render_day_short("Субота", &[]),
            "📅 <b>Субота</b>\n\n❌ Пар немає."
        );
    }

    #[test]
    fn test_detailed_fills_missing_fields_with_dash() {
        let full = LessonEntry {
            ordinal: 1,
            subject: "Математика".into(),
            teacher: Some("Іваненко".into()),
            room: Some("214".into()),
        };
        assert_eq!(
            render_pairs_detailed(std::slice::from_ref(&full)),
            "📚 <b>1 пара</b>\n   • Предмет: <b>Математика</b>\n   • Викладач: Іваненко\n   • Аудиторія: 214"
        );

        let bare = lesson(2, "Фізика");
        let text = render_pairs_detailed(std::slice::from_ref(&bare));
        assert!(text.contains("• Викладач: —"));
        assert!(text.contains("• Аудиторія: —"));
    }

    #[test]
    fn test_bells_matches_menu_text() {
        let slots = crate::TimetableSnapshot::empty().bells();
        let expected = "⏰ <b>Розклад дзвінків (магістри 1 курс)</b>\n\n\
                        1️⃣ 09:00–10:20\n\
                        — перерва 10 хв —\n\
                        2️⃣ 10:30–11:50\n\
                        — перерва 30 хв —\n\
                        3️⃣ 12:20–13:40\n\
                        — перерва 10 хв —\n\
                        4️⃣ 13:50–15:10\n\
                        — перерва 10 хв —\n\
                        5️⃣ 15:20–16:40\n\
                        — перерва 10 хв —\n\
                        6️⃣ 16:50–18:10";
        assert_eq!(render_bells(&slots), expected);
    }

    #[test]
    fn test_week_titles() {
        assert_eq!(week_title(WeekMode::Practical), "🛠️ Практичний тиждень");
        assert_eq!(week_title(WeekMode::Lecture), "📘 Лекційний тиждень");
    }

    #[test]
    fn test_reminder_texts() {
        let entries = vec![lesson(1, "Математика"), lesson(2, "Фізика")];
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let hour = render_hour_reminder(&entries, start);
        assert!(hour.contains("о <b>09:00</b>"));
        assert!(hour.contains("• <b>1 пара</b>: Математика"));
        assert!(hour.contains("• <b>2 пара</b>: Фізика"));

        let five = render_five_min_reminder(
            &entries[1],
            NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
        );
        assert!(five.contains("за 5 хвилин"));
        assert!(five.contains("<b>10:30</b>"));
        assert!(five.contains("Фізика"));
    }
}
