//! Inline keyboard builders for the menu tree.

use rozklad_telegram::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use rozklad_types::{LESSON_DAYS, Preferences, WeekMode, day_name};

/// Main menu: week modes, bells, notification settings.
pub fn kb_main() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![
                InlineKeyboardButton::callback("📘 Лекційний тиждень", "week:lecture"),
                InlineKeyboardButton::callback("🛠️ Практичний тиждень", "week:practical"),
            ],
            vec![InlineKeyboardButton::callback("⏰ Розклад дзвінків", "bells")],
            vec![InlineKeyboardButton::callback("🔔 Нагадування", "notif:menu")],
        ],
    }
}

/// A single "back home" button.
pub fn kb_home_only() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![InlineKeyboardButton::callback(
            "🏠 В головне меню",
            "home",
        )]],
    }
}

/// Day picker, three buttons per row, home button last.
pub fn kb_days(mode: WeekMode) -> InlineKeyboardMarkup {
    let buttons: Vec<InlineKeyboardButton> = LESSON_DAYS
        .iter()
        .map(|d| {
            let name = day_name(*d);
            InlineKeyboardButton::callback(name, &format!("day:{}:{name}", mode.key()))
        })
        .collect();

    let mut rows: Vec<Vec<InlineKeyboardButton>> =
        buttons.chunks(3).map(|chunk| chunk.to_vec()).collect();
    rows.push(vec![InlineKeyboardButton::callback(
        "🏠 В головне меню",
        "home",
    )]);

    InlineKeyboardMarkup {
        inline_keyboard: rows,
    }
}

/// Actions under a day's short view.
pub fn kb_day_actions(mode: WeekMode, day: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::callback(
                "ℹ️ Детальніше",
                &format!("detail:{}:{day}", mode.key()),
            )],
            vec![
                InlineKeyboardButton::callback(
                    "⬅️ Назад до днів",
                    &format!("back_days:{}", mode.key()),
                ),
                InlineKeyboardButton::callback("🏠 Меню", "home"),
            ],
        ],
    }
}

/// Actions under a day's detailed view.
pub fn kb_detail_actions(mode: WeekMode) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![
            InlineKeyboardButton::callback(
                "⬅️ Назад до днів",
                &format!("back_days:{}", mode.key()),
            ),
            InlineKeyboardButton::callback("🏠 Меню", "home"),
        ]],
    }
}

/// Notification toggles with their stored state.
pub fn kb_notifications(prefs: &Preferences) -> InlineKeyboardMarkup {
    let mark = |on: bool| if on { "✅" } else { "☐" };
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::callback(
                &format!("{} За годину до першої пари", mark(prefs.notify_hour_before)),
                "notif:toggle:hour",
            )],
            vec![InlineKeyboardButton::callback(
                &format!("{} За 5 хвилин до пари", mark(prefs.notify_five_min_before)),
                "notif:toggle:5min",
            )],
            vec![InlineKeyboardButton::callback("🏠 В головне меню", "home")],
        ],
    }
}
