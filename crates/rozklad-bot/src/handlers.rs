//! Command and callback handlers.
//!
//! Text surface follows the original menus: HTML parse mode, Ukrainian
//! strings, every callback answered so the client drops its spinner.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Datelike;
use tracing::{debug, info, warn};

use rozklad_config::BotConfig;
use rozklad_scheduler::{ReminderPlanner, RotationController, TimeSource};
use rozklad_store::Store;
use rozklad_telegram::types::{
    AnswerCallbackQueryParams, BotCommand, EditMessageTextParams, InlineKeyboardMarkup,
    SendMessageParams,
};
use rozklad_telegram::{BotEvent, TelegramApi};
use rozklad_timetable::{
    TimetableIndex, render_bells, render_day_detailed, render_day_short, week_title,
};
use rozklad_types::{WeekMode, day_name, has_lessons, weekday_from_name};

use crate::keyboards;

const NOTIF_MENU_TEXT: &str = "🔔 <b>Нагадування</b>\n\nОбери, які нагадування надсилати:";

/// Everything a handler may touch.
pub struct BotContext {
    pub api: TelegramApi,
    pub store: Arc<Store>,
    pub index: Arc<TimetableIndex>,
    pub planner: Arc<ReminderPlanner>,
    pub rotation: Arc<RotationController>,
    pub config: BotConfig,
    pub time: TimeSource,
    pub data_dir: PathBuf,
}

/// Commands advertised in the Telegram command menu.
///
/// Admin commands (/reload, /setweek, /autorotate) stay unlisted.
pub fn bot_commands() -> Vec<BotCommand> {
    [
        ("start", "Головне меню"),
        ("today", "Пари на сьогодні"),
        ("week", "Який зараз тиждень"),
        ("bells", "Розклад дзвінків"),
        ("notify", "Налаштування нагадувань"),
    ]
    .into_iter()
    .map(|(command, description)| BotCommand {
        command: command.to_string(),
        description: description.to_string(),
    })
    .collect()
}

/// Route one event; failures are logged, never propagated to the loop.
pub async fn handle_event(ctx: &BotContext, event: BotEvent) {
    let result = match event {
        BotEvent::Command {
            chat_id,
            from_id,
            command,
            args,
        } => {
            debug!(chat_id, command, "Handling command");
            handle_command(ctx, chat_id, from_id, &command, &args).await
        }
        BotEvent::Callback {
            id,
            chat_id,
            message_id,
            data,
        } => {
            debug!(chat_id, data, "Handling callback");
            handle_callback(ctx, &id, chat_id, message_id, &data).await
        }
    };
    if let Err(e) = result {
        warn!("Handler failed: {e}");
    }
}

// ─── Commands ────────────────────────────────────────────────────────────

async fn handle_command(
    ctx: &BotContext,
    chat_id: i64,
    from_id: i64,
    command: &str,
    args: &str,
) -> Result<()> {
    match command {
        "start" => {
            ctx.store.ensure_subscriber(chat_id)?;
            send(
                ctx,
                chat_id,
                "Привіт! 👋 Обери режим:".to_string(),
                Some(keyboards::kb_main()),
            )
            .await
        }
        "bells" => {
            ctx.api
                .send_message(&SendMessageParams {
                    chat_id,
                    text: render_bells(&ctx.index.bells()),
                    parse_mode: Some("HTML".into()),
                    disable_web_page_preview: Some(true),
                    reply_markup: Some(keyboards::kb_home_only()),
                })
                .await?;
            Ok(())
        }
        "today" => cmd_today(ctx, chat_id).await,
        "week" => {
            let mode = ctx.store.active_week_mode()?;
            let auto = ctx.store.auto_rotate_enabled()?;
            send(ctx, chat_id, week_status_text(mode, auto), None).await
        }
        "notify" => {
            ctx.store.ensure_subscriber(chat_id)?;
            let prefs = ctx.store.preferences(chat_id)?;
            send(
                ctx,
                chat_id,
                NOTIF_MENU_TEXT.to_string(),
                Some(keyboards::kb_notifications(&prefs)),
            )
            .await
        }
        "reload" | "setweek" | "autorotate" if !ctx.config.is_admin(from_id) => {
            warn!(chat_id, from_id, command, "Admin command from non-admin");
            send(
                ctx,
                chat_id,
                "⛔ Команда доступна лише адміністраторам.".to_string(),
                None,
            )
            .await
        }
        "reload" => cmd_reload(ctx, chat_id).await,
        "setweek" => cmd_setweek(ctx, chat_id, args).await,
        "autorotate" => cmd_autorotate(ctx, chat_id, args).await,
        _ => {
            debug!(command, "Unknown command");
            Ok(())
        }
    }
}

async fn cmd_today(ctx: &BotContext, chat_id: i64) -> Result<()> {
    let today = ctx.time.now().weekday();
    if !has_lessons(today) {
        return send(
            ctx,
            chat_id,
            "📅 Сьогодні вихідний, пар немає 🎉".to_string(),
            Some(keyboards::kb_home_only()),
        )
        .await;
    }

    let mode = ctx.store.active_week_mode()?;
    let name = day_name(today);
    let pairs = ctx.index.periods_on(mode, today);
    let text = format!("{}\n\n{}", week_title(mode), render_day_short(name, &pairs));
    send(ctx, chat_id, text, Some(keyboards::kb_day_actions(mode, name))).await
}

async fn cmd_reload(ctx: &BotContext, chat_id: i64) -> Result<()> {
    match ctx.index.reload(&ctx.data_dir) {
        Ok(report) => {
            info!(
                practical = report.practical_lessons,
                lecture = report.lecture_lessons,
                "Timetables reloaded by admin"
            );
            let summary = ctx.planner.replan_all()?;
            let text = format!(
                "🔄 Розклади перезавантажено з файлів.\n\n\
                 Практичних пар: {}, лекційних: {}.\n\
                 Переплановано нагадувань: {} (підписників: {}).",
                report.practical_lessons,
                report.lecture_lessons,
                summary.scheduled,
                summary.subscribers
            );
            send(ctx, chat_id, text, None).await
        }
        Err(e) => {
            warn!("Reload failed, keeping previous snapshot: {e}");
            send(
                ctx,
                chat_id,
                format!("⚠️ Помилка читання розкладів: {e}\nПопередній розклад залишено."),
                None,
            )
            .await
        }
    }
}

async fn cmd_setweek(ctx: &BotContext, chat_id: i64, args: &str) -> Result<()> {
    let Some(mode) = WeekMode::from_key(args.trim()) else {
        return send(
            ctx,
            chat_id,
            "Використання: /setweek practical|lecture".to_string(),
            None,
        )
        .await;
    };
    let summary = ctx.rotation.set_week(mode)?;
    info!(mode = %mode, "Week mode set by admin");
    send(
        ctx,
        chat_id,
        format!(
            "✅ Встановлено: {}\nПереплановано нагадувань: {}.",
            week_title(mode),
            summary.scheduled
        ),
        None,
    )
    .await
}

async fn cmd_autorotate(ctx: &BotContext, chat_id: i64, args: &str) -> Result<()> {
    let enabled = match args.trim() {
        "on" => true,
        "off" => false,
        _ => {
            return send(
                ctx,
                chat_id,
                "Використання: /autorotate on|off".to_string(),
                None,
            )
            .await;
        }
    };
    ctx.store.set_auto_rotate(enabled)?;
    info!(enabled, "Auto-rotate switched by admin");
    let text = if enabled {
        "✅ Автозміну тижня увімкнено."
    } else {
        "✅ Автозміну тижня вимкнено."
    };
    send(ctx, chat_id, text.to_string(), None).await
}

// ─── Callbacks ───────────────────────────────────────────────────────────

async fn handle_callback(
    ctx: &BotContext,
    id: &str,
    chat_id: i64,
    message_id: i64,
    data: &str,
) -> Result<()> {
    if data == "home" {
        edit(
            ctx,
            chat_id,
            message_id,
            "Головне меню:".to_string(),
            Some(keyboards::kb_main()),
        )
        .await?;
        return answer(ctx, id, Some("Вже тут ✅")).await;
    }
    if data == "bells" {
        safe_edit(&ctx.api, &EditMessageTextParams {
            chat_id,
            message_id,
            text: render_bells(&ctx.index.bells()),
            parse_mode: Some("HTML".into()),
            disable_web_page_preview: Some(true),
            reply_markup: Some(keyboards::kb_home_only()),
        })
        .await?;
        return answer(ctx, id, Some("Розклад дзвінків відкритий 🔔")).await;
    }
    if let Some(key) = data.strip_prefix("week:") {
        return cb_week(ctx, id, chat_id, message_id, key, None).await;
    }
    if let Some(key) = data.strip_prefix("back_days:") {
        return cb_week(ctx, id, chat_id, message_id, key, Some("Повернув до списку днів ↩️"))
            .await;
    }
    if let Some(rest) = data.strip_prefix("day:") {
        return cb_day(ctx, id, chat_id, message_id, rest, false).await;
    }
    if let Some(rest) = data.strip_prefix("detail:") {
        return cb_day(ctx, id, chat_id, message_id, rest, true).await;
    }
    if data == "notif:menu" {
        ctx.store.ensure_subscriber(chat_id)?;
        let prefs = ctx.store.preferences(chat_id)?;
        edit(
            ctx,
            chat_id,
            message_id,
            NOTIF_MENU_TEXT.to_string(),
            Some(keyboards::kb_notifications(&prefs)),
        )
        .await?;
        return answer(ctx, id, None).await;
    }
    if let Some(which) = data.strip_prefix("notif:toggle:") {
        return cb_notif_toggle(ctx, id, chat_id, message_id, which).await;
    }

    debug!(data, "Unknown callback data");
    answer(ctx, id, None).await
}

/// Day picker for a week mode; also serves "back to days".
async fn cb_week(
    ctx: &BotContext,
    id: &str,
    chat_id: i64,
    message_id: i64,
    key: &str,
    toast: Option<&str>,
) -> Result<()> {
    let Some(mode) = WeekMode::from_key(key) else {
        debug!(key, "Unknown week key");
        return answer(ctx, id, None).await;
    };

    if ctx.index.mode_is_empty(mode) {
        let adjective = mode_adjective(mode);
        edit(
            ctx,
            chat_id,
            message_id,
            format!("ℹ️ Наразі {adjective} розклад відсутній."),
            Some(keyboards::kb_home_only()),
        )
        .await?;
        let toast = format!("Наразі {adjective} розклад відсутній ℹ️");
        return answer(ctx, id, Some(toast.as_str())).await;
    }

    edit(
        ctx,
        chat_id,
        message_id,
        format!("{}\n\nОберіть день:", week_title(mode)),
        Some(keyboards::kb_days(mode)),
    )
    .await?;
    answer(ctx, id, toast).await
}

async fn cb_day(
    ctx: &BotContext,
    id: &str,
    chat_id: i64,
    message_id: i64,
    rest: &str,
    detailed: bool,
) -> Result<()> {
    let Some((mode, day, weekday)) = parse_day_callback(rest) else {
        debug!(rest, "Malformed day callback");
        return answer(ctx, id, None).await;
    };

    let pairs = ctx.index.periods_on(mode, weekday);
    let (text, kb) = if detailed {
        (render_day_detailed(day, &pairs), keyboards::kb_detail_actions(mode))
    } else {
        (render_day_short(day, &pairs), keyboards::kb_day_actions(mode, day))
    };
    edit(ctx, chat_id, message_id, text, Some(kb)).await?;
    answer(ctx, id, None).await
}

async fn cb_notif_toggle(
    ctx: &BotContext,
    id: &str,
    chat_id: i64,
    message_id: i64,
    which: &str,
) -> Result<()> {
    ctx.store.ensure_subscriber(chat_id)?;
    let mut prefs = ctx.store.preferences(chat_id)?;
    let enabled = match which {
        "hour" => {
            prefs.notify_hour_before = !prefs.notify_hour_before;
            prefs.notify_hour_before
        }
        "5min" => {
            prefs.notify_five_min_before = !prefs.notify_five_min_before;
            prefs.notify_five_min_before
        }
        _ => {
            debug!(which, "Unknown notification toggle");
            return answer(ctx, id, None).await;
        }
    };

    // Persist first; only a stored preference is worth replanning.
    if let Err(e) = ctx.store.set_preferences(chat_id, prefs) {
        warn!(chat_id, "Failed to store preferences: {e}");
        return answer(ctx, id, Some("⚠️ Не вдалося зберегти налаштування")).await;
    }

    let toast = match ctx.planner.replan(chat_id) {
        Ok(summary) => {
            debug!(chat_id, scheduled = summary.scheduled, "Replanned after toggle");
            if enabled { "Увімкнено 🔔" } else { "Вимкнено 🔕" }
        }
        Err(e) => {
            warn!(chat_id, "Replan after toggle failed: {e}");
            "⚠️ Не вдалося оновити нагадування"
        }
    };

    edit(
        ctx,
        chat_id,
        message_id,
        NOTIF_MENU_TEXT.to_string(),
        Some(keyboards::kb_notifications(&prefs)),
    )
    .await?;
    answer(ctx, id, Some(toast)).await
}

// ─── Helpers ─────────────────────────────────────────────────────────────

fn mode_adjective(mode: WeekMode) -> &'static str {
    match mode {
        WeekMode::Practical => "практичний",
        WeekMode::Lecture => "лекційний",
    }
}

fn week_status_text(mode: WeekMode, auto_rotate: bool) -> String {
    let auto = if auto_rotate {
        "✅ увімкнена"
    } else {
        "❌ вимкнена"
    };
    format!("Зараз діє: {}\nАвтозміна тижня: {auto}", week_title(mode))
}

fn parse_day_callback(rest: &str) -> Option<(WeekMode, &str, chrono::Weekday)> {
    let (key, day) = rest.split_once(':')?;
    let mode = WeekMode::from_key(key)?;
    // The day picker only offers Mon..Fri; anything else is forged.
    let weekday = weekday_from_name(day).filter(|d| has_lessons(*d))?;
    Some((mode, day, weekday))
}

async fn send(
    ctx: &BotContext,
    chat_id: i64,
    text: String,
    reply_markup: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    ctx.api
        .send_message(&SendMessageParams {
            chat_id,
            text,
            parse_mode: Some("HTML".into()),
            disable_web_page_preview: None,
            reply_markup,
        })
        .await?;
    Ok(())
}

async fn edit(
    ctx: &BotContext,
    chat_id: i64,
    message_id: i64,
    text: String,
    reply_markup: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    safe_edit(&ctx.api, &EditMessageTextParams {
        chat_id,
        message_id,
        text,
        parse_mode: Some("HTML".into()),
        disable_web_page_preview: None,
        reply_markup,
    })
    .await
}

/// Edit swallowing Telegram's "message is not modified" rejection.
async fn safe_edit(api: &TelegramApi, params: &EditMessageTextParams) -> Result<()> {
    match api.edit_message_text(params).await {
        Ok(_) => Ok(()),
        Err(e) if is_not_modified(&e) => {
            debug!("Edit skipped: message not modified");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn is_not_modified(e: &anyhow::Error) -> bool {
    e.to_string().contains("message is not modified")
}

/// Every callback gets answered so the client drops its spinner.
async fn answer(ctx: &BotContext, id: &str, text: Option<&str>) -> Result<()> {
    ctx.api
        .answer_callback_query(&AnswerCallbackQueryParams {
            callback_query_id: id.to_string(),
            text: text.map(|t| t.to_string()),
        })
        .await
}
