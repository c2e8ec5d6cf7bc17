//! Wiring: config, storage, scheduler, polling, shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rozklad_config::{BotConfig, ConfigError, load_config, load_config_from};
use rozklad_scheduler::{
    JobRegistry, JobStore, ReminderPlanner, RotationController, RotationSchedule,
    SchedulerContext, TimeSource, run_scheduler,
};
use rozklad_store::Store;
use rozklad_telegram::types::SetMyCommandsParams;
use rozklad_telegram::{TelegramApi, run_polling_loop};
use rozklad_timetable::TimetableIndex;

use crate::sink::TelegramSink;
use crate::{handlers, watcher};

fn load(config_path: Option<PathBuf>) -> Result<BotConfig, ConfigError> {
    match config_path {
        Some(p) => load_config_from(&p),
        None => load_config(),
    }
}

/// Start the bot and run until Ctrl-C.
pub async fn run(
    config_path: Option<PathBuf>,
    data_dir_override: Option<PathBuf>,
    db_override: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load(config_path)?;
    let token = config.token()?;
    let tz = config.tz()?;
    let data_dir = data_dir_override.unwrap_or_else(|| config.data_dir.clone());
    let db_path = match db_override {
        Some(p) => p,
        None => config.db_path()?,
    };

    info!(timezone = %tz, db = %db_path.display(), "Starting rozklad bot");

    let store = Arc::new(Store::open(&db_path).context("Failed to open subscriber store")?);
    let time = TimeSource::system(tz);
    let registry = Arc::new(
        JobRegistry::open(
            JobStore::open(&db_path).context("Failed to open job store")?,
            time.clone(),
        )
        .context("Failed to recover scheduled jobs")?,
    );

    // Data errors are non-fatal here: the bot starts with an empty
    // snapshot and an admin /reload (or the watcher) picks the files up.
    let index = match TimetableIndex::load(&data_dir) {
        Ok((index, report)) => {
            info!(
                practical = report.practical_lessons,
                lecture = report.lecture_lessons,
                bells = report.bell_slots,
                "Timetable loaded"
            );
            if report.default_bells {
                info!("No bells.json, using the built-in bell table");
            }
            if report.unknown_days > 0 {
                warn!(skipped = report.unknown_days, "Unknown day keys in data files");
            }
            Arc::new(index)
        }
        Err(e) => {
            warn!("Failed to load timetables, starting with an empty schedule: {e}");
            Arc::new(TimetableIndex::empty())
        }
    };

    let planner = Arc::new(ReminderPlanner::new(
        store.clone(),
        index.clone(),
        registry.clone(),
        time.clone(),
    ));

    let (rotate_hour, rotate_minute) = config.rotation.time()?;
    let (replan_hour, replan_minute) = config.daily_replan.time()?;
    let schedule = RotationSchedule {
        rotate_weekday: config.rotation.weekday()?,
        rotate_at: NaiveTime::from_hms_opt(rotate_hour as u32, rotate_minute as u32, 0)
            .context("rotation time out of range")?,
        replan_at: NaiveTime::from_hms_opt(replan_hour as u32, replan_minute as u32, 0)
            .context("daily replan time out of range")?,
    };
    let rotation = Arc::new(RotationController::new(
        store.clone(),
        registry.clone(),
        planner.clone(),
        time.clone(),
        schedule,
    ));

    // Verify bot token
    let api = TelegramApi::new(&token);
    let bot = api
        .get_me()
        .await
        .context("Failed to authenticate Telegram bot")?;
    info!(
        bot_username = bot.username.as_deref().unwrap_or("unknown"),
        "Telegram bot authenticated"
    );

    if let Err(e) = api
        .set_my_commands(&SetMyCommandsParams {
            commands: handlers::bot_commands(),
        })
        .await
    {
        warn!("Failed to register bot commands: {e}");
    }

    let cancel = CancellationToken::new();

    let sink = Arc::new(TelegramSink::new(TelegramApi::new(&token)));
    let sched_ctx = SchedulerContext {
        registry: registry.clone(),
        planner: planner.clone(),
        rotation: rotation.clone(),
        index: index.clone(),
        sink,
    };
    let sched_handle = tokio::spawn(run_scheduler(sched_ctx, cancel.child_token()));

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let poll_api = TelegramApi::new(&token);
    let poll_cancel = cancel.child_token();
    let poll_handle = tokio::spawn(async move {
        run_polling_loop(&poll_api, event_tx, poll_cancel).await;
    });

    let _watcher_handle = watcher::start_data_watcher(
        data_dir.clone(),
        index.clone(),
        planner.clone(),
        cancel.child_token(),
    );

    let bot_ctx = Arc::new(handlers::BotContext {
        api,
        store,
        index,
        planner,
        rotation,
        config,
        time,
        data_dir,
    });

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let ctx = bot_ctx.clone();
                tokio::spawn(async move {
                    handlers::handle_event(&ctx, event).await;
                });
            }
        }
    }

    cancel.cancel();
    let _ = poll_handle.await;
    let _ = sched_handle.await;
    info!("Bot stopped");
    Ok(())
}

/// Validate config and data files, print a summary to stdout.
pub fn check(config_path: Option<PathBuf>, data_dir_override: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load(config_path)?;

    println!("rozklad check");
    match config.token() {
        Ok(_) => println!("  bot token: found"),
        Err(e) => println!("  bot token: MISSING ({e})"),
    }
    let tz = config.tz()?;
    println!("  timezone:  {tz}");
    println!("  admins:    {}", config.admins.len());

    let data_dir = data_dir_override.unwrap_or_else(|| config.data_dir.clone());
    println!("  data dir:  {}", data_dir.display());

    let (_, report) = TimetableIndex::load(&data_dir)?;
    println!("  practical: {} lessons", report.practical_lessons);
    println!("  lecture:   {} lessons", report.lecture_lessons);
    if report.default_bells {
        println!("  bells:     built-in table ({} slots)", report.bell_slots);
    } else {
        println!("  bells:     {} slots", report.bell_slots);
    }
    if report.unknown_days > 0 {
        println!("  warning:   {} unknown day keys skipped", report.unknown_days);
    }
    println!("OK");

    Ok(())
}
