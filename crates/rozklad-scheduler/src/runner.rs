//! The scheduler loop: take due jobs each tick and dispatch them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Weekday;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rozklad_timetable::{TimetableIndex, render_five_min_reminder, render_hour_reminder};
use rozklad_types::WeekMode;

use crate::planner::ReminderPlanner;
use crate::registry::JobRegistry;
use crate::rotation::RotationController;
use crate::sink::DeliverySink;
use crate::{JobPayload, ReminderKind, ScheduledJob};

/// Poll interval; reminders land within this of their instant.
const TICK: Duration = Duration::from_secs(15);

/// Everything the loop needs, shared with the rest of the bot.
pub struct SchedulerContext {
    pub registry: Arc<JobRegistry>,
    pub planner: Arc<ReminderPlanner>,
    pub rotation: Arc<RotationController>,
    pub index: Arc<TimetableIndex>,
    pub sink: Arc<dyn DeliverySink>,
}

/// Run the scheduler until cancelled.
///
/// Startup order matters: first fire what came due while the process was
/// down (take_due drops anything past grace), then install the recurring
/// triggers, then replan everyone. A restart mid-day never leaves the
/// pending set empty.
pub async fn run_scheduler(ctx: SchedulerContext, cancel: CancellationToken) {
    startup(&ctx).await;
    info!("Scheduler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let counters = ctx.registry.counters();
                info!(
                    fired = counters.fired,
                    dropped_stale = counters.dropped_stale,
                    "Scheduler stopped"
                );
                break;
            }
            _ = tokio::time::sleep(TICK) => {
                tick(&ctx).await;
            }
        }
    }
}

async fn startup(ctx: &SchedulerContext) {
    match ctx.registry.take_due() {
        Ok(missed) => {
            if !missed.is_empty() {
                info!("Firing {} jobs missed during downtime", missed.len());
            }
            for job in missed {
                dispatch(ctx, job).await;
            }
        }
        Err(e) => warn!(error = %e, "Startup drain failed"),
    }
    if let Err(e) = ctx.rotation.install() {
        warn!(error = %e, "Failed to install maintenance triggers");
    }
    match ctx.planner.replan_all() {
        Ok(summary) => info!(
            subscribers = summary.subscribers,
            scheduled = summary.scheduled,
            "Startup replan complete"
        ),
        Err(e) => warn!(error = %e, "Startup replan failed"),
    }
}

async fn tick(ctx: &SchedulerContext) {
    let due = match ctx.registry.take_due() {
        Ok(due) => due,
        Err(e) => {
            warn!(error = %e, "take_due failed");
            return;
        }
    };
    for job in due {
        dispatch(ctx, job).await;
    }
}

/// Dispatch one fired job. Failures are logged, never propagated: one
/// bad job must not stall the loop, and a consumed job is not retried.
async fn dispatch(ctx: &SchedulerContext, job: ScheduledJob) {
    debug!(job_id = %job.id, "Dispatching job");
    match job.payload {
        JobPayload::Reminder {
            chat_id,
            kind,
            mode,
            weekday,
            ordinal,
        } => {
            let Some(text) = render_reminder(&ctx.index, kind, mode, weekday, ordinal) else {
                warn!(job_id = %job.id, "Lesson no longer resolves, reminder skipped");
                return;
            };
            if let Err(e) = ctx.sink.deliver(chat_id, text).await {
                warn!(job_id = %job.id, chat_id, error = %e, "Reminder delivery failed");
            }
        }
        JobPayload::DailyReplan => match ctx.rotation.on_daily_tick() {
            Ok(summary) => info!(
                subscribers = summary.subscribers,
                scheduled = summary.scheduled,
                "Daily replan complete"
            ),
            Err(e) => warn!(error = %e, "Daily replan failed"),
        },
        JobPayload::WeeklyRotate => {
            if let Err(e) = ctx.rotation.on_weekly_tick() {
                warn!(error = %e, "Weekly rotation failed");
            }
        }
    }
}

/// Re-render a reminder from the current snapshot so edits between
/// planning and firing show up in the delivered text.
fn render_reminder(
    index: &TimetableIndex,
    kind: ReminderKind,
    mode: WeekMode,
    weekday: Weekday,
    ordinal: u8,
) -> Option<String> {
    let snapshot = index.snapshot();
    match kind {
        ReminderKind::HourBefore => {
            let lessons = snapshot.periods_on(mode, weekday);
            let first = lessons.first()?;
            let start = snapshot.start_time_of(first.ordinal)?;
            Some(render_hour_reminder(lessons, start))
        }
        ReminderKind::FiveMinBefore => {
            let lesson = snapshot.lesson(mode, weekday, ordinal)?;
            let start = snapshot.start_time_of(ordinal)?;
            Some(render_five_min_reminder(lesson, start))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, TimeSource};
    use crate::rotation::RotationSchedule;
    use crate::sink::testing::MockSink;
    use crate::store::JobStore;
    use crate::{REMINDER_GRACE_SECS, hour_job_id, period_job_id};
    use chrono::{DateTime, TimeZone, Utc};
    use rozklad_store::Store;
    use rozklad_types::Preferences;

    struct TestEnv {
        _dir: tempfile::TempDir,
        ctx: SchedulerContext,
        sink: Arc<MockSink>,
        store: Arc<Store>,
        clock: Arc<FixedClock>,
    }

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, d, h, m, 0).unwrap()
    }

    fn env_at(now: DateTime<Utc>) -> TestEnv {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("practical.json"),
            r#"{"Понеділок": [
                {"pair": 1, "subject": "Математика"},
                {"pair": 2, "subject": "Фізика"}
            ]}"#,
        )
        .unwrap();
        let (index, _) = TimetableIndex::load(dir.path()).unwrap();
        let index = Arc::new(index);

        let clock = Arc::new(FixedClock::at(now));
        let time = TimeSource::new(clock.clone(), chrono_tz::Europe::Kyiv);
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = Arc::new(
            JobRegistry::open(JobStore::open_in_memory().unwrap(), time.clone()).unwrap(),
        );
        let planner = Arc::new(ReminderPlanner::new(
            store.clone(),
            index.clone(),
            registry.clone(),
            time.clone(),
        ));
        let rotation = Arc::new(RotationController::new(
            store.clone(),
            registry.clone(),
            planner.clone(),
            time,
            RotationSchedule::default(),
        ));
        let sink = Arc::new(MockSink::default());
        let ctx = SchedulerContext {
            registry,
            planner,
            rotation,
            index,
            sink: sink.clone(),
        };
        TestEnv {
            _dir: dir,
            ctx,
            sink,
            store,
            clock,
        }
    }

    fn five_min_job(chat_id: i64, ordinal: u8, fire_at: DateTime<Utc>) -> ScheduledJob {
        ScheduledJob {
            id: period_job_id(chat_id, ordinal),
            fire_at,
            grace_secs: REMINDER_GRACE_SECS,
            payload: JobPayload::Reminder {
                chat_id,
                kind: ReminderKind::FiveMinBefore,
                mode: WeekMode::Practical,
                weekday: Weekday::Mon,
                ordinal,
            },
            recurrence: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_renders_from_current_snapshot() {
        let env = env_at(utc(1, 4, 0));
        dispatch(&env.ctx, five_min_job(42, 2, utc(1, 7, 25))).await;

        let sent = env.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 42);
        assert!(sent[0].1.contains("Фізика"));
        assert!(sent[0].1.contains("<b>10:30</b>"));
    }

    #[tokio::test]
    async fn test_dispatch_skips_vanished_lesson() {
        let env = env_at(utc(1, 4, 0));
        // Period 5 exists in the bell table but not in the timetable.
        dispatch(&env.ctx, five_min_job(42, 5, utc(1, 7, 25))).await;
        assert!(env.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_hour_reminder_lists_whole_day() {
        let env = env_at(utc(1, 4, 0));
        let job = ScheduledJob {
            id: hour_job_id(42),
            fire_at: utc(1, 5, 0),
            grace_secs: REMINDER_GRACE_SECS,
            payload: JobPayload::Reminder {
                chat_id: 42,
                kind: ReminderKind::HourBefore,
                mode: WeekMode::Practical,
                weekday: Weekday::Mon,
                ordinal: 1,
            },
            recurrence: None,
        };
        dispatch(&env.ctx, job).await;

        let sent = env.sink.sent();
        assert_eq!(sent.len(), 1);
        let text = &sent[0].1;
        assert!(text.contains("<b>09:00</b>"));
        assert!(text.contains("Математика"));
        assert!(text.contains("Фізика"));
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_panic_or_retry() {
        let env = env_at(utc(1, 4, 0));
        env.sink.fail.store(true, std::sync::atomic::Ordering::Relaxed);
        dispatch(&env.ctx, five_min_job(42, 2, utc(1, 7, 25))).await;
        assert!(env.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_startup_fires_missed_job_then_replans() {
        let env = env_at(utc(1, 4, 0));
        env.store
            .set_preferences(42, Preferences {
                notify_hour_before: true,
                notify_five_min_before: false,
            })
            .unwrap();
        // A job planned earlier, now two minutes past due.
        env.ctx
            .registry
            .upsert(five_min_job(42, 1, utc(1, 4, 30)))
            .unwrap();
        env.clock.set(utc(1, 4, 32));

        startup(&env.ctx).await;

        // The missed five-min reminder fired exactly once.
        let sent = env.sink.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Математика"));

        // Triggers installed and the day replanned.
        let ids: Vec<String> = env
            .ctx
            .registry
            .pending()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert!(ids.contains(&"sys:daily-replan".to_string()));
        assert!(ids.contains(&"sys:weekly-rotate".to_string()));
        assert!(ids.contains(&hour_job_id(42)));
    }

    #[tokio::test]
    async fn test_scheduler_loop_stops_on_cancellation() {
        let env = env_at(utc(1, 4, 0));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_scheduler(env.ctx, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_weekly_rotate_dispatch_flips_mode() {
        let env = env_at(utc(1, 4, 0));
        let job = ScheduledJob {
            id: crate::WEEKLY_ROTATE_ID.to_string(),
            fire_at: utc(1, 4, 0),
            grace_secs: crate::MAINTENANCE_GRACE_SECS,
            payload: JobPayload::WeeklyRotate,
            recurrence: None,
        };
        dispatch(&env.ctx, job).await;
        assert_eq!(env.store.active_week_mode().unwrap(), WeekMode::Lecture);
    }
}
