//! Reminder planning.
//!
//! A replan is a full recomputation: figure out what today's reminders
//! for a chat should be, then atomically swap them in under the chat's
//! id prefix. Nothing is patched incrementally, so drift is impossible.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use rozklad_store::Store;
use rozklad_timetable::{TimetableIndex, TimetableSnapshot};
use rozklad_types::{Preferences, WeekMode, has_lessons};

use crate::clock::{TimeSource, resolve_in_tz};
use crate::registry::JobRegistry;
use crate::{
    FIVE_MIN_BEFORE_MIN, HOUR_BEFORE_MIN, JobPayload, REMINDER_GRACE_SECS, ReminderKind,
    ScheduledJob, chat_prefix, hour_job_id, period_job_id,
};

/// Outcome of one per-chat replan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplanSummary {
    pub scheduled: usize,
    pub cancelled: usize,
    pub skipped_past: usize,
    pub skipped_no_bell: usize,
}

/// Outcome of a sweep across every subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplanAllSummary {
    pub subscribers: usize,
    pub scheduled: usize,
    pub failed: usize,
}

pub struct ReminderPlanner {
    store: Arc<Store>,
    index: Arc<TimetableIndex>,
    registry: Arc<JobRegistry>,
    time: TimeSource,
}

impl ReminderPlanner {
    pub fn new(
        store: Arc<Store>,
        index: Arc<TimetableIndex>,
        registry: Arc<JobRegistry>,
        time: TimeSource,
    ) -> Self {
        Self {
            store,
            index,
            registry,
            time,
        }
    }

    /// Recompute today's reminder jobs for one chat and swap them in.
    pub fn replan(&self, chat_id: i64) -> Result<ReplanSummary> {
        let mode = self.store.active_week_mode().context("read week mode")?;
        let prefs = self
            .store
            .preferences(chat_id)
            .context("read preferences")?;
        let snapshot = self.index.snapshot();
        let now = self.time.now_utc();

        let (desired, mut summary) =
            plan_day(chat_id, mode, prefs, &snapshot, now, self.time.tz());

        let outcome = self
            .registry
            .replace_prefix(&chat_prefix(chat_id), desired)
            .context("replace reminder jobs")?;
        summary.scheduled = outcome.installed;
        summary.cancelled = outcome.cancelled;
        summary.skipped_past += outcome.rejected_past;

        debug!(
            chat_id,
            mode = %mode,
            scheduled = summary.scheduled,
            cancelled = summary.cancelled,
            "Replanned reminders"
        );
        Ok(summary)
    }

    /// Replan every known subscriber. A failure for one chat is logged
    /// and does not stop the sweep.
    pub fn replan_all(&self) -> Result<ReplanAllSummary> {
        let ids = self.store.subscriber_ids().context("list subscribers")?;
        let mut summary = ReplanAllSummary {
            subscribers: ids.len(),
            ..Default::default()
        };
        for chat_id in ids {
            match self.replan(chat_id) {
                Ok(one) => summary.scheduled += one.scheduled,
                Err(e) => {
                    summary.failed += 1;
                    warn!(chat_id, error = %e, "Replan failed for chat");
                }
            }
        }
        Ok(summary)
    }
}

/// Compute the desired reminder set for a chat today. Pure with respect
/// to the registry and the store: everything it needs comes in as
/// arguments.
fn plan_day(
    chat_id: i64,
    mode: WeekMode,
    prefs: Preferences,
    snapshot: &TimetableSnapshot,
    now: DateTime<Utc>,
    tz: Tz,
) -> (Vec<ScheduledJob>, ReplanSummary) {
    let mut summary = ReplanSummary::default();
    let local_now = now.with_timezone(&tz);
    let today = local_now.weekday();
    let date = local_now.date_naive();

    if !has_lessons(today) || !prefs.any_enabled() {
        return (Vec::new(), summary);
    }
    let lessons = snapshot.periods_on(mode, today);
    if lessons.is_empty() {
        return (Vec::new(), summary);
    }

    let mut desired = Vec::new();

    if prefs.notify_hour_before {
        if let Some(first) = lessons.first() {
            match start_instant(snapshot, first.ordinal, date, tz) {
                Some(start) => {
                    let fire_at = start - Duration::minutes(HOUR_BEFORE_MIN);
                    if fire_at > now {
                        desired.push(ScheduledJob {
                            id: hour_job_id(chat_id),
                            fire_at,
                            grace_secs: REMINDER_GRACE_SECS,
                            payload: JobPayload::Reminder {
                                chat_id,
                                kind: ReminderKind::HourBefore,
                                mode,
                                weekday: today,
                                ordinal: first.ordinal,
                            },
                            recurrence: None,
                        });
                    } else {
                        summary.skipped_past += 1;
                    }
                }
                None => {
                    debug!(chat_id, ordinal = first.ordinal, "No bell slot for first lesson");
                    summary.skipped_no_bell += 1;
                }
            }
        }
    }

    if prefs.notify_five_min_before {
        for lesson in lessons {
            match start_instant(snapshot, lesson.ordinal, date, tz) {
                Some(start) => {
                    let fire_at = start - Duration::minutes(FIVE_MIN_BEFORE_MIN);
                    if fire_at > now {
                        desired.push(ScheduledJob {
                            id: period_job_id(chat_id, lesson.ordinal),
                            fire_at,
                            grace_secs: REMINDER_GRACE_SECS,
                            payload: JobPayload::Reminder {
                                chat_id,
                                kind: ReminderKind::FiveMinBefore,
                                mode,
                                weekday: today,
                                ordinal: lesson.ordinal,
                            },
                            recurrence: None,
                        });
                    } else {
                        summary.skipped_past += 1;
                    }
                }
                None => {
                    debug!(chat_id, ordinal = lesson.ordinal, "No bell slot for lesson");
                    summary.skipped_no_bell += 1;
                }
            }
        }
    }

    (desired, summary)
}

fn start_instant(
    snapshot: &TimetableSnapshot,
    ordinal: u8,
    date: NaiveDate,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let start = snapshot.start_time_of(ordinal)?;
    resolve_in_tz(tz, date, start)
}
