//! Week parity rotation and the recurring maintenance triggers.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveTime, Timelike, Weekday};
use tracing::info;

use rozklad_store::Store;
use rozklad_types::WeekMode;

use crate::clock::TimeSource;
use crate::planner::{ReminderPlanner, ReplanAllSummary};
use crate::registry::JobRegistry;
use crate::when;
use crate::{
    DAILY_REPLAN_ID, JobPayload, MAINTENANCE_GRACE_SECS, Recurrence, ScheduledJob,
    WEEKLY_ROTATE_ID,
};

/// When the recurring triggers fire, in the bot timezone.
#[derive(Debug, Clone, Copy)]
pub struct RotationSchedule {
    pub rotate_weekday: Weekday,
    pub rotate_at: NaiveTime,
    pub replan_at: NaiveTime,
}

impl Default for RotationSchedule {
    /// Rotation Monday 00:05, daily replan 05:00: both after midnight
    /// and before the earliest bell, so the new day plans in full.
    fn default() -> Self {
        Self {
            rotate_weekday: Weekday::Mon,
            rotate_at: NaiveTime::from_hms_opt(0, 5, 0).unwrap_or_default(),
            replan_at: NaiveTime::from_hms_opt(5, 0, 0).unwrap_or_default(),
        }
    }
}

pub struct RotationController {
    store: Arc<Store>,
    registry: Arc<JobRegistry>,
    planner: Arc<ReminderPlanner>,
    time: TimeSource,
    schedule: RotationSchedule,
}

impl RotationController {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<JobRegistry>,
        planner: Arc<ReminderPlanner>,
        time: TimeSource,
        schedule: RotationSchedule,
    ) -> Self {
        Self {
            store,
            registry,
            planner,
            time,
            schedule,
        }
    }

    /// Upsert the two recurring triggers at their next instants.
    pub fn install(&self) -> Result<()> {
        let now = self.time.now_utc();
        let tz = self.time.tz();

        let rotate_at = when::next_weekly_occurrence(
            now,
            tz,
            self.schedule.rotate_weekday,
            self.schedule.rotate_at,
        )
        .context("no next weekly rotation instant")?;
        self.registry.upsert(ScheduledJob {
            id: WEEKLY_ROTATE_ID.to_string(),
            fire_at: rotate_at,
            grace_secs: MAINTENANCE_GRACE_SECS,
            payload: JobPayload::WeeklyRotate,
            recurrence: Some(Recurrence::Weekly {
                weekday: self.schedule.rotate_weekday,
                hour: self.schedule.rotate_at.hour() as u8,
                minute: self.schedule.rotate_at.minute() as u8,
            }),
        })?;

        let replan_at = when::next_daily_occurrence(now, tz, self.schedule.replan_at)
            .context("no next daily replan instant")?;
        self.registry.upsert(ScheduledJob {
            id: DAILY_REPLAN_ID.to_string(),
            fire_at: replan_at,
            grace_secs: MAINTENANCE_GRACE_SECS,
            payload: JobPayload::DailyReplan,
            recurrence: Some(Recurrence::Daily {
                hour: self.schedule.replan_at.hour() as u8,
                minute: self.schedule.replan_at.minute() as u8,
            }),
        })?;

        info!(rotate_at = %rotate_at, replan_at = %replan_at, "Maintenance triggers installed");
        Ok(())
    }

    /// Flip the active week mode and replan everyone. The mode persists
    /// first: if the write fails nothing rotates.
    pub fn rotate_week(&self) -> Result<WeekMode> {
        let current = self.store.active_week_mode().context("read week mode")?;
        let next = current.other();
        self.store
            .set_active_week_mode(next)
            .context("persist week mode")?;
        info!(from = %current, to = %next, "Week mode rotated");
        self.planner.replan_all()?;
        Ok(next)
    }

    /// Explicit admin override of the active mode.
    pub fn set_week(&self, mode: WeekMode) -> Result<ReplanAllSummary> {
        self.store
            .set_active_week_mode(mode)
            .context("persist week mode")?;
        info!(mode = %mode, "Week mode set");
        self.planner.replan_all()
    }

    /// Weekly trigger body: rotate unless auto-rotation is off.
    pub fn on_weekly_tick(&self) -> Result<()> {
        if self.store.auto_rotate_enabled()? {
            self.rotate_week()?;
        } else {
            info!("Auto-rotation disabled, leaving week mode in place");
        }
        Ok(())
    }

    /// Daily trigger body: replan everyone for the new day.
    pub fn on_daily_tick(&self) -> Result<ReplanAllSummary> {
        self.planner.replan_all()
    }
}
