//! rozklad-scheduler: reminder planning and timed dispatch.
//!
//! Keeps one deterministic set of pending jobs: per-subscriber lesson
//! reminders plus two recurring maintenance triggers. Planning is always
//! a full recomputation, so the pending set is exactly what the current
//! timetable, week mode and preferences imply, and job ids are derived
//! from what the job is for, never generated.

pub mod clock;
pub mod planner;
pub mod registry;
pub mod rotation;
pub mod runner;
pub mod sink;
pub mod store;
pub mod when;

use chrono::{DateTime, Utc, Weekday};
use rozklad_types::WeekMode;
use serde::{Deserialize, Serialize};

pub use clock::{Clock, FixedClock, SystemClock, TimeSource};
pub use planner::{ReminderPlanner, ReplanAllSummary, ReplanSummary};
pub use registry::{JobRegistry, RegistryCounters, ReplaceOutcome};
pub use rotation::{RotationController, RotationSchedule};
pub use runner::{SchedulerContext, run_scheduler};
pub use sink::DeliverySink;
pub use store::JobStore;

/// Lead times, in minutes before the bell.
pub const HOUR_BEFORE_MIN: i64 = 60;
pub const FIVE_MIN_BEFORE_MIN: i64 = 5;

/// Misfire grace windows, in seconds. A reminder delivered more than
/// five minutes late is noise; maintenance can tolerate an hour.
pub const REMINDER_GRACE_SECS: u32 = 300;
pub const MAINTENANCE_GRACE_SECS: u32 = 3600;

pub const WEEKLY_ROTATE_ID: &str = "sys:weekly-rotate";
pub const DAILY_REPLAN_ID: &str = "sys:daily-replan";

/// Id prefix owning every reminder job of one chat. The trailing colon
/// keeps chat 42 from matching chat 421.
pub fn chat_prefix(chat_id: i64) -> String {
    format!("notif:{chat_id}:")
}

pub fn hour_job_id(chat_id: i64) -> String {
    format!("notif:{chat_id}:hour")
}

pub fn period_job_id(chat_id: i64, ordinal: u8) -> String {
    format!("notif:{chat_id}:p{ordinal}")
}

/// Which lesson reminder a job carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    HourBefore,
    FiveMinBefore,
}

/// What a job does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Reminder {
        chat_id: i64,
        kind: ReminderKind,
        mode: WeekMode,
        weekday: Weekday,
        ordinal: u8,
    },
    DailyReplan,
    WeeklyRotate,
}

/// Wall-clock recurrence in the bot timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "every", rename_all = "snake_case")]
pub enum Recurrence {
    Daily { hour: u8, minute: u8 },
    Weekly { weekday: Weekday, hour: u8, minute: u8 },
}

/// One pending scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub fire_at: DateTime<Utc>,
    pub grace_secs: u32,
    pub payload: JobPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
}
