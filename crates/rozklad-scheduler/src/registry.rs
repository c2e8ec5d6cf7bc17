//! The single source of truth for pending jobs.
//!
//! One mutex guards the in-memory map and every mutation mirrors to the
//! job store before the lock drops. Two concurrent replans for the same
//! chat therefore serialize instead of interleaving, and a job id never
//! has two live entries.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::ScheduledJob;
use crate::clock::TimeSource;
use crate::store::JobStore;
use crate::when::next_occurrence;

/// Running totals, for operator visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounters {
    pub fired: u64,
    pub dropped_stale: u64,
}

/// What a replace_prefix call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub cancelled: usize,
    pub installed: usize,
    pub rejected_past: usize,
}

pub struct JobRegistry {
    store: JobStore,
    jobs: Mutex<BTreeMap<String, ScheduledJob>>,
    time: TimeSource,
    fired: AtomicU64,
    dropped_stale: AtomicU64,
}

impl JobRegistry {
    /// Open the registry over its persistent store, loading whatever
    /// survived the last shutdown.
    pub fn open(store: JobStore, time: TimeSource) -> Result<Self> {
        let persisted = store.list()?;
        let mut jobs = BTreeMap::new();
        for job in persisted {
            jobs.insert(job.id.clone(), job);
        }
        if !jobs.is_empty() {
            info!("Recovered {} pending jobs", jobs.len());
        }
        Ok(Self {
            store,
            jobs: Mutex::new(jobs),
            time,
            fired: AtomicU64::new(0),
            dropped_stale: AtomicU64::new(0),
        })
    }

    /// Insert or replace a job by id. A one-shot job whose instant has
    /// already passed is a no-op; recurring jobs may carry an elapsed
    /// instant and roll forward at take time.
    pub fn upsert(&self, job: ScheduledJob) -> Result<bool> {
        let now = self.time.now_utc();
        let mut jobs = self.jobs.lock().unwrap();
        self.install_locked(&mut jobs, job, now)
    }

    fn install_locked(
        &self,
        jobs: &mut BTreeMap<String, ScheduledJob>,
        job: ScheduledJob,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if job.recurrence.is_none() && job.fire_at <= now {
            debug!(job_id = %job.id, fire_at = %job.fire_at, "Rejecting one-shot job in the past");
            return Ok(false);
        }
        self.store.upsert(&job)?;
        jobs.insert(job.id.clone(), job);
        Ok(true)
    }

    /// Cancel every pending job whose id starts with `prefix`.
    pub fn cancel_prefix(&self, prefix: &str) -> Result<usize> {
        let mut jobs = self.jobs.lock().unwrap();
        self.cancel_prefix_locked(&mut jobs, prefix)
    }

    fn cancel_prefix_locked(
        &self,
        jobs: &mut BTreeMap<String, ScheduledJob>,
        prefix: &str,
    ) -> Result<usize> {
        let ids: Vec<String> = jobs
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect();
        self.store.delete_prefix(prefix)?;
        for id in &ids {
            jobs.remove(id);
        }
        Ok(ids.len())
    }

    /// Atomically swap every job under `prefix` for the given set. This
    /// is the whole-subscriber replan primitive: cancel and install
    /// happen under one lock acquisition.
    pub fn replace_prefix(
        &self,
        prefix: &str,
        new_jobs: Vec<ScheduledJob>,
    ) -> Result<ReplaceOutcome> {
        let now = self.time.now_utc();
        let mut jobs = self.jobs.lock().unwrap();
        let cancelled = self.cancel_prefix_locked(&mut jobs, prefix)?;
        let mut outcome = ReplaceOutcome {
            cancelled,
            ..Default::default()
        };
        for job in new_jobs {
            debug_assert!(job.id.starts_with(prefix));
            if self.install_locked(&mut jobs, job, now)? {
                outcome.installed += 1;
            } else {
                outcome.rejected_past += 1;
            }
        }
        Ok(outcome)
    }

    /// Every pending job, soonest first.
    pub fn pending(&self) -> Vec<ScheduledJob> {
        let jobs = self.jobs.lock().unwrap();
        let mut all: Vec<ScheduledJob> = jobs.values().cloned().collect();
        all.sort_by_key(|j| j.fire_at);
        all
    }

    /// Remove and return the jobs whose instant has elapsed within their
    /// grace window; each fires exactly once. Jobs past grace are dropped
    /// with a warning and a counter bump. Recurring jobs stay pending
    /// with their instant advanced past now.
    pub fn take_due(&self) -> Result<Vec<ScheduledJob>> {
        let now = self.time.now_utc();
        let mut jobs = self.jobs.lock().unwrap();

        let due_ids: Vec<String> = jobs
            .values()
            .filter(|j| j.fire_at <= now)
            .map(|j| j.id.clone())
            .collect();

        let mut due = Vec::new();
        for id in due_ids {
            let Some(job) = jobs.get(&id).cloned() else {
                continue;
            };
            let within_grace = now - job.fire_at <= Duration::seconds(job.grace_secs as i64);

            match job.recurrence {
                Some(recurrence) => match next_occurrence(recurrence, self.time.tz(), now) {
                    Some(next_at) => {
                        let mut rolled = job.clone();
                        rolled.fire_at = next_at;
                        self.store.upsert(&rolled)?;
                        jobs.insert(id.clone(), rolled);
                    }
                    None => {
                        warn!(job_id = %id, "No next occurrence for recurring job, removing");
                        self.store.delete(&id)?;
                        jobs.remove(&id);
                    }
                },
                None => {
                    self.store.delete(&id)?;
                    jobs.remove(&id);
                }
            }

            if within_grace {
                self.fired.fetch_add(1, Ordering::Relaxed);
                due.push(job);
            } else {
                self.dropped_stale.fetch_add(1, Ordering::Relaxed);
                warn!(
                    job_id = %job.id,
                    fire_at = %job.fire_at,
                    grace_secs = job.grace_secs,
                    "Dropping job past its grace window"
                );
            }
        }

        due.sort_by_key(|j| j.fire_at);
        Ok(due)
    }

    pub fn counters(&self) -> RegistryCounters {
        RegistryCounters {
            fired: self.fired.load(Ordering::Relaxed),
            dropped_stale: self.dropped_stale.load(Ordering::Relaxed),
        }
    }
}
