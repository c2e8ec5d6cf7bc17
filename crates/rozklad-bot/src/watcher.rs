//! Timetable data directory watcher for hot-reload.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rozklad_scheduler::ReminderPlanner;
use rozklad_timetable::TimetableIndex;

/// Start watching the data directory for timetable changes.
/// Returns a JoinHandle that finishes once the token is cancelled.
pub fn start_data_watcher(
    data_dir: PathBuf,
    index: Arc<TimetableIndex>,
    planner: Arc<ReminderPlanner>,
    cancel: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    if !data_dir.exists() {
        info!(
            "Data directory {} does not exist yet, skipping watcher",
            data_dir.display()
        );
        return None;
    }

    let handle = tokio::task::spawn_blocking(move || {
        run_watcher(data_dir, index, planner, cancel);
    });

    Some(handle)
}

fn run_watcher(
    data_dir: PathBuf,
    index: Arc<TimetableIndex>,
    planner: Arc<ReminderPlanner>,
    cancel: CancellationToken,
) {
    let (tx, rx) = std::sync::mpsc::channel();

    let mut debouncer = match new_debouncer(Duration::from_secs(1), tx) {
        Ok(d) => d,
        Err(e) => {
            warn!("Failed to create file watcher: {e}");
            return;
        }
    };

    if let Err(e) = debouncer
        .watcher()
        .watch(&data_dir, notify::RecursiveMode::NonRecursive)
    {
        warn!("Failed to watch data directory: {e}");
        return;
    }

    info!("Data watcher started: watching {}", data_dir.display());

    // Poll with a timeout so cancellation is noticed without an event.
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(Ok(events)) => {
                let data_changed = events.iter().any(|event| {
                    event.kind == DebouncedEventKind::Any
                        && event.path.extension().is_some_and(|ext| ext == "json")
                });

                if data_changed {
                    info!("Timetable files changed, reloading...");
                    reload_and_replan(&data_dir, &index, &planner);
                }
            }
            Ok(Err(e)) => {
                warn!("Data watcher error: {e:?}");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("Data watcher stopped");
}

fn reload_and_replan(
    data_dir: &std::path::Path,
    index: &Arc<TimetableIndex>,
    planner: &Arc<ReminderPlanner>,
) {
    match index.reload(data_dir) {
        Ok(report) => {
            info!(
                practical = report.practical_lessons,
                lecture = report.lecture_lessons,
                "Timetable reloaded"
            );
            match planner.replan_all() {
                Ok(summary) => info!(
                    subscribers = summary.subscribers,
                    scheduled = summary.scheduled,
                    "Reminders replanned"
                ),
                Err(e) => warn!("Replan after reload failed: {e}"),
            }
        }
        Err(e) => {
            warn!("Failed to reload timetables, keeping previous snapshot: {e}");
        }
    }
}
