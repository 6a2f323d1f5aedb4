/// Per-task time tracking.
///
/// Two states: Stopped `{timeTracked}` and Running `{timeTracked, lastStarted}`.
/// Start records a server timestamp; stop adds the client-measured elapsed time
/// through an atomic increment and clears `lastStarted`. While running, the
/// displayed total is a projection recomputed every tick, never persisted.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::storage::Fields;
use crate::types::Task;

pub const DISPLAY_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerState {
    Stopped {
        time_tracked: f64,
    },
    Running {
        time_tracked: f64,
        /// `None` only for inconsistent stored data; treated as "started now".
        last_started: Option<DateTime<Utc>>,
    },
}

impl TimerState {
    pub fn of(task: &Task) -> Self {
        let time_tracked = task.time_tracked.max(0.0);
        if task.is_tracking {
            TimerState::Running {
                time_tracked,
                last_started: task.last_started,
            }
        } else {
            TimerState::Stopped { time_tracked }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TimerState::Running { .. })
    }

    /// Total seconds to display at `now`.
    pub fn displayed_seconds(&self, now: DateTime<Utc>) -> f64 {
        match *self {
            TimerState::Stopped { time_tracked } => time_tracked,
            TimerState::Running {
                time_tracked,
                last_started,
            } => time_tracked + elapsed_seconds(last_started, now),
        }
    }
}

/// Fractional seconds from `last_started` to `now`, never negative.
/// A missing start counts as "now", i.e. zero elapsed.
pub fn elapsed_seconds(last_started: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(start) = last_started else {
        return 0.0;
    };
    let micros = (now - start).num_microseconds().unwrap_or(0);
    (micros as f64 / 1_000_000.0).max(0.0)
}

pub fn displayed_seconds(task: &Task, now: DateTime<Utc>) -> f64 {
    TimerState::of(task).displayed_seconds(now)
}

/// A timer transition to persist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerCommand {
    Start,
    Stop { elapsed: f64 },
}

impl TimerCommand {
    pub fn to_fields(&self) -> Fields {
        match *self {
            TimerCommand::Start => Fields::new()
                .set("isTracking", true)
                .server_timestamp("lastStarted"),
            TimerCommand::Stop { elapsed } => Fields::new()
                .set("isTracking", false)
                .set("lastStarted", Value::Null)
                .increment("timeTracked", elapsed),
        }
    }
}

/// Start a stopped timer. A running timer is left alone so elapsed but
/// unpersisted time is never lost.
pub fn plan_start(task: &Task) -> Option<TimerCommand> {
    if TimerState::of(task).is_running() {
        log::debug!("[taskflow.timer] Timer for {} already running", task.id);
        return None;
    }
    Some(TimerCommand::Start)
}

/// Stop a running timer, measuring elapsed time against `now`.
pub fn plan_stop(task: &Task, now: DateTime<Utc>) -> Option<TimerCommand> {
    match TimerState::of(task) {
        TimerState::Running { last_started, .. } => {
            if last_started.is_none() {
                log::warn!(
                    "[taskflow.timer] Task {} is tracking without a start time, stopping with zero elapsed",
                    task.id
                );
            }
            Some(TimerCommand::Stop {
                elapsed: elapsed_seconds(last_started, now),
            })
        }
        TimerState::Stopped { .. } => None,
    }
}

pub fn plan_toggle(task: &Task, now: DateTime<Utc>) -> TimerCommand {
    plan_stop(task, now).unwrap_or(TimerCommand::Start)
}

/// `HH:MM:SS`, flooring each component. Negative and NaN inputs show zero.
pub fn format_hms(total_seconds: f64) -> String {
    let total = if total_seconds.is_nan() || total_seconds < 0.0 {
        0.0
    } else {
        total_seconds
    };
    let hours = (total / 3600.0).floor() as u64;
    let minutes = ((total % 3600.0) / 60.0).floor() as u64;
    let seconds = (total % 60.0).floor() as u64;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Ticking display for one task: refreshes the formatted total every period
/// while the task runs, and on every task change.
pub struct TimerDisplay {
    task_tx: watch::Sender<Task>,
    text_rx: watch::Receiver<String>,
    handle: JoinHandle<()>,
}

impl TimerDisplay {
    pub fn spawn(task: Task, clock: Arc<dyn Clock>, period: Duration) -> Self {
        let initial = format_hms(displayed_seconds(&task, clock.now()));
        let (task_tx, mut task_rx) = watch::channel(task);
        let (text_tx, text_rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                let task = task_rx.borrow_and_update().clone();
                text_tx.send_replace(format_hms(displayed_seconds(&task, clock.now())));
                if text_tx.is_closed() {
                    break;
                }
                if task.is_tracking {
                    tokio::select! {
                        _ = interval.tick() => {}
                        changed = task_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                } else if task_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        Self {
            task_tx,
            text_rx,
            handle,
        }
    }

    /// Feed the latest mirrored version of the task.
    pub fn update(&self, task: Task) {
        self.task_tx.send_replace(task);
    }

    pub fn text(&self) -> String {
        self.text_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<String> {
        self.text_rx.clone()
    }
}

impl Drop for TimerDisplay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
