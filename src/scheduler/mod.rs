//! Interval scheduler for long-running background tasks.
//!
//! One `Scheduler` owns one task. Ticks spawn the task onto a tracker so
//! stopping only disarms the timer; a run already underway always finishes.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, error, info, info_span, warn};
use utoipa::ToSchema;

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(String),
}

#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self) -> TaskOutcome;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SchedulerStats {
    pub task: String,
    pub is_running: bool,
    pub in_flight: bool,
    pub interval_secs: u64,
    pub last_run_time: Option<DateTime<Utc>>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Ticks dropped because the previous run was still going.
    pub skipped_runs: u64,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct State {
    stats: SchedulerStats,
    shutdown_token: Option<CancellationToken>,
}

struct Inner {
    task: Arc<dyn ScheduledTask>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    in_flight: AtomicBool,
    tracker: TaskTracker,
}

impl Inner {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start one run unless one is already underway. Returns whether it started.
    fn launch(self: &Arc<Self>) -> bool {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.state().stats.skipped_runs += 1;
            warn!(task = self.task.name(), "previous run still in flight, skipping tick");
            return false;
        }

        let inner = Arc::clone(self);
        let span = info_span!("scheduled_run", task = self.task.name());
        self.tracker.spawn(
            async move {
                let started = inner.clock.now();
                info!("scheduled run started");
                let outcome = inner.task.execute().await;

                {
                    let mut state = inner.state();
                    let stats = &mut state.stats;
                    stats.total_runs += 1;
                    stats.last_run_time = Some(started);
                    match &outcome {
                        TaskOutcome::Succeeded => {
                            stats.successful_runs += 1;
                            stats.last_error = None;
                        }
                        TaskOutcome::Failed(reason) => {
                            stats.failed_runs += 1;
                            stats.last_error = Some(reason.clone());
                        }
                    }
                }
                inner.in_flight.store(false, Ordering::Release);

                match outcome {
                    TaskOutcome::Succeeded => info!("scheduled run finished"),
                    TaskOutcome::Failed(reason) => error!(%reason, "scheduled run failed"),
                }
            }
            .instrument(span),
        );
        true
    }
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(task: Arc<dyn ScheduledTask>, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let stats = SchedulerStats {
            task: task.name().to_string(),
            interval_secs: interval.as_secs(),
            ..SchedulerStats::default()
        };
        Self {
            inner: Arc::new(Inner {
                task,
                interval,
                clock,
                state: Mutex::new(State {
                    stats,
                    shutdown_token: None,
                }),
                in_flight: AtomicBool::new(false),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Arm the timer. The first run fires immediately. Returns false if
    /// already running.
    pub fn start(&self) -> bool {
        let token = {
            let mut state = self.inner.state();
            if state.shutdown_token.is_some() {
                return false;
            }
            let token = CancellationToken::new();
            state.shutdown_token = Some(token.clone());
            state.stats.is_running = true;
            token
        };

        let inner = Arc::clone(&self.inner);
        info!(
            task = inner.task.name(),
            interval_secs = inner.interval.as_secs(),
            "scheduler started"
        );
        tokio::spawn(async move {
            let mut ticker = interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let next = chrono::Duration::from_std(inner.interval)
                            .ok()
                            .and_then(|step| inner.clock.now().checked_add_signed(step));
                        inner.state().stats.next_run_time = next;
                        inner.launch();
                    }
                }
            }
            info!(task = inner.task.name(), "scheduler timer disarmed");
        });
        true
    }

    /// Disarm the timer. An in-flight run is left to finish. Returns false
    /// if the scheduler was not running.
    pub fn stop(&self) -> bool {
        let mut state = self.inner.state();
        let Some(token) = state.shutdown_token.take() else {
            return false;
        };
        token.cancel();
        state.stats.is_running = false;
        state.stats.next_run_time = None;
        info!(task = self.inner.task.name(), "scheduler stopped");
        true
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.inner.state().stats.clone();
        stats.in_flight = self.inner.in_flight.load(Ordering::Acquire);
        stats
    }

    /// Run once outside the timer, subject to the same overlap guard.
    pub fn trigger(&self) -> bool {
        self.inner.launch()
    }

    /// Stop and wait for any in-flight run to finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}
