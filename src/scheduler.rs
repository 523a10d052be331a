//! Periodic job runner.
//!
//! Interval jobs and daily UTC jobs, each independently cancellable through
//! a shared token. Each tick runs in its own spawned task so a panicking
//! job logs and restarts at the next tick instead of killing the loop. On
//! shutdown the scheduler cancels everything, waits up to 10 s, then aborts
//! what remains.

use chrono::{Datelike, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Scheduler {
    cancel: CancellationToken,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register an externally spawned long-lived task (a feed loop) for the
    /// shutdown drain.
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.handles.lock().push((name, handle));
    }

    /// Run `job` every `period`. The first tick fires immediately.
    pub fn spawn_interval<F, Fut>(&self, name: &'static str, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(job = name, "Job cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        // One task per tick: a panic is contained and the
                        // job resumes at the next tick.
                        let tick = tokio::spawn(job());
                        if let Err(e) = tick.await {
                            tracing::error!(job = name, error = %e, "Job tick panicked");
                        }
                    }
                }
            }
        });
        self.track(name, handle);
    }

    /// Run `job` once a day at `hour:minute` UTC.
    pub fn spawn_daily<F, Fut>(&self, name: &'static str, hour: u32, minute: u32, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                let wait = duration_until_utc(hour, minute);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(job = name, "Daily job cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {
                        let tick = tokio::spawn(job());
                        if let Err(e) = tick.await {
                            tracing::error!(job = name, error = %e, "Daily job panicked");
                        }
                    }
                }
            }
        });
        self.track(name, handle);
    }

    /// Cancel all jobs, wait up to 10 s for them to drain, abort stragglers.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<(&'static str, JoinHandle<()>)> =
            self.handles.lock().drain(..).collect();

        let drain = async {
            for (name, handle) in handles {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        tracing::warn!(job = name, error = %e, "Job ended abnormally");
                    }
                }
            }
        };

        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!("Shutdown grace period expired, forcing exit");
        }
        tracing::info!("Scheduler stopped");
    }
}

/// Time until the next `hour:minute` UTC, rolling to tomorrow if already
/// past today.
fn duration_until_utc(hour: u32, minute: u32) -> Duration {
    let now = Utc::now();
    let today_target = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), hour, minute, 0)
        .single()
        .unwrap_or(now);
    let target = if today_target > now {
        today_target
    } else {
        today_target + ChronoDuration::days(1)
    };
    (target - now).to_std().unwrap_or(Duration::from_secs(60))
}
