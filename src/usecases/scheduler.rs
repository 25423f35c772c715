//! Daily job scheduler. One tokio task per job, each sleeping until its next trigger.
//!
//! Job state lives in memory only; a restart recomputes every next run from the clock.

use crate::domain::DomainError;
use crate::ports::{Clock, ScheduledJob};
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Fires once a day at `time` in the given fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    time: NaiveTime,
    offset: FixedOffset,
}

impl DailyTrigger {
    pub fn at_hour(hour: u32, offset: FixedOffset) -> Result<Self, DomainError> {
        let time = NaiveTime::from_hms_opt(hour, 0, 0)
            .ok_or_else(|| DomainError::Config(format!("invalid trigger hour {hour}")))?;
        Ok(Self { time, offset })
    }

    /// First trigger instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_date = now.with_timezone(&self.offset).date_naive();
        let shift = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        let today = Utc.from_utc_datetime(&(local_date.and_time(self.time) - shift));
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub name: String,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs: Vec<JobStatus>,
}

/// Shared, read-mostly view of the scheduler for the liveness endpoint.
#[derive(Debug, Clone, Default)]
pub struct SchedulerHandle {
    inner: Arc<RwLock<SchedulerStatus>>,
}

impl SchedulerHandle {
    pub fn status(&self) -> SchedulerStatus {
        self.inner.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn set_running(&self, running: bool) {
        if let Ok(mut s) = self.inner.write() {
            s.running = running;
        }
    }

    pub fn register_job(&self, id: &str, name: &str, next_run: Option<DateTime<Utc>>) {
        if let Ok(mut s) = self.inner.write() {
            s.jobs.retain(|j| j.id != id);
            s.jobs.push(JobStatus {
                id: id.to_string(),
                name: name.to_string(),
                next_run,
                last_run: None,
            });
        }
    }

    fn update_job(&self, id: &str, f: impl FnOnce(&mut JobStatus)) {
        if let Ok(mut s) = self.inner.write() {
            if let Some(job) = s.jobs.iter_mut().find(|j| j.id == id) {
                f(job);
            }
        }
    }
}

pub struct Scheduler {
    jobs: Vec<(Arc<dyn ScheduledJob>, DailyTrigger)>,
    clock: Arc<dyn Clock>,
    handle: SchedulerHandle,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Vec::new(),
            clock,
            handle: SchedulerHandle::default(),
        }
    }

    pub fn add_job(&mut self, job: Arc<dyn ScheduledJob>, trigger: DailyTrigger) {
        let next = trigger.next_after(self.clock.now());
        self.handle.register_job(job.id(), job.name(), Some(next));
        info!(job = job.id(), next_run = %next, "job scheduled");
        self.jobs.push((job, trigger));
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Run every job until `shutdown` flips. A job already running is allowed to finish.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        self.handle.set_running(true);
        info!(jobs = self.jobs.len(), "scheduler started");

        let mut tasks = JoinSet::new();
        for (job, trigger) in self.jobs {
            tasks.spawn(run_job(
                job,
                trigger,
                self.clock.clone(),
                self.handle.clone(),
                shutdown.clone(),
            ));
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "scheduled job task ended abnormally");
            }
        }

        self.handle.set_running(false);
        info!("scheduler stopped");
    }
}

async fn run_job(
    job: Arc<dyn ScheduledJob>,
    trigger: DailyTrigger,
    clock: Arc<dyn Clock>,
    handle: SchedulerHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        let now = clock.now();
        let next = trigger.next_after(now);
        handle.update_job(job.id(), |j| j.next_run = Some(next));
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        info!(job = job.id(), "running scheduled job");
        let runner = job.clone();
        if let Err(e) = tokio::spawn(async move { runner.run_once().await }).await {
            error!(job = job.id(), error = %e, "scheduled job panicked, keeping schedule");
        }
        let finished = clock.now();
        handle.update_job(job.id(), |j| j.last_run = Some(finished));
    }
}
