use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::{Semaphore, watch};

/// Longest single sleep; the monotonic clock stops during host suspend, so
/// the wall clock is re-read at least this often.
const MAX_SLEEP: std::time::Duration = std::time::Duration::from_secs(60);

/// The single daily trigger. Immutable once the scheduler is built.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub id: String,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
}

impl JobConfig {
    /// Six-field cron rule (seconds first) firing once a day.
    pub fn cron_expression(&self) -> String {
        format!("0 {} {} * * *", self.minute, self.hour)
    }
}

#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Runs one firing to completion. Must not panic or return errors;
    /// failures are the job's own business.
    async fn run(&self);
}

/// Wall-clock source, so tests can drive the scheduler through simulated days.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct Scheduler<C = SystemClock> {
    job: JobConfig,
    schedule: Schedule,
    clock: C,
}

impl Scheduler<SystemClock> {
    pub fn new(job: JobConfig) -> Result<Self> {
        Self::with_clock(job, SystemClock)
    }
}

impl<C: Clock> Scheduler<C> {
    pub fn with_clock(job: JobConfig, clock: C) -> Result<Self> {
        let expr = job.cron_expression();
        let schedule = Schedule::from_str(&expr)
            .with_context(|| format!("Invalid cron expression '{expr}' for job {}", job.id))?;
        Ok(Self {
            job,
            schedule,
            clock,
        })
    }

    pub fn job(&self) -> &JobConfig {
        &self.job
    }

    /// First firing instant at or after `from`.
    pub fn next_fire(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = (from - Duration::seconds(1)).with_timezone(&self.job.timezone);
        self.schedule
            .after(&start)
            .map(|t| t.with_timezone(&Utc))
            .find(|t| *t >= from)
    }

    /// The next `count` firings from now, in the job's timezone.
    pub fn upcoming(&self, count: usize) -> Vec<DateTime<Tz>> {
        std::iter::successors(self.next_fire(self.clock.now()), |prev| {
            self.next_fire(*prev + Duration::seconds(1))
        })
        .take(count)
        .map(|t| t.with_timezone(&self.job.timezone))
        .collect()
    }

    /// Drive `job` until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Firings never overlap: one that comes due while the previous run still
    /// holds the permit is skipped. Missed firings are not caught up.
    pub async fn run(self, job: Arc<dyn Job>, mut shutdown: watch::Receiver<bool>) {
        let permit = Arc::new(Semaphore::new(1));
        let mut from = self.clock.now();

        tracing::info!(
            job = %self.job.id,
            cron = %self.job.cron_expression(),
            timezone = %self.job.timezone,
            "Scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let Some(next) = self.next_fire(from) else {
                tracing::warn!(job = %self.job.id, "Cron rule has no future firings");
                break;
            };
            tracing::info!(
                job = %self.job.id,
                "Next firing at {}",
                next.with_timezone(&self.job.timezone)
            );

            if !self.wait_until(next, &mut shutdown).await {
                break;
            }

            match permit.clone().try_acquire_owned() {
                Ok(held) => {
                    tracing::info!(job = %self.job.id, "Firing");
                    let job = job.clone();
                    tokio::spawn(async move {
                        job.run().await;
                        drop(held);
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        job = %self.job.id,
                        "Previous firing still running, skipping this one"
                    );
                }
            }

            from = self.clock.now().max(next + Duration::seconds(1));
        }

        tracing::info!(job = %self.job.id, "Scheduler stopped");
    }

    /// Sleep until the wall clock reaches `at`. Returns `false` on shutdown.
    async fn wait_until(&self, at: DateTime<Utc>, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            let now = self.clock.now();
            if now >= at {
                return true;
            }
            // Re-check the wall clock after every wake-up so we never fire early.
            let remaining = (at - now).to_std().unwrap_or_default().min(MAX_SLEEP);
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
            if *shutdown.borrow() {
                return false;
            }
        }
    }
}
