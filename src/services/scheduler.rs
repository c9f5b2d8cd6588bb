//! Cron-driven background jobs guarded by a distributed lock, so that only
//! one instance of the service runs a given job per tick.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::CacheError;
use crate::ports::CacheStore;

const LOCK_KEY_PREFIX: &str = "cron:lock:";

/// Result of a locked run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome<T> {
    Executed(T),
    /// Another holder had the lock; the body did not run.
    Skipped,
}

/// Named mutual-exclusion lock backed by the cache store. The holder's TTL is
/// refreshed while the body runs and the key is released afterwards, also when
/// the run is cancelled or the body panics.
#[derive(Clone)]
pub struct CronLock {
    cache: Arc<dyn CacheStore>,
}

impl CronLock {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    pub fn key(name: &str) -> String {
        format!("{}{}", LOCK_KEY_PREFIX, name)
    }

    pub async fn run<F, Fut, T>(
        &self,
        name: &str,
        timeout: Duration,
        refresh_interval: Duration,
        job: F,
    ) -> Result<LockOutcome<T>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let key = Self::key(name);
        let owner = Uuid::new_v4().to_string();
        if !self.cache.set_if_absent(&key, &owner, timeout).await? {
            debug!(job = name, "lock held elsewhere, skipping tick");
            return Ok(LockOutcome::Skipped);
        }

        let refresher = self.spawn_refresher(key.clone(), owner.clone(), timeout, refresh_interval);
        let guard = HeldLock {
            cache: Arc::clone(&self.cache),
            key,
            owner,
            refresher,
            released: false,
        };
        let output = job().await;
        guard.release(name).await;
        Ok(LockOutcome::Executed(output))
    }

    fn spawn_refresher(
        &self,
        key: String,
        owner: String,
        timeout: Duration,
        refresh_interval: Duration,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            interval.tick().await; // first tick is immediate
            loop {
                interval.tick().await;
                match cache.refresh_if_owner(&key, &owner, timeout).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(key = %key, "lost lock ownership, stopping refresh");
                        break;
                    }
                    Err(e) => warn!(key = %key, error = %e, "failed to refresh lock"),
                }
            }
        })
    }
}

/// Ownership of an acquired lock. Dropping it without `release` (the run was
/// cancelled or the body panicked) stops the refresher and deletes the key
/// from a detached task.
struct HeldLock {
    cache: Arc<dyn CacheStore>,
    key: String,
    owner: String,
    refresher: JoinHandle<()>,
    released: bool,
}

impl HeldLock {
    async fn release(mut self, name: &str) {
        self.refresher.abort();
        self.released = true;
        match self.cache.delete_if_owner(&self.key, &self.owner).await {
            Ok(true) => {}
            Ok(false) => warn!(job = name, "lock expired before the job finished"),
            Err(e) => warn!(job = name, error = %e, "failed to release lock"),
        }
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        self.refresher.abort();
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "no runtime to release abandoned lock, leaving it to expire");
            return;
        };
        let cache = Arc::clone(&self.cache);
        let key = std::mem::take(&mut self.key);
        let owner = std::mem::take(&mut self.owner);
        runtime.spawn(async move {
            match cache.delete_if_owner(&key, &owner).await {
                Ok(_) => debug!(key = %key, "released abandoned lock"),
                Err(e) => warn!(key = %key, error = %e, "failed to release abandoned lock"),
            }
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Completed { processed: usize },
    Skipped,
    Failed(String),
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> anyhow::Result<usize>;
}

/// A job plus the cron expression that drives it.
#[derive(Clone)]
pub struct ScheduledJob {
    pub job: Arc<dyn Job>,
    pub schedule: Schedule,
}

impl ScheduledJob {
    pub fn new(job: Arc<dyn Job>, expression: &str) -> anyhow::Result<Self> {
        let schedule = Schedule::from_str(expression)
            .map_err(|e| anyhow::anyhow!("invalid cron expression '{}' for {}: {}", expression, job.name(), e))?;
        Ok(Self { job, schedule })
    }
}

pub struct JobScheduler {
    jobs: Vec<ScheduledJob>,
    lock: CronLock,
    lock_timeout: Duration,
    refresh_interval: Duration,
}

impl JobScheduler {
    pub fn new(lock: CronLock, lock_timeout: Duration, refresh_interval: Duration) -> Self {
        Self {
            jobs: Vec::new(),
            lock,
            lock_timeout,
            refresh_interval,
        }
    }

    pub fn add(mut self, job: ScheduledJob) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Runs one job immediately under its lock.
    pub async fn run_once(&self, job: &dyn Job) -> JobStatus {
        run_locked(&self.lock, job, self.lock_timeout, self.refresh_interval).await
    }

    /// Spawns one task per job; each stops when `shutdown` flips to true.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|scheduled| {
                let lock = self.lock.clone();
                let mut shutdown = shutdown.clone();
                let (timeout, refresh) = (self.lock_timeout, self.refresh_interval);
                tokio::spawn(async move {
                    info!(job = scheduled.job.name(), "scheduled job started");
                    loop {
                        let Some(next) = scheduled.schedule.upcoming(Utc).next() else {
                            warn!(job = scheduled.job.name(), "schedule has no upcoming run");
                            break;
                        };
                        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {}
                            _ = shutdown.changed() => break,
                        }
                        if *shutdown.borrow() {
                            break;
                        }
                        run_locked(&lock, scheduled.job.as_ref(), timeout, refresh).await;
                    }
                    info!(job = scheduled.job.name(), "scheduled job stopped");
                })
            })
            .collect()
    }
}

async fn run_locked(
    lock: &CronLock,
    job: &dyn Job,
    timeout: Duration,
    refresh_interval: Duration,
) -> JobStatus {
    let name = job.name().to_string();
    match lock.run(&name, timeout, refresh_interval, || job.run()).await {
        Ok(LockOutcome::Executed(Ok(processed))) => {
            info!(job = %name, processed, "job completed");
            JobStatus::Completed { processed }
        }
        Ok(LockOutcome::Executed(Err(e))) => {
            error!(job = %name, error = %e, "job failed");
            JobStatus::Failed(e.to_string())
        }
        Ok(LockOutcome::Skipped) => JobStatus::Skipped,
        Err(e) => {
            error!(job = %name, error = %e, "could not acquire job lock");
            JobStatus::Failed(e.to_string())
        }
    }
}
