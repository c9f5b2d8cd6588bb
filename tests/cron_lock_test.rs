use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use pix_saga_core::adapters::InMemoryCache;
use pix_saga_core::ports::CacheStore;
use pix_saga_core::services::scheduler::{CronLock, Job, JobScheduler, JobStatus, LockOutcome};

const TIMEOUT: Duration = Duration::from_millis(100);
const REFRESH: Duration = Duration::from_millis(30);

#[tokio::test]
async fn test_second_holder_skips_while_lock_is_held() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
    let first = CronLock::new(cache.clone());
    let second = CronLock::new(cache.clone());
    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let holder = tokio::spawn(async move {
        first
            .run("sync-pending-payments", TIMEOUT, REFRESH, || async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
                "done"
            })
            .await
    });

    started_rx.await.unwrap();
    let skipped = second
        .run("sync-pending-payments", TIMEOUT, REFRESH, || async { "never" })
        .await
        .unwrap();
    assert_eq!(skipped, LockOutcome::Skipped);

    release_tx.send(()).unwrap();
    assert_eq!(holder.await.unwrap().unwrap(), LockOutcome::Executed("done"));

    let after = second
        .run("sync-pending-payments", TIMEOUT, REFRESH, || async { "again" })
        .await
        .unwrap();
    assert_eq!(after, LockOutcome::Executed("again"));
}

#[tokio::test]
async fn test_locks_with_different_names_do_not_block_each_other() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
    let lock = CronLock::new(cache.clone());

    let outer = lock
        .run("sync-new-deposits", TIMEOUT, REFRESH, || {
            let lock = lock.clone();
            async move {
                lock.run("sync-notifications", TIMEOUT, REFRESH, || async { 1 })
                    .await
                    .unwrap()
            }
        })
        .await
        .unwrap();

    assert_eq!(outer, LockOutcome::Executed(LockOutcome::Executed(1)));
}

#[tokio::test(start_paused = true)]
async fn test_long_job_keeps_its_lock_alive() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
    let holder = CronLock::new(cache.clone());
    let contender = CronLock::new(cache.clone());

    let long_job = holder.run("sync-waiting-payments", TIMEOUT, REFRESH, || async {
        tokio::time::sleep(Duration::from_millis(300)).await;
    });
    let late_attempt = async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        contender
            .run("sync-waiting-payments", TIMEOUT, REFRESH, || async {})
            .await
    };

    let (held, late) = tokio::join!(long_job, late_attempt);

    assert_eq!(held.unwrap(), LockOutcome::Executed(()));
    assert_eq!(late.unwrap(), LockOutcome::Skipped);
    assert_eq!(
        cache.get(&CronLock::key("sync-waiting-payments")).await.unwrap(),
        None
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_releases_its_lock() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
    let lock = CronLock::new(cache.clone());

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        lock.run("sync-waiting-devolutions", TIMEOUT, REFRESH, std::future::pending::<()>),
    )
    .await;
    assert!(cancelled.is_err());

    // Well inside the TTL, so only an explicit release clears the key.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(
        cache.get(&CronLock::key("sync-waiting-devolutions")).await.unwrap(),
        None
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
        cache.get(&CronLock::key("sync-waiting-devolutions")).await.unwrap(),
        None
    );
    let next = lock
        .run("sync-waiting-devolutions", TIMEOUT, REFRESH, || async { "next tick" })
        .await
        .unwrap();
    assert_eq!(next, LockOutcome::Executed("next tick"));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_job_releases_its_lock() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
    let lock = CronLock::new(cache.clone());

    let crashed = tokio::spawn(async move {
        lock.run("sync-new-deposits", TIMEOUT, REFRESH, || async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            panic!("job crashed");
        })
        .await
    })
    .await;
    assert!(crashed.unwrap_err().is_panic());

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(cache.get(&CronLock::key("sync-new-deposits")).await.unwrap(), None);
}

struct CountingJob {
    runs: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl Job for CountingJob {
    fn name(&self) -> &str {
        "counting-job"
    }

    async fn run(&self) -> anyhow::Result<usize> {
        let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            anyhow::bail!("ledger unreachable");
        }
        Ok(runs)
    }
}

#[tokio::test]
async fn test_run_once_reports_job_status() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
    let scheduler = JobScheduler::new(CronLock::new(cache.clone()), TIMEOUT, REFRESH);
    let ok = CountingJob {
        runs: AtomicUsize::new(0),
        fail: false,
    };
    let failing = CountingJob {
        runs: AtomicUsize::new(0),
        fail: true,
    };

    assert_eq!(scheduler.run_once(&ok).await, JobStatus::Completed { processed: 1 });
    assert_eq!(scheduler.run_once(&ok).await, JobStatus::Completed { processed: 2 });
    assert_eq!(
        scheduler.run_once(&failing).await,
        JobStatus::Failed("ledger unreachable".to_string())
    );
}

#[tokio::test]
async fn test_run_once_skips_when_another_instance_holds_the_lock() {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
    cache
        .set_if_absent(&CronLock::key("counting-job"), "other-instance", TIMEOUT)
        .await
        .unwrap();
    let scheduler = JobScheduler::new(CronLock::new(cache.clone()), TIMEOUT, REFRESH);
    let job = CountingJob {
        runs: AtomicUsize::new(0),
        fail: false,
    };

    assert_eq!(scheduler.run_once(&job).await, JobStatus::Skipped);
    assert_eq!(job.runs.load(Ordering::SeqCst), 0);
}
