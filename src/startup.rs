//! Wires configuration into running adapters and starts the service.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::adapters::{
    CatalogTranslator, HttpComplianceGateway, HttpGatewayClient, HttpIssueTracker,
    HttpOperationService, HttpPixGateway, HttpSmsGateway, HttpSmtpGateway, HttpUserService,
    InProcessBus, PostgresEntityRepository, RedisCache, RetryPolicy,
};
use crate::config::Config;
use crate::dispatcher::SagaDispatcher;
use crate::ports::{SmsGateway, Translator};
use crate::saga::{Gateways, Repositories, SagaContext, SmsProviders};
use crate::services::{
    CronLock, JobScheduler, LockOutcome, ReconciliationJob, ReconciliationReport,
    ReconciliationTask, ScheduledJob,
};

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub redis: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  - {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "PASS" } else { "FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "OK" } else { "FAIL" }
}

/// Checks connectivity of the stateful dependencies.
pub async fn validate_environment(config: &Config) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: true,
        errors: Vec::new(),
    };

    if let Some(path) = &config.translations_path {
        if let Err(e) = CatalogTranslator::from_file(path) {
            report.environment = false;
            report.errors.push(format!("Environment: {:#}", e));
        }
    }

    match crate::db::create_pool(config).await {
        Ok(pool) => {
            if let Err(e) = validate_database(&pool).await {
                report.database = false;
                report.errors.push(format!("Database: {:#}", e));
            }
        }
        Err(e) => {
            report.database = false;
            report.errors.push(format!("Database: {}", e));
        }
    }

    if let Err(e) = validate_redis(&config.redis_url).await {
        report.redis = false;
        report.errors.push(format!("Redis: {:#}", e));
    }

    report
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}

pub fn postgres_repositories(pool: &PgPool) -> Repositories {
    Repositories {
        payments: Arc::new(PostgresEntityRepository::new(pool.clone())),
        deposits: Arc::new(PostgresEntityRepository::new(pool.clone())),
        devolutions: Arc::new(PostgresEntityRepository::new(pool.clone())),
        devolutions_received: Arc::new(PostgresEntityRepository::new(pool.clone())),
        refund_devolutions: Arc::new(PostgresEntityRepository::new(pool.clone())),
        warning_devolutions: Arc::new(PostgresEntityRepository::new(pool.clone())),
        warning_deposits: Arc::new(PostgresEntityRepository::new(pool.clone())),
        infractions: Arc::new(PostgresEntityRepository::new(pool.clone())),
        refunds: Arc::new(PostgresEntityRepository::new(pool.clone())),
        refund_operations: Arc::new(PostgresEntityRepository::new(pool.clone())),
        fraud_detections: Arc::new(PostgresEntityRepository::new(pool.clone())),
        sms: Arc::new(PostgresEntityRepository::new(pool.clone())),
        emails: Arc::new(PostgresEntityRepository::new(pool.clone())),
    }
}

pub fn http_gateways(config: &Config) -> Gateways {
    let gateways = &config.gateways;
    let client = |url: &str| {
        HttpGatewayClient::with_timeout(
            url.to_string(),
            gateways.timeout,
            gateways.circuit_breaker_threshold,
            gateways.circuit_breaker_reset_secs,
        )
    };

    let sms: SmsProviders = gateways
        .sms_providers
        .iter()
        .map(|provider| {
            let gateway: Arc<dyn SmsGateway> = Arc::new(HttpSmsGateway::new(client(&provider.url)));
            (provider.name.clone(), gateway)
        })
        .collect::<HashMap<_, _>>();

    Gateways {
        pix: Arc::new(HttpPixGateway::new(client(&gateways.psp_url))),
        operations: Arc::new(HttpOperationService::new(client(&gateways.operation_service_url))),
        issues: Arc::new(HttpIssueTracker::new(client(&gateways.issue_tracker_url))),
        compliance: Arc::new(HttpComplianceGateway::new(client(&gateways.compliance_service_url))),
        users: Arc::new(HttpUserService::new(client(&gateways.user_service_url))),
        sms,
        smtp: Arc::new(HttpSmtpGateway::new(client(&gateways.smtp_gateway_url))),
    }
}

pub fn translator(config: &Config) -> Result<Arc<dyn Translator>> {
    let translator = match &config.translations_path {
        Some(path) => CatalogTranslator::from_file(path)?,
        None => CatalogTranslator::empty(),
    };
    tracing::info!(messages = translator.len(), "Message catalogue loaded");
    Ok(Arc::new(translator))
}

/// Production wiring: Postgres, Redis and the HTTP gateways.
pub fn build_context(config: &Config, pool: &PgPool) -> Result<SagaContext> {
    let cache = RedisCache::new(&config.redis_url)?;
    Ok(SagaContext {
        repositories: postgres_repositories(pool),
        gateways: http_gateways(config),
        cache: Arc::new(cache),
        translator: translator(config)?,
        settings: Arc::new(config.saga.clone()),
    })
}

fn scheduler(config: &Config, ctx: &SagaContext, dispatcher: &Arc<SagaDispatcher>) -> Result<JobScheduler> {
    let lock = CronLock::new(ctx.cache.clone());
    let mut scheduler = JobScheduler::new(
        lock,
        config.scheduler.lock_timeout,
        config.scheduler.lock_refresh_interval,
    );
    for (job, expression) in &config.scheduler.schedules {
        let task = Arc::new(ReconciliationTask::new(*job, dispatcher.clone()));
        scheduler = scheduler.add(ScheduledJob::new(task, expression)?);
    }
    Ok(scheduler)
}

/// Runs the bus consumer and the cron scheduler until Ctrl+C.
pub async fn serve(config: Config) -> Result<()> {
    let pool = crate::db::create_pool(&config).await?;
    crate::db::run_migrations(&pool).await?;

    let ctx = build_context(&config, &pool)?;
    let bus = Arc::new(InProcessBus::new());
    let dispatcher = Arc::new(SagaDispatcher::new(ctx.clone(), bus.clone(), config.reconciliation));
    let scheduler = scheduler(&config, &ctx, &dispatcher)?;
    tracing::info!(jobs = scheduler.len(), "Scheduler configured");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = scheduler.start(shutdown_rx.clone());

    let retry = RetryPolicy {
        max_attempts: config.bus_max_attempts,
        backoff: config.bus_retry_backoff,
    };
    let consumer = {
        let bus = bus.clone();
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { bus.run(dispatcher, retry, shutdown_rx).await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    shutdown_tx.send(true)?;

    for handle in handles {
        let _ = handle.await;
    }
    consumer.await??;
    Ok(())
}

/// One-off run of a reconciliation job under its cron lock. Follow-up
/// events are delivered before returning.
pub async fn reconcile_once(config: &Config, job: ReconciliationJob) -> Result<Option<ReconciliationReport>> {
    let pool = crate::db::create_pool(config).await?;
    let ctx = build_context(config, &pool)?;
    let bus = Arc::new(InProcessBus::new());
    let dispatcher = Arc::new(SagaDispatcher::new(ctx.clone(), bus.clone(), config.reconciliation));
    let lock = CronLock::new(ctx.cache.clone());

    let outcome = lock
        .run(
            &job.name(),
            config.scheduler.lock_timeout,
            config.scheduler.lock_refresh_interval,
            || dispatcher.reconcile(job, Utc::now()),
        )
        .await?;

    let report = match outcome {
        LockOutcome::Executed(report) => report?,
        LockOutcome::Skipped => return Ok(None),
    };

    let retry = RetryPolicy {
        max_attempts: config.bus_max_attempts,
        backoff: config.bus_retry_backoff,
    };
    let delivered = bus.drain(&dispatcher, retry).await?;
    tracing::info!(job = %job.name(), delivered, "follow-up events delivered");
    Ok(Some(report))
}
