use clap::{Parser, Subcommand};

use crate::chargeback::resolve_chargeback;
use crate::config::Config;
use crate::ports::Translator;
use crate::services::ReconciliationJob;

#[derive(Parser)]
#[command(name = "pix-saga-core")]
#[command(about = "Pix Saga Core - Pix settlement transaction sagas", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bus consumer and the reconciliation scheduler (default)
    Serve,

    /// Run one reconciliation job now, under its cron lock
    Reconcile {
        #[arg(value_enum, value_name = "JOB")]
        job: ReconciliationJob,
    },

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config {
        /// Also check database and Redis connectivity
        #[arg(long)]
        check: bool,
    },

    /// Show the exception a scheme rejection code resolves to
    Chargeback {
        #[arg(value_name = "CODE")]
        code: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("Database migrations completed");
    Ok(())
}

pub async fn handle_reconcile(config: &Config, job: ReconciliationJob) -> anyhow::Result<()> {
    match crate::startup::reconcile_once(config, job).await? {
        Some(report) => {
            println!("Job {} finished:", job.name());
            println!("  Visited: {}", report.visited);
            println!("  Applied: {}", report.applied);
            println!("  Emitted: {}", report.emitted);
            println!("  Failed:  {}", report.failed);
            println!("  Ignored: {}", report.ignored);
            println!("  Errors:  {}", report.errors);
        }
        None => println!("Job {} is running elsewhere, skipped", job.name()),
    }
    Ok(())
}

pub async fn handle_config_validate(config: &Config, check: bool) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Redis URL: {}", mask_password(&config.redis_url));
    println!("  Pix ISPB: {}", config.saga.pix_ispb);
    println!("  PSP gateway: {}", config.gateways.psp_url);
    println!("  Operation service: {}", config.gateways.operation_service_url);
    println!("  SMS providers: {}", config.saga.sms.providers.join(", "));
    println!("  SMS international provider: {}", config.saga.sms.international_provider);
    println!(
        "  Refund devolution window: {} days",
        config.saga.refund_devolution_interval_days
    );
    println!("  Scheduled jobs: {}", config.scheduler.schedules.len());

    if check {
        let report = crate::startup::validate_environment(config).await;
        report.print();
        if !report.is_valid() {
            anyhow::bail!("Configuration check failed");
        }
    }

    tracing::info!("Configuration is valid");
    println!("Configuration is valid");
    Ok(())
}

pub fn handle_chargeback(code: &str, translator: &dyn Translator) {
    let exception = resolve_chargeback(code);
    let failed = exception.to_failed(translator);
    println!("Code:        {}", exception.code);
    println!("Exception:   {}", exception.name);
    println!("Description: {}", exception.description);
    println!("Message:     {}", failed.message);
    if exception.is_default() {
        println!("(unknown code, default exception)");
    }
}

pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
