use clap::Parser;
use pix_saga_core::cli::{self, Cli, Commands, DbCommands};
use pix_saga_core::config::{Config, LogFormat};
use pix_saga_core::startup;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Setup logging
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => startup::serve(config).await,
        Commands::Reconcile { job } => cli::handle_reconcile(&config, job).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config { check } => cli::handle_config_validate(&config, check).await,
        Commands::Chargeback { code } => {
            let translator = startup::translator(&config)?;
            cli::handle_chargeback(&code, translator.as_ref());
            Ok(())
        }
    }
}
