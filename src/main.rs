use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loyalty_ledger::accrual::AccrualClient;
use loyalty_ledger::adapters::{MemoryLedger, PostgresLedger};
use loyalty_ledger::cli::{self, Cli, Commands, DbCommands};
use loyalty_ledger::config::{Config, LogFormat};
use loyalty_ledger::ports::LedgerStore;
use loyalty_ledger::services::Reconciler;
use loyalty_ledger::{create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let mut config = Config::from_env()?;
    args.apply_overrides(&mut config);

    init_tracing(config.log_format);

    match args.command {
        None => serve(config, false).await,
        Some(Commands::Serve { in_memory }) => serve(config, in_memory).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Config) => cli::handle_config_validate(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config, in_memory: bool) -> anyhow::Result<()> {
    config.validate()?;

    let store: Arc<dyn LedgerStore> = if in_memory {
        tracing::warn!("Using in-memory ledger, data is lost on exit");
        Arc::new(MemoryLedger::new())
    } else {
        let uri = config
            .database_uri
            .as_deref()
            .context("DATABASE_URI is required unless --in-memory is set")?;
        let pool = db::create_pool(uri).await?;
        db::run_migrations(&pool).await?;
        Arc::new(PostgresLedger::new(pool))
    };

    let accrual_client = AccrualClient::new(config.accrual_client_config())?;
    tracing::info!(
        "Accrual client initialized with URL: {}",
        config.accrual_system_address
    );

    let shutdown = CancellationToken::new();
    let reconciler = Reconciler::new(
        Arc::clone(&store),
        Arc::new(accrual_client),
        config.scheduler_config(),
    )
    .spawn(shutdown.clone());

    let addr = tokio::net::lookup_host(config.bind_address())
        .await?
        .next()
        .with_context(|| format!("cannot resolve RUN_ADDRESS {}", config.run_address))?;
    tracing::info!("listening on {}", addr);

    let app = create_app(AppState::new(store));
    let server_shutdown = shutdown.clone();
    let server = axum::Server::try_bind(&addr)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        signal_shutdown.cancel();
    });

    let served = server.await;
    shutdown.cancel();

    if let Err(e) = reconciler.await {
        tracing::error!("Accrual reconciler task failed: {}", e);
    }

    served?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
