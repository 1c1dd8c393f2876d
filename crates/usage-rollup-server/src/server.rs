use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use usage_rollup_common::security::generate_secret;
use usage_rollup_db::{Database, DatabaseConfig, UsageStore};

use crate::batch::BatchFailureIsolator;
use crate::config::ServerConfig;
use crate::http::{self, AppState};
use crate::identity::{HmacTokenVerifier, IdentityVerifier};
use crate::scheduler::WeeklyScheduler;
use crate::summary_writer::SummaryWriter;
use crate::triggers::TriggerLayer;

pub async fn initialize_database(config: &ServerConfig) -> Result<Database> {
    info!("Initializing database");

    let database = Database::new(DatabaseConfig::at(config.database.path.clone()))
        .await
        .context("Failed to connect to database")?;

    database.run_migrations().await.context("Failed to run migrations")?;

    let status = database.migration_status().await.context("Failed to read migration status")?;
    if status.pending_migrations > 0 {
        bail!("{} database migrations still pending after startup", status.pending_migrations);
    }

    info!("Database initialized successfully");
    Ok(database)
}

/// Wire the trigger layer and identity verifier over `store`.
pub fn build_state(config: &ServerConfig, store: Arc<dyn UsageStore>) -> Result<AppState> {
    let writer = SummaryWriter::new(Arc::clone(&store), config.batch.consistency);
    let batch = BatchFailureIsolator::new(Arc::clone(&store), writer.clone())
        .with_max_concurrency(config.batch.max_concurrency)
        .with_time_budget(config.batch.time_budget());

    let triggers =
        Arc::new(TriggerLayer::new(store, writer, batch, config.auth.admin_secret()));

    let signing_key = match config.auth.token_signing_key() {
        Some(key) => key,
        None => {
            warn!("No token signing key configured, using an ephemeral key for this process");
            generate_secret()
        }
    };
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(
        HmacTokenVerifier::new(&signing_key).context("Invalid token signing key")?,
    );

    Ok(AppState { triggers, verifier })
}

pub async fn run(config: ServerConfig) -> Result<()> {
    config.validate()?;

    let database = Arc::new(initialize_database(&config).await?);
    let state = build_state(&config, database.clone())?;

    let scheduler = if config.schedule.enabled {
        let scheduler =
            WeeklyScheduler::new(Arc::clone(&state.triggers), config.schedule.weekly_schedule()?);
        scheduler.start().await;
        Some(scheduler)
    } else {
        info!("Weekly schedule disabled, aggregation runs only on manual trigger");
        None
    };

    let listener = TcpListener::bind(&config.http.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.http.bind))?;
    info!("Listening on {}", config.http.bind);

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
        info!("Weekly scheduler stopped");
    }

    if let Ok(database) = Arc::try_unwrap(database) {
        database.close().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down gracefully...");
    }
}
