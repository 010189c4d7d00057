//! Engine binary for Citadel.
//!
//! This is the main entry point that wires together the claim store, the
//! in-memory index, the access controller, and the host bridge. It loads
//! configuration, warms the index from the store, starts the background
//! workers, and serves the bridge until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `citadel-config.yaml` (or `CITADEL_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and run migrations
//! 4. Start the audit writer
//! 5. Build the access controller and claim service, warm the index
//! 6. Start the decay sweeper
//! 7. Serve the host bridge
//! 8. Wait for `Ctrl-C`, then drain and shut down

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use citadel_access::{
    AccessController, AccessPolicy, AuditSink, GroupRegistry, InMemoryGroupRegistry,
};
use citadel_api::{AppState, ServerConfig, spawn_server};
use citadel_core::config::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use citadel_core::{
    AuditWriterConfig, CitadelConfig, ClaimService, EventGateway, spawn_audit_writer,
    spawn_decay_sweeper,
};
use citadel_db::{ClaimStore, MemoryClaimStore, PgClaimStore, PostgresPool};
use citadel_index::SharedClaimIndex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// How long shutdown waits for the audit writer to flush.
const AUDIT_FLUSH_GRACE: std::time::Duration = std::time::Duration::from_secs(10);

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config(&config_path(|key| std::env::var(key).ok()))?;

    // 2. Initialize structured logging.
    let level = config.logging.level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(true)
        .init();

    info!(
        max_radius = config.claims.max_radius,
        decay_duration_secs = config.claims.decay_duration_secs,
        default_policy = ?config.claims.default_policy,
        reinforcement_types = config.reinforcement_types.len(),
        decision_timeout_ms = config.gateway.decision_timeout_ms,
        "citadel-engine starting"
    );

    run(config).await?;
    Ok(())
}

#[allow(clippy::too_many_lines)]
async fn run(config: CitadelConfig) -> Result<(), EngineError> {
    // 3. Connect to the store.
    let (store, pool): (Arc<dyn ClaimStore>, Option<PostgresPool>) =
        if config.infrastructure.postgres_url.is_empty() {
            tracing::warn!("No postgres_url configured, claims will not survive a restart");
            (Arc::new(MemoryClaimStore::new()), None)
        } else {
            let pool = PostgresPool::connect(&config.infrastructure.postgres()).await?;
            pool.run_migrations().await?;
            info!("PostgreSQL connected and migrated");
            (Arc::new(PgClaimStore::new(pool.pool().clone())), Some(pool))
        };

    // 4. Start the audit writer.
    let (audit_sink, audit_writer) = if config.audit.enabled {
        let (sink, rx) = AuditSink::channel(config.audit.channel_capacity);
        let writer = spawn_audit_writer(
            rx,
            Arc::clone(&store),
            AuditWriterConfig {
                batch_size: config.audit.batch_size,
                flush_interval: config.audit.flush_interval(),
                retry: config.persistence.retry_policy(),
            },
        );
        info!(
            capacity = config.audit.channel_capacity,
            batch_size = config.audit.batch_size,
            "Audit writer started"
        );
        (Some(sink), Some(writer))
    } else {
        info!("Audit trail disabled");
        (None, None)
    };

    // 5. Build the access controller and claim service.
    //    The group mirror fails closed until the host completes its first sync.
    let registry = Arc::new(InMemoryGroupRegistry::unsynced());
    let index = SharedClaimIndex::default();
    let mut access = AccessController::new(
        index.clone(),
        Arc::clone(&registry) as Arc<dyn GroupRegistry>,
        AccessPolicy {
            default_policy: config.claims.default_policy,
            audit_unclaimed: config.audit.include_unclaimed,
        },
    );
    if let Some(sink) = audit_sink {
        access = access.with_audit(sink);
    }
    let service = Arc::new(ClaimService::new(
        index,
        Arc::clone(&store),
        access,
        &config,
    ));
    let warmed = service.warm().await?;
    info!(claims = warmed, "Claim index ready");

    let gateway = Arc::new(EventGateway::new(
        Arc::clone(&service),
        config.gateway.clone(),
        Handle::current(),
    ));

    // 6. Start the decay sweeper.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = if config.claims.decay_duration().is_some() {
        Some(spawn_decay_sweeper(
            Arc::clone(&service),
            config.decay.sweep_interval(),
            shutdown_rx.clone(),
        ))
    } else {
        info!("Claim decay disabled");
        None
    };

    // 7. Serve the host bridge.
    let server_config = ServerConfig {
        host: config.infrastructure.http_host.clone(),
        port: config.infrastructure.http_port,
    };
    let app_state = Arc::new(AppState::new(
        Arc::clone(&service),
        Arc::clone(&gateway),
        Arc::clone(&registry),
    ));
    let server = spawn_server(&server_config, app_state, shutdown_rx).await?;
    info!(
        port = server_config.port,
        "Host bridge started, waiting for group sync"
    );

    // 8. Wait for Ctrl-C, then shut down.
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| EngineError::Signal {
            message: format!("{e}"),
        })?;
    info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    let mut tasks = vec![server];
    tasks.extend(sweeper);
    for result in futures::future::join_all(tasks).await {
        if let Err(e) = result {
            tracing::warn!(error = %e, "Task ended abnormally during shutdown");
        }
    }

    let drained = gateway.drain_background().await;
    info!(drained, "Pending break damage applied");

    // The writer stops once every audit sender is gone.
    drop(gateway);
    drop(service);
    if let Some(writer) = audit_writer {
        match tokio::time::timeout(AUDIT_FLUSH_GRACE, writer).await {
            Ok(Ok(written)) => info!(written, "Audit trail flushed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Audit writer failed"),
            Err(_elapsed) => tracing::warn!("Audit writer did not finish in time"),
        }
    }

    if let Some(pool) = pool {
        pool.close().await;
    }

    info!("citadel-engine shutdown complete");
    Ok(())
}

/// Resolve the config file path from `CITADEL_CONFIG`, falling back to
/// `citadel-config.yaml` in the working directory.
fn config_path(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup(CONFIG_PATH_ENV)
        .filter(|p| !p.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the configuration, using defaults when the file does not exist.
fn load_config(path: &std::path::Path) -> Result<CitadelConfig, EngineError> {
    if path.exists() {
        return Ok(CitadelConfig::from_file(path)?);
    }
    let mut config = CitadelConfig::default();
    config
        .infrastructure
        .apply_env_overrides_from(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
