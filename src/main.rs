use secrecy::ExposeSecret;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jti_registry::api::middleware::state::AppState;
use jti_registry::config::Config;
use jti_registry::db;
use jti_registry::jobs::purge_expired::start_purge_scheduler;
use jti_registry::registry::{PgRevocationStore, RevocationRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jti_registry=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting token revocation service...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        fallback_policy = %config.fallback_policy,
        "Configuration loaded successfully"
    );

    // Create database pool
    let pool = db::create_pool(config.database_url.expose_secret()).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Build the registry (warms its cache from the store)
    let store = Arc::new(PgRevocationStore::new(pool));
    let registry = Arc::new(RevocationRegistry::new(store.clone(), config.registry()).await);
    registry.start_cleanup_worker();

    let mut purge_scheduler = start_purge_scheduler(store, &config.purge_schedule).await?;

    // Build application state
    let state = AppState {
        registry: registry.clone(),
        admin_api_key: config.admin_api_key.clone(),
    };

    let app = jti_registry::api::app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.stop_cleanup_worker().await;
    if let Err(e) = purge_scheduler.shutdown().await {
        tracing::warn!(error = %e, "Failed to stop purge scheduler");
    }

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
