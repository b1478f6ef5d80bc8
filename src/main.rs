use crate::config::Config;
use crate::db::{MemoryTallyStore, PgTallyStore, TallyStore};
use crate::startup::AppState;
use crate::ws::SubscriptionSettings;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[macro_use]
extern crate tracing;

mod config;
mod cors;
mod db;
mod error;
mod polls;
mod startup;
mod ws;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn TallyStore> = match &config.database_url {
        Some(database_url) => {
            let pool = db::init_db(database_url, config.db_max_connections).await?;
            let seeded = db::seed_options(&pool, &config.seed_options).await?;
            if seeded > 0 {
                info!("seeded {} poll options", seeded);
            }
            info!("{}", db::get_pool_stats(&pool));
            Arc::new(PgTallyStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, tallies are kept in memory");
            Arc::new(MemoryTallyStore::seeded(&config.seed_options))
        }
    };

    let app_state = AppState::new(
        store,
        &config.question,
        SubscriptionSettings {
            send_timeout: config.ws_send_timeout,
            ping_interval: config.ws_ping_interval,
        },
    );
    app_state.spawn_health_check(Duration::from_secs(60));

    let app = startup::router(app_state);

    info!("listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
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
                error!("failed to listen for SIGTERM: {}", e);
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

    info!("shutdown signal received");
}
