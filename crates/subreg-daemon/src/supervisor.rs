//! Supervisor: acquires the process lock, starts the Registrar Worker and
//! the Intake RPC, and waits for a shutdown signal before stopping both.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::Method;
use subreg_committer::{BatchCommitter, DefaultZonefileBuilder};
use subreg_config::RegistrarConfig;
use subreg_db::QueueStore;
use subreg_lock::SubdomainLock;
use subreg_naming::HttpNamingApi;
use tokio::sync::watch;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use crate::{routes, state::AppState, worker};

/// Acquire the singleton lock for `parent_domain` and run the Registrar
/// Worker and Intake RPC until `shutdown` resolves.
///
/// Returns immediately (without starting anything) if the lock is already
/// held by another process.
pub async fn run(
    config: RegistrarConfig,
    parent_domain: String,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    // Clear a stale lockfile (one not carrying this process's own pid) before
    // racing the hardlink; acquire() has no staleness notion of its own and
    // would otherwise fail forever against a leftover file from a dead process.
    let _ = SubdomainLock::is_valid(&config.lockfile);

    let lock = match SubdomainLock::acquire(&config.lockfile) {
        Ok(lock) => lock,
        Err(e) => {
            anyhow::bail!("could not acquire registrar lock at {}: {e}", config.lockfile);
        }
    };
    info!(lockfile = %lock.path().display(), domain = %parent_domain, "registrar lock acquired");

    let store = QueueStore::open(&config.subdomain_registrar_db_path)
        .await
        .context("failed to open queue store")?;
    store.ensure_domain(&parent_domain).await.context("failed to provision domain table")?;

    let naming = Arc::new(
        HttpNamingApi::new(subreg_naming::NamingApiConfig {
            base_url: config.core_api_endpoint.clone(),
            bearer_token: config.core_api_authentication.clone(),
            timeout: Duration::from_secs(10),
        })
        .context("failed to construct naming API client")?,
    );

    let builder = Arc::new(DefaultZonefileBuilder::new(naming.clone()));
    let committer = Arc::new(BatchCommitter::new(
        parent_domain.clone(),
        store.clone(),
        naming.clone(),
        builder,
        config.tx_limit,
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let worker_handle = worker::spawn_worker(committer, Duration::from_secs(config.tx_frequency), stop_rx);

    let app_state = Arc::new(AppState::new(parent_domain, store, naming));
    let app = routes::build_router(app_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer());

    let addr: SocketAddr = format!("{}:{}", config.api_bind_address, config.api_bind_port)
        .parse()
        .context("invalid api_bind_address/api_bind_port")?;
    info!("intake RPC listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind intake RPC")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("intake RPC server crashed")?;

    let _ = stop_tx.send(true);
    let _ = worker_handle.await;
    info!("supervisor shutdown complete");

    Ok(())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
