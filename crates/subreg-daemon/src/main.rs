//! subreg-daemon entry point.
//!
//! Thin by design: parses the parent domain and config paths off argv, loads
//! configuration, installs logging, and hands off to `supervisor::run`.
//! Prefer `subreg-cli service start` for interactive use; this binary is the
//! direct, script-friendly entry point.

use anyhow::{bail, Context};
use subreg_config::load_registrar_config;
use subreg_daemon::{init_logging, supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    let mut args = std::env::args().skip(1);
    let Some(parent_domain) = args.next() else {
        bail!("usage: subreg-daemon <parent-domain> <config.yaml> [more-config.yaml ...]");
    };
    let config_paths: Vec<String> = args.collect();
    if config_paths.is_empty() {
        bail!("usage: subreg-daemon <parent-domain> <config.yaml> [more-config.yaml ...]");
    }
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();

    let config = load_registrar_config(&path_refs).context("failed to load configuration")?;
    let _log_guard = init_logging(&config.logfile).context("failed to initialize logging")?;

    tracing::info!(domain = %parent_domain, config_hash = %config.config_hash, "starting subreg-daemon");

    supervisor::run(config, parent_domain, shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
