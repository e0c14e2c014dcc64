use anyhow::Result;
use clap::{Parser, Subcommand};
use subreg_config::load_registrar_config;
use subreg_daemon::{init_logging, supervisor};

#[derive(Parser)]
#[command(name = "subreg")]
#[command(about = "Subdomain registrar batching service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Registrar process lifecycle
    Service {
        #[command(subcommand)]
        cmd: ServiceCmd,
    },

    /// Compute the layered config hash and print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ServiceCmd {
    /// Acquire the lock and run the worker + intake RPC until interrupted
    Start {
        /// Parent domain this registrar instance serves
        domain: String,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Stop a running registrar.
    ///
    /// Unimplemented upstream and left as a no-op here: shut the process
    /// down with SIGINT/SIGTERM instead.
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Service { cmd } => match cmd {
            ServiceCmd::Start { domain, config_paths } => {
                let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
                let config = load_registrar_config(&path_refs)?;
                let _log_guard = init_logging(&config.logfile)?;

                tracing::info!(domain = %domain, config_hash = %config.config_hash, "starting registrar service");
                supervisor::run(config, domain, shutdown_signal()).await?;
            }
            ServiceCmd::Stop => {
                println!("lol. whatever.");
            }
        },

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = subreg_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
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
