//! Registrar Worker: the background loop that periodically drains and
//! commits a parent domain's queue.

use std::sync::Arc;
use std::time::Duration;

use subreg_committer::BatchCommitter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Spawn the worker loop. Ticks every `tx_frequency`, but checks `stop_rx`
/// once per second so shutdown is responsive regardless of the configured
/// frequency.
pub fn spawn_worker(
    committer: Arc<BatchCommitter>,
    tx_frequency: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Submit once up front, then every tx_frequency thereafter, matching
        // the upstream loop's "submit, then sleep" order rather than
        // "sleep, then submit".
        run_tick(&committer).await;

        let mut elapsed = Duration::ZERO;
        loop {
            if *stop_rx.borrow() {
                info!("registrar worker stopping");
                return;
            }

            if elapsed >= tx_frequency {
                elapsed = Duration::ZERO;
                run_tick(&committer).await;
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    elapsed += Duration::from_secs(1);
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        info!("registrar worker stopping");
                        return;
                    }
                }
            }
        }
    })
}

async fn run_tick(committer: &BatchCommitter) {
    match committer.submit_once().await {
        Ok(summary) if summary.committed > 0 => {
            info!(committed = summary.committed, txid = ?summary.txid, "tick committed batch");
        }
        Ok(summary) => {
            if let Some(err) = summary.error {
                error!(error = %err, "tick completed with an upstream error");
            }
        }
        Err(e) => {
            error!(error = %e, "tick failed with a storage error; rows remain pending");
        }
    }
}
