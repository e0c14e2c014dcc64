pub mod api_types;
pub mod routes;
pub mod state;
pub mod supervisor;
pub mod worker;

/// Install the two-sink tracing subscriber (stdout + the configured log
/// file) used by both the daemon binary and the CLI.
///
/// Returns the `tracing-appender` guard; it must be kept alive for the
/// lifetime of the process or the non-blocking file writer stops flushing.
pub fn init_logging(logfile: &str) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    use std::path::Path;
    use tracing_subscriber::prelude::*;

    let log_path = Path::new(logfile);
    let dir = log_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = log_path.file_name().ok_or_else(|| anyhow::anyhow!("logfile has no file name: {logfile}"))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    // try_init rather than init: a global subscriber can only be installed
    // once per process, and tests that exercise multiple code paths sharing
    // this binary (or re-run init_logging across #[tokio::test] cases) must
    // not panic on the second call.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(true))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_safe_to_call_more_than_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrar.log");
        let path_str = path.to_str().unwrap();
        let _g1 = init_logging(path_str).unwrap();
        let _g2 = init_logging(path_str).unwrap();
        assert!(path.exists());
    }
}
