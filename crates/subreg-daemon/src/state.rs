//! Shared runtime state for the intake RPC's handlers.

use std::sync::Arc;

use subreg_db::QueueStore;
use subreg_naming::ExistenceOracle;

/// Static build metadata surfaced by `GET /health`.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "subreg-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub parent_domain: String,
    pub store: QueueStore,
    pub oracle: Arc<dyn ExistenceOracle>,
    pub max_request_body_bytes: usize,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(parent_domain: impl Into<String>, store: QueueStore, oracle: Arc<dyn ExistenceOracle>) -> Self {
        Self {
            parent_domain: parent_domain.into(),
            store,
            oracle,
            max_request_body_bytes: subreg_schemas::MAX_REQUEST_BODY_BYTES,
            build: BuildInfo::default(),
        }
    }
}
