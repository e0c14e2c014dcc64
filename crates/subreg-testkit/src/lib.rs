//! Deterministic fakes shared by scenario tests across the workspace.
//!
//! Mirrors the rest of this stack's injected-collaborator + fake-for-tests
//! pattern: production code depends on a trait, and tests substitute a
//! hand-written, fully deterministic implementation instead of mocking.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use subreg_db::QueueStore;
use subreg_naming::{ExistenceOracle, NamingApiClient, NamingApiResponse};

/// An existence oracle backed by a fixed, caller-supplied set of names that
/// already "exist" on-chain.
pub struct FakeExistenceOracle {
    known: Mutex<Vec<(String, String)>>,
}

impl FakeExistenceOracle {
    pub fn new() -> Self {
        Self {
            known: Mutex::new(Vec::new()),
        }
    }

    pub fn with_existing(names: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            known: Mutex::new(names.into_iter().collect()),
        }
    }

    pub fn mark_existing(&self, parent_domain: &str, subdomain_name: &str) {
        self.known
            .lock()
            .unwrap()
            .push((parent_domain.to_string(), subdomain_name.to_string()));
    }
}

impl Default for FakeExistenceOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExistenceOracle for FakeExistenceOracle {
    async fn exists(&self, parent_domain: &str, subdomain_name: &str) -> bool {
        self.known
            .lock()
            .unwrap()
            .iter()
            .any(|(d, n)| d == parent_domain && n == subdomain_name)
    }
}

/// A naming API client that plays back a scripted sequence of responses, one
/// per call, in order. Panics if called more times than scripted — tests
/// should script exactly as many responses as ticks they drive.
pub struct ScriptedNamingApi {
    responses: Mutex<Vec<NamingApiResponse>>,
}

impl ScriptedNamingApi {
    pub fn new(responses: Vec<NamingApiResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    pub fn accepting(txid: &str) -> Self {
        Self::new(vec![NamingApiResponse {
            accepted: true,
            status: 202,
            txid: Some(txid.to_string()),
            error: None,
        }])
    }
}

#[async_trait]
impl NamingApiClient for ScriptedNamingApi {
    async fn submit_zonefile(&self, _parent_domain: &str, _zonefile_text: &str) -> NamingApiResponse {
        let mut responses = self.responses.lock().unwrap();
        assert!(!responses.is_empty(), "ScriptedNamingApi ran out of scripted responses");
        responses.remove(0)
    }
}

/// Open a [`QueueStore`] backed by a fresh temp directory that lives as long
/// as the returned guard. Keep the guard alive for the duration of the test.
pub struct TempQueueStore {
    pub store: QueueStore,
    _dir: tempfile::TempDir,
}

impl TempQueueStore {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path: &Path = dir.path();
        let store = QueueStore::open(path.join("queue.sqlite"))
            .await
            .expect("open queue store");
        Self { store, _dir: dir }
    }
}
