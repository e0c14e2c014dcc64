//! Batch Committer: drains a parent domain's queue head, builds a zone-file
//! update, submits it to the naming API, and durably records the outcome.
//!
//! The adaptive batch-size rule lives here: a "max length" rejection from
//! the naming API shrinks the working batch size by a factor of 0.8 (floored
//! at 1) for the *next* tick, mirroring the upstream registrar's behavior.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use subreg_db::QueueStore;
use subreg_naming::{ExistenceOracle, NamingApiClient};
use subreg_schemas::Subdomain;

/// Builds the zone-file text for a batch and flags entries the builder
/// already knows (independently of the naming API's response) to be
/// duplicates, by position within the input slice.
#[async_trait]
pub trait ZonefileBuilder: Send + Sync {
    async fn build(&self, parent_domain: &str, subdomains: &[Subdomain]) -> (String, Vec<usize>);
}

/// Default builder: concatenates each subdomain's own zone-file text,
/// skipping (and flagging as duplicate) any entry the injected
/// [`ExistenceOracle`] reports as already resolving on-chain.
pub struct DefaultZonefileBuilder {
    oracle: Arc<dyn ExistenceOracle>,
}

impl DefaultZonefileBuilder {
    pub fn new(oracle: Arc<dyn ExistenceOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl ZonefileBuilder for DefaultZonefileBuilder {
    async fn build(&self, parent_domain: &str, subdomains: &[Subdomain]) -> (String, Vec<usize>) {
        let mut text = String::new();
        let mut duplicates = Vec::new();

        for (i, sub) in subdomains.iter().enumerate() {
            if self.oracle.exists(parent_domain, &sub.name).await {
                duplicates.push(i);
                continue;
            }
            text.push_str(&format!(">>> {}\n", sub.name));
            text.push_str(&sub.zonefile_text);
            if !sub.zonefile_text.ends_with('\n') {
                text.push('\n');
            }
        }

        (text, duplicates)
    }
}

/// Fatal errors for a single tick. Unlike upstream-naming-API rejections
/// (which are recorded as `FAILED` rows and reported inside [`TickSummary`]),
/// these leave the affected rows `PENDING` for the next tick to retry.
#[derive(Debug)]
pub enum CommitError {
    Storage(String),
}

impl std::fmt::Display for CommitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitError::Storage(e) => write!(f, "queue storage error during commit: {e}"),
        }
    }
}

impl std::error::Error for CommitError {}

/// Outcome of one `submit_once` invocation.
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub committed: usize,
    pub txid: Option<String>,
    pub error: Option<String>,
}

/// Drains and commits one parent domain's queue on each `submit_once` call.
pub struct BatchCommitter {
    parent_domain: String,
    store: QueueStore,
    naming: Arc<dyn NamingApiClient>,
    builder: Arc<dyn ZonefileBuilder>,
    entries_per_tx: AtomicI64,
}

impl BatchCommitter {
    pub fn new(
        parent_domain: impl Into<String>,
        store: QueueStore,
        naming: Arc<dyn NamingApiClient>,
        builder: Arc<dyn ZonefileBuilder>,
        initial_entries_per_tx: i64,
    ) -> Self {
        Self {
            parent_domain: parent_domain.into(),
            store,
            naming,
            builder,
            entries_per_tx: AtomicI64::new(initial_entries_per_tx.max(1)),
        }
    }

    pub fn entries_per_tx(&self) -> i64 {
        self.entries_per_tx.load(Ordering::SeqCst)
    }

    fn shrink_entries_per_tx(&self) {
        let prev = self.entries_per_tx.load(Ordering::SeqCst);
        let next = ((prev as f64) * 0.8).floor() as i64;
        let next = next.max(1);
        self.entries_per_tx.store(next, Ordering::SeqCst);
        tracing::warn!(domain = %self.parent_domain, prev, next, "naming API reported max-length, shrinking batch size");
    }

    /// Attempt zero or one batch commit. See module docs for the full
    /// state-machine this implements.
    pub async fn submit_once(&self) -> Result<TickSummary, CommitError> {
        let limit = self.entries_per_tx();
        let head = self
            .store
            .head(&self.parent_domain, limit)
            .await
            .map_err(|e| CommitError::Storage(e.to_string()))?;

        if head.is_empty() {
            return Ok(TickSummary::default());
        }

        let received_ats: Vec<i64> = head.iter().map(|e| e.received_at).collect();
        let payloads: Vec<Subdomain> = head.iter().map(|e| e.payload.clone()).collect();

        let (zonefile_text, duplicate_indices) = self.builder.build(&self.parent_domain, &payloads).await;

        if !duplicate_indices.is_empty() {
            let duplicate_ids: Vec<i64> = duplicate_indices.iter().map(|&i| received_ats[i]).collect();
            self.store
                .mark_already_existed(&self.parent_domain, &duplicate_ids)
                .await
                .map_err(|e| CommitError::Storage(e.to_string()))?;
        }

        let remaining_ids: Vec<i64> = received_ats
            .iter()
            .enumerate()
            .filter(|(i, _)| !duplicate_indices.contains(i))
            .map(|(_, id)| *id)
            .collect();

        if remaining_ids.is_empty() {
            return Ok(TickSummary::default());
        }

        let response = self.naming.submit_zonefile(&self.parent_domain, &zonefile_text).await;

        if !response.accepted {
            let reason = response.error.clone().unwrap_or_else(|| "naming API rejected batch".to_string());
            if response.is_max_length_signal() {
                self.shrink_entries_per_tx();
            }
            self.store
                .mark_failed(&self.parent_domain, &remaining_ids, &reason)
                .await
                .map_err(|e| CommitError::Storage(e.to_string()))?;
            tracing::error!(domain = %self.parent_domain, error = %reason, "naming API rejected batch");
            return Ok(TickSummary {
                committed: 0,
                txid: None,
                error: Some(reason),
            });
        }

        // Accepted (202). A present `error` field on an otherwise-202 body is
        // terminal for the remaining rows; a missing txid with no error is
        // indeterminate and rows are left PENDING for the next tick.
        if let Some(err) = response.error {
            self.store
                .mark_failed(&self.parent_domain, &remaining_ids, &err)
                .await
                .map_err(|e| CommitError::Storage(e.to_string()))?;
            return Ok(TickSummary {
                committed: 0,
                txid: None,
                error: Some(err),
            });
        }

        let Some(txid) = response.txid else {
            tracing::warn!(domain = %self.parent_domain, "202 response had no transaction_hash; leaving rows pending for retry");
            return Ok(TickSummary {
                committed: 0,
                txid: None,
                error: Some("parse".to_string()),
            });
        };

        self.store
            .mark_committed(&self.parent_domain, &remaining_ids, &txid)
            .await
            .map_err(|e| CommitError::Storage(e.to_string()))?;

        tracing::info!(domain = %self.parent_domain, committed = remaining_ids.len(), txid = %txid, "batch committed");

        Ok(TickSummary {
            committed: remaining_ids.len(),
            txid: Some(txid),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use subreg_naming::NamingApiResponse;

    struct FakeOracle {
        known: Vec<String>,
    }

    #[async_trait]
    impl ExistenceOracle for FakeOracle {
        async fn exists(&self, _parent_domain: &str, subdomain_name: &str) -> bool {
            self.known.iter().any(|n| n == subdomain_name)
        }
    }

    struct ScriptedNamingApi {
        responses: Mutex<Vec<NamingApiResponse>>,
    }

    #[async_trait]
    impl NamingApiClient for ScriptedNamingApi {
        async fn submit_zonefile(&self, _parent_domain: &str, _zonefile_text: &str) -> NamingApiResponse {
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn subdomain(name: &str) -> Subdomain {
        Subdomain {
            name: name.to_string(),
            owner_pubkey: "pubkey:data:00".to_string(),
            sequence_number: 0,
            zonefile_text: "$origin x\n$ttl 3600\n".to_string(),
        }
    }

    async fn store() -> QueueStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite");
        let store = QueueStore::open(&path).await.unwrap();
        std::mem::forget(dir);
        store
    }

    #[tokio::test]
    async fn happy_path_commits_all_rows() {
        let store = store().await;
        store.enqueue("example.id", &subdomain("alice")).await.unwrap();
        store.enqueue("example.id", &subdomain("bob")).await.unwrap();

        let oracle = Arc::new(FakeOracle { known: vec![] });
        let builder = Arc::new(DefaultZonefileBuilder::new(oracle));
        let naming = Arc::new(ScriptedNamingApi {
            responses: Mutex::new(vec![NamingApiResponse {
                accepted: true,
                status: 202,
                txid: Some("TX1".to_string()),
                error: None,
            }]),
        });

        let committer = BatchCommitter::new("example.id", store.clone(), naming, builder, 100);
        let summary = committer.submit_once().await.unwrap();
        assert_eq!(summary.committed, 2);
        assert_eq!(summary.txid.as_deref(), Some("TX1"));
        assert!(store.head("example.id", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn builder_duplicates_are_marked_already_existed() {
        let store = store().await;
        store.enqueue("example.id", &subdomain("alice")).await.unwrap();
        store.enqueue("example.id", &subdomain("bob")).await.unwrap();

        let oracle = Arc::new(FakeOracle {
            known: vec!["bob".to_string()],
        });
        let builder = Arc::new(DefaultZonefileBuilder::new(oracle));
        let naming = Arc::new(ScriptedNamingApi {
            responses: Mutex::new(vec![NamingApiResponse {
                accepted: true,
                status: 202,
                txid: Some("TX2".to_string()),
                error: None,
            }]),
        });

        let committer = BatchCommitter::new("example.id", store.clone(), naming, builder, 100);
        let summary = committer.submit_once().await.unwrap();
        assert_eq!(summary.committed, 1);
        assert!(store.head("example.id", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn max_length_rejection_shrinks_batch_size() {
        let store = store().await;
        for i in 0..10 {
            store
                .enqueue("example.id", &subdomain(&format!("name{i:02}")))
                .await
                .unwrap();
        }

        let oracle = Arc::new(FakeOracle { known: vec![] });
        let builder = Arc::new(DefaultZonefileBuilder::new(oracle));
        let naming = Arc::new(ScriptedNamingApi {
            responses: Mutex::new(vec![NamingApiResponse {
                accepted: false,
                status: 400,
                txid: None,
                error: Some("zonefile maxLength exceeded".to_string()),
            }]),
        });

        let committer = BatchCommitter::new("example.id", store.clone(), naming, builder, 10);
        let summary = committer.submit_once().await.unwrap();
        assert_eq!(summary.committed, 0);
        assert!(summary.error.is_some());
        assert_eq!(committer.entries_per_tx(), 8);
    }

    #[tokio::test]
    async fn accepted_response_with_error_field_marks_failed_not_committed() {
        let store = store().await;
        store.enqueue("example.id", &subdomain("alice")).await.unwrap();

        let oracle = Arc::new(FakeOracle { known: vec![] });
        let builder = Arc::new(DefaultZonefileBuilder::new(oracle));
        let naming = Arc::new(ScriptedNamingApi {
            responses: Mutex::new(vec![NamingApiResponse {
                accepted: true,
                status: 202,
                txid: None,
                error: Some("malformed zonefile".to_string()),
            }]),
        });

        let committer = BatchCommitter::new("example.id", store.clone(), naming, builder, 10);
        let summary = committer.submit_once().await.unwrap();
        assert_eq!(summary.committed, 0);
        assert_eq!(summary.error.as_deref(), Some("malformed zonefile"));
        assert!(store.head("example.id", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepted_response_without_txid_or_error_leaves_rows_pending() {
        let store = store().await;
        store.enqueue("example.id", &subdomain("alice")).await.unwrap();

        let oracle = Arc::new(FakeOracle { known: vec![] });
        let builder = Arc::new(DefaultZonefileBuilder::new(oracle));
        let naming = Arc::new(ScriptedNamingApi {
            responses: Mutex::new(vec![NamingApiResponse {
                accepted: true,
                status: 202,
                txid: None,
                error: None,
            }]),
        });

        let committer = BatchCommitter::new("example.id", store.clone(), naming, builder, 10);
        let summary = committer.submit_once().await.unwrap();
        assert_eq!(summary.committed, 0);
        // row is neither committed nor marked failed: still sitting at the head
        assert_eq!(store.head("example.id", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let store = store().await;
        let oracle = Arc::new(FakeOracle { known: vec![] });
        let builder = Arc::new(DefaultZonefileBuilder::new(oracle));
        let naming = Arc::new(ScriptedNamingApi {
            responses: Mutex::new(vec![]),
        });
        let committer = BatchCommitter::new("example.id", store, naming, builder, 10);
        let summary = committer.submit_once().await.unwrap();
        assert_eq!(summary.committed, 0);
    }
}
