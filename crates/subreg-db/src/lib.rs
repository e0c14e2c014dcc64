//! Durable per-parent-domain queue store.
//!
//! One embedded SQLite file backs every parent domain; each domain gets its
//! own table so that domains never contend on the same rows. This mirrors
//! the outbox pattern used elsewhere in this stack (enqueue with a
//! conditional insert, claim/drain the head, mark terminal state) but keyed
//! by `subdomain_name` instead of an idempotency key, and backed by a
//! single-file store rather than a pooled server connection.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use subreg_schemas::{CommitState, QueueEntry, Subdomain};

/// Errors raised by queue store operations.
#[derive(Debug)]
pub enum QueueError {
    /// A row with this `subdomain_name` already exists in this queue.
    DuplicateSubdomain(String),
    /// The parent domain does not match the allow-listed pattern required
    /// before it is used to derive a SQL table identifier.
    InvalidParentDomain(String),
    /// Underlying storage (I/O, SQL) failure.
    Storage(String),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::DuplicateSubdomain(name) => {
                write!(f, "subdomain '{name}' already exists on this domain")
            }
            QueueError::InvalidParentDomain(d) => write!(f, "invalid parent domain '{d}'"),
            QueueError::Storage(e) => write!(f, "queue storage error: {e}"),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Storage(e.to_string())
    }
}

fn parent_domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9.\-]{1,253}$").expect("valid regex"))
}

/// Turn a parent domain into a safe SQL table identifier.
///
/// Rejects anything outside a conservative allow-list before the name is
/// ever interpolated into DDL/DML, since table names cannot be bound as
/// query parameters.
fn table_name(parent_domain: &str) -> Result<String, QueueError> {
    if !parent_domain_re().is_match(parent_domain) {
        return Err(QueueError::InvalidParentDomain(parent_domain.to_string()));
    }
    Ok(format!("subreg_queue_{}", parent_domain.replace('.', "_")))
}

/// A handle to the queue store, backed by one SQLite file.
#[derive(Clone)]
pub struct QueueStore {
    pool: SqlitePool,
}

impl QueueStore {
    /// Open (creating if missing) the queue store file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<QueueStore, QueueError> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        sqlx::query("pragma journal_mode = WAL").execute(&pool).await?;
        sqlx::query("pragma foreign_keys = on").execute(&pool).await?;

        Ok(QueueStore { pool })
    }

    /// Ensure the per-domain table (and its uniqueness index) exists.
    pub async fn ensure_domain(&self, parent_domain: &str) -> Result<(), QueueError> {
        let table = table_name(parent_domain)?;
        let ddl = format!(
            "create table if not exists {table} (
                received_at integer primary key,
                subdomain_name text not null,
                payload text not null,
                status text not null,
                txid text,
                failure_reason text
            )"
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        let idx = format!(
            "create unique index if not exists {table}_subdomain_name_idx on {table}(subdomain_name)"
        );
        sqlx::query(&idx).execute(&self.pool).await?;

        Ok(())
    }

    /// Append a `PENDING` row. Fails with [`QueueError::DuplicateSubdomain`]
    /// if a row with this `subdomain_name` already exists, in any state.
    ///
    /// The insert and the uniqueness check happen in a single statement
    /// (`insert ... select ... where not exists`), closing the race a
    /// separate check-then-insert would leave open for concurrent callers.
    pub async fn enqueue(&self, parent_domain: &str, subdomain: &Subdomain) -> Result<(), QueueError> {
        self.ensure_domain(parent_domain).await?;
        let table = table_name(parent_domain)?;
        let payload = serde_json::to_string(subdomain).map_err(|e| QueueError::Storage(e.to_string()))?;

        let sql = format!(
            "insert into {table} (subdomain_name, payload, status)
             select ?, ?, 'PENDING'
             where not exists (select 1 from {table} where subdomain_name = ?)"
        );

        let result = sqlx::query(&sql)
            .bind(&subdomain.name)
            .bind(&payload)
            .bind(&subdomain.name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::DuplicateSubdomain(subdomain.name.clone()));
        }

        tracing::info!(domain = parent_domain, subdomain = %subdomain.name, "enqueued subdomain");
        Ok(())
    }

    /// Return whether `subdomain_name` exists in this queue, in any state.
    pub async fn contains(&self, parent_domain: &str, subdomain_name: &str) -> Result<bool, QueueError> {
        self.ensure_domain(parent_domain).await?;
        let table = table_name(parent_domain)?;
        let sql = format!("select 1 from {table} where subdomain_name = ?");
        let row = sqlx::query(&sql)
            .bind(subdomain_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// The oldest `limit` `PENDING` rows, ascending by `received_at`.
    pub async fn head(&self, parent_domain: &str, limit: i64) -> Result<Vec<QueueEntry>, QueueError> {
        self.ensure_domain(parent_domain).await?;
        let table = table_name(parent_domain)?;
        let sql = format!(
            "select received_at, subdomain_name, payload from {table}
             where status = 'PENDING' order by received_at asc limit ?"
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let received_at: i64 = row.try_get("received_at")?;
            let subdomain_name: String = row.try_get("subdomain_name")?;
            let payload_text: String = row.try_get("payload")?;
            let payload: Subdomain =
                serde_json::from_str(&payload_text).map_err(|e| QueueError::Storage(e.to_string()))?;
            out.push(QueueEntry {
                received_at,
                subdomain_name,
                payload,
                commit_state: CommitState::Pending,
            });
        }
        Ok(out)
    }

    /// Mark the given rows `COMMITTED(txid)`.
    pub async fn mark_committed(
        &self,
        parent_domain: &str,
        received_ats: &[i64],
        txid: &str,
    ) -> Result<(), QueueError> {
        self.mark(parent_domain, received_ats, "COMMITTED", Some(txid), None)
            .await
    }

    /// Mark the given rows `ALREADY_EXISTED`.
    pub async fn mark_already_existed(
        &self,
        parent_domain: &str,
        received_ats: &[i64],
    ) -> Result<(), QueueError> {
        self.mark(parent_domain, received_ats, "ALREADY_EXISTED", None, None)
            .await
    }

    /// Mark the given rows `FAILED(reason)`.
    pub async fn mark_failed(
        &self,
        parent_domain: &str,
        received_ats: &[i64],
        reason: &str,
    ) -> Result<(), QueueError> {
        self.mark(parent_domain, received_ats, "FAILED", None, Some(reason))
            .await
    }

    async fn mark(
        &self,
        parent_domain: &str,
        received_ats: &[i64],
        status: &str,
        txid: Option<&str>,
        reason: Option<&str>,
    ) -> Result<(), QueueError> {
        if received_ats.is_empty() {
            return Ok(());
        }
        let table = table_name(parent_domain)?;
        let placeholders = received_ats.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "update {table} set status = ?, txid = ?, failure_reason = ?
             where received_at in ({placeholders}) and status = 'PENDING'"
        );

        let mut q = sqlx::query(&sql).bind(status).bind(txid).bind(reason);
        for id in received_ats {
            q = q.bind(id);
        }
        q.execute(&self.pool).await?;
        Ok(())
    }
}
