//! Postgres persistence shared by the ingestion server and the worker.
//!
//! All queries use the runtime query API with bind parameters. Entity writes
//! are idempotent upserts on `(project_id, id)`, which is what makes
//! per-event retries and queue redeliveries safe. The relational schema
//! itself is owned by the deployment's migration pipeline, not this crate.

mod evals;
mod ingestion;
mod rows;

pub use self::rows::*;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

/// An error returned by store operations.
///
/// Store failures are treated as retryable by callers; the ingestion
/// pipeline maps them to per-event 500s and the workers re-throw them for
/// queue redelivery.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected or failed a query.
    #[error("database query failed")]
    Query(#[from] sqlx::Error),

    /// A stored JSON column did not match the expected shape.
    #[error("malformed stored data: {0}")]
    Malformed(String),
}

/// Handle to the shared Postgres pool.
#[derive(Clone, Debug)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connects a bounded pool to the database at `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool, used by tests.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cheap liveness probe for health checks.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Resolves an API key row by its public key.
    ///
    /// The secret comparison happens in the auth layer; this only fetches
    /// the row with the owning organization's billing state joined in.
    pub async fn find_api_key(&self, public_key: &str) -> Result<Option<ApiKeyRow>, StoreError> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT k.public_key, k.hashed_secret_key, k.project_id, k.scope,
                    o.id AS org_id, o.plan, o.rate_limit_overrides
             FROM api_keys k
             JOIN projects p ON p.id = k.project_id
             JOIN organizations o ON o.id = p.org_id
             WHERE k.public_key = $1",
        )
        .bind(public_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
