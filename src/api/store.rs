//! Narrow credential store contract consumed by the token manager.
//!
//! The manager only ever needs the newest record for a kind and a way to
//! persist freshly captured ones; everything else about the store stays
//! behind this seam so tests can substitute their own implementations.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

use super::constants;
use super::models::{CredentialRecord, NewCredentialRecord};
use crate::config::repository;

/// Fetch/insert contract over the persistent credential store.
///
/// Implementations must bound their own I/O: a stalled store call must time
/// out rather than wedge `ensure_ready()` forever.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Newest record for the kind, or `None` when nothing was deposited yet.
    async fn fetch_latest(&self, kind: &str) -> Result<Option<CredentialRecord>>;

    /// Persist a newly captured credential.
    async fn insert(&self, record: NewCredentialRecord) -> Result<CredentialRecord>;
}

/// SQLite-backed credential store over the config database
#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn fetch_latest(&self, kind: &str) -> Result<Option<CredentialRecord>> {
        repository::tokens::fetch_latest(&self.pool, kind, constants::headers::ACCEPTED).await
    }

    async fn insert(&self, record: NewCredentialRecord) -> Result<CredentialRecord> {
        repository::tokens::insert(&self.pool, record).await
    }
}
