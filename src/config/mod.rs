//! SQLite-based configuration module for declare-cli
//!
//! This module provides persistent storage for:
//! - Captured portal credential records (append-only, newest wins)
//! - Store maintenance (pruning superseded records)

use anyhow::{Context, Result};
use std::path::PathBuf;

pub mod db;
pub mod models;
pub mod repository;

pub use models::DbTokenRecord;

use crate::api::models::{CredentialRecord, NewCredentialRecord};

/// Main configuration manager using SQLite backend
pub struct Config {
    pool: sqlx::SqlitePool,
    config_path: PathBuf,
}

impl Config {
    /// Get the path to the SQLite database file
    pub fn get_db_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "linux") {
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join("declare-cli")
        } else {
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(".declare-cli")
        };

        // Ensure the directory exists
        if !config_dir.exists() {
            std::fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
            log::info!("Created config directory: {:?}", config_dir);
        }

        Ok(config_dir.join("config.db"))
    }

    /// Load configuration from SQLite database
    pub async fn load() -> Result<Self> {
        let db_path = Self::get_db_path()?;
        log::debug!("Loading config from: {:?}", db_path);

        let pool = db::connect(&db_path).await?;
        db::run_migrations(&pool).await?;

        Ok(Self {
            pool,
            config_path: db_path,
        })
    }

    /// Create a new config for testing (in-memory database)
    pub async fn new_test() -> Result<Self> {
        let pool = db::connect_memory().await?;
        db::run_migrations(&pool).await?;

        Ok(Self {
            pool,
            config_path: PathBuf::from(":memory:"),
        })
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &std::path::Path {
        &self.config_path
    }

    // Credential record methods
    pub async fn latest_token(
        &self,
        kind: &str,
        header_aliases: &[&str],
    ) -> Result<Option<CredentialRecord>> {
        repository::tokens::fetch_latest(&self.pool, kind, header_aliases).await
    }

    pub async fn save_token(&self, record: NewCredentialRecord) -> Result<CredentialRecord> {
        repository::tokens::insert(&self.pool, record).await
    }

    pub async fn prune_tokens(&self, kind: &str, keep_latest: u32) -> Result<u64> {
        repository::tokens::prune(&self.pool, kind, keep_latest).await
    }
}
