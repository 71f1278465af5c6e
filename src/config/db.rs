//! Database connection and schema management

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;

/// Connect to the SQLite database at the given path, creating it if needed
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database at {:?}", path))?;

    Ok(pool)
}

/// Connect to an in-memory database for testing.
/// A single connection is mandatory: every new in-memory connection would
/// otherwise see its own empty database.
pub async fn connect_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory database")?;

    Ok(pool)
}

/// Create the schema if it does not exist yet
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS portal_tokens (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            token TEXT NOT NULL,
            kind TEXT NOT NULL,
            format TEXT NOT NULL DEFAULT 'bearer',
            header_name TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT '',
            target_url TEXT NOT NULL DEFAULT '',
            method TEXT NOT NULL DEFAULT 'GET',
            is_jwt BOOLEAN NOT NULL DEFAULT 0,
            captured_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create portal_tokens table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_portal_tokens_kind_captured
         ON portal_tokens (kind, captured_at DESC)",
    )
    .execute(pool)
    .await
    .context("Failed to create portal_tokens index")?;

    log::debug!("Database schema is up to date");
    Ok(())
}
