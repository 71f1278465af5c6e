//! Repository for captured credential records

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::api::models::{CredentialRecord, NewCredentialRecord};
use crate::config::models::DbTokenRecord;

/// Newest record for the kind, restricted to the accepted header-name
/// aliases, ordered by capture time descending.
pub async fn fetch_latest(
    pool: &SqlitePool,
    kind: &str,
    header_aliases: &[&str],
) -> Result<Option<CredentialRecord>> {
    if header_aliases.is_empty() {
        return Ok(None);
    }

    let placeholders = vec!["?"; header_aliases.len()].join(", ");
    let sql = format!(
        "SELECT id, token, kind, format, header_name, source, target_url, method, is_jwt, captured_at
         FROM portal_tokens
         WHERE kind = ? AND header_name IN ({})
         ORDER BY captured_at DESC
         LIMIT 1",
        placeholders
    );

    let mut query = sqlx::query_as::<_, DbTokenRecord>(&sql).bind(kind);
    for alias in header_aliases {
        query = query.bind(*alias);
    }

    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to fetch latest credential for kind '{}'", kind))?;

    Ok(row.map(CredentialRecord::from))
}

/// Insert a newly captured credential record
pub async fn insert(pool: &SqlitePool, record: NewCredentialRecord) -> Result<CredentialRecord> {
    let result = sqlx::query(
        r#"
        INSERT INTO portal_tokens (token, kind, format, header_name, source, target_url, method, is_jwt, captured_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.token)
    .bind(&record.kind)
    .bind(&record.format)
    .bind(&record.header_name)
    .bind(&record.source)
    .bind(&record.target_url)
    .bind(&record.method)
    .bind(record.is_jwt)
    .bind(record.captured_at)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to save credential record for kind '{}'", record.kind))?;

    let id = result.last_insert_rowid();
    log::debug!("Saved credential record {} for kind: {}", id, record.kind);

    Ok(CredentialRecord {
        id,
        token: record.token,
        kind: record.kind,
        format: record.format,
        header_name: record.header_name,
        source: record.source,
        target_url: record.target_url,
        method: record.method,
        is_jwt: record.is_jwt,
        captured_at: record.captured_at,
    })
}

/// Delete superseded records for the kind, keeping the newest `keep_latest`
pub async fn prune(pool: &SqlitePool, kind: &str, keep_latest: u32) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM portal_tokens
        WHERE kind = ? AND id NOT IN (
            SELECT id FROM portal_tokens
            WHERE kind = ?
            ORDER BY captured_at DESC
            LIMIT ?
        )
        "#,
    )
    .bind(kind)
    .bind(kind)
    .bind(i64::from(keep_latest))
    .execute(pool)
    .await
    .with_context(|| format!("Failed to prune credential records for kind '{}'", kind))?;

    let deleted_count = result.rows_affected();
    if deleted_count > 0 {
        log::info!(
            "Pruned {} superseded credential records for kind: {}",
            deleted_count,
            kind
        );
    }

    Ok(deleted_count)
}
