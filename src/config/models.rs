//! Data models for the configuration database

use sqlx::FromRow;

use crate::api::models::CredentialRecord;

/// Database representation of a captured credential record
#[derive(Debug, Clone, FromRow)]
pub struct DbTokenRecord {
    pub id: i64,
    pub token: String,
    pub kind: String,
    pub format: String,
    pub header_name: String,
    pub source: String,
    pub target_url: String,
    pub method: String,
    pub is_jwt: bool,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl From<DbTokenRecord> for CredentialRecord {
    fn from(row: DbTokenRecord) -> Self {
        CredentialRecord {
            id: row.id,
            token: row.token,
            kind: row.kind,
            format: row.format,
            header_name: row.header_name,
            source: row.source,
            target_url: row.target_url,
            method: row.method,
            is_jwt: row.is_jwt,
            captured_at: row.captured_at,
        }
    }
}
