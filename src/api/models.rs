//! Shared models for the portal token service

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::constants::{self, BEARER_PREFIX, PLACEHOLDER_TOKEN};

/// A captured portal credential as persisted in the store.
/// Records are immutable once written; recovery only ever appends new ones.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialRecord {
    pub id: i64,
    pub token: String,
    pub kind: String,
    pub format: String,
    pub header_name: String,
    pub source: String,
    pub target_url: String,
    pub method: String,
    pub is_jwt: bool,
    pub captured_at: DateTime<Utc>,
}

/// Insert shape for a freshly captured credential
#[derive(Debug, Clone)]
pub struct NewCredentialRecord {
    pub token: String,
    pub kind: String,
    pub format: String,
    pub header_name: String,
    pub source: String,
    pub target_url: String,
    pub method: String,
    pub is_jwt: bool,
    pub captured_at: DateTime<Utc>,
}

impl NewCredentialRecord {
    /// Build a record with the defaults the capture side uses; the JWT flag
    /// is derived structurally from the token value.
    pub fn new(token: impl Into<String>, kind: impl Into<String>) -> Self {
        let token = token.into();
        let is_jwt = constants::looks_like_jwt(&token);
        Self {
            token,
            kind: kind.into(),
            format: constants::TOKEN_FORMAT_BEARER.to_string(),
            header_name: constants::headers::AUTHORIZATION.to_string(),
            source: String::new(),
            target_url: String::new(),
            method: "GET".to_string(),
            is_jwt,
            captured_at: Utc::now(),
        }
    }
}

/// In-memory view of the credential served to callers.
///
/// `valid` is false only when no usable record could be obtained and the
/// placeholder fallback was substituted; callers must check it before
/// trusting `authorization`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub authorization: String,
    pub captured_at: DateTime<Utc>,
    pub valid: bool,
}

impl TokenInfo {
    /// Derive a TokenInfo from the newest stored record. The result is
    /// invalid when the record holds an empty value or the capture-side
    /// placeholder sentinel.
    pub fn from_record(record: &CredentialRecord) -> Self {
        let trimmed = record.token.trim();
        let bare = trimmed.strip_prefix(BEARER_PREFIX).unwrap_or(trimmed).trim();
        Self {
            authorization: constants::with_bearer_prefix(bare),
            captured_at: record.captured_at,
            valid: !bare.is_empty() && bare != PLACEHOLDER_TOKEN,
        }
    }

    /// The invalid placeholder served when the store yields nothing usable.
    /// Never cached.
    pub fn fallback() -> Self {
        Self {
            authorization: constants::with_bearer_prefix(PLACEHOLDER_TOKEN),
            captured_at: Utc::now(),
            valid: false,
        }
    }
}

/// Operator-facing snapshot of the token cache
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub initialized: bool,
    pub cached: bool,
    pub expired: bool,
    pub valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: &str) -> CredentialRecord {
        CredentialRecord {
            id: 1,
            token: token.to_string(),
            kind: "portal".to_string(),
            format: "bearer".to_string(),
            header_name: "Authorization".to_string(),
            source: "test".to_string(),
            target_url: String::new(),
            method: "GET".to_string(),
            is_jwt: false,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_from_record_prefixes_bare_tokens() {
        let info = TokenInfo::from_record(&record("abc123"));
        assert_eq!(info.authorization, "Bearer abc123");
        assert!(info.valid);
    }

    #[test]
    fn test_from_record_keeps_existing_prefix() {
        let info = TokenInfo::from_record(&record("Bearer abc123"));
        assert_eq!(info.authorization, "Bearer abc123");
        assert!(info.valid);
    }

    #[test]
    fn test_placeholder_and_empty_records_are_invalid() {
        assert!(!TokenInfo::from_record(&record("unknown")).valid);
        assert!(!TokenInfo::from_record(&record("Bearer unknown")).valid);
        assert!(!TokenInfo::from_record(&record("   ")).valid);
    }

    #[test]
    fn test_fallback_is_invalid() {
        let info = TokenInfo::fallback();
        assert!(!info.valid);
        assert_eq!(info.authorization, "Bearer unknown");
    }

    #[test]
    fn test_new_record_derives_jwt_flag() {
        let jwt = NewCredentialRecord::new("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.c2ln", "portal");
        assert!(jwt.is_jwt);
        let opaque = NewCredentialRecord::new("opaque-token", "portal");
        assert!(!opaque.is_jwt);
    }
}
