//! Classification of portal authentication failures
//!
//! The portal reports failures as free-text messages, so categories are
//! derived by substring matching in a fixed priority order. The wording is
//! not a stable contract; see DESIGN.md for the known fragility.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Failure categories recognized by the auto-fix engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    TokenExpired,
    Unauthorized,
    Forbidden,
    TimestampMismatch,
    SecretInvalid,
    NotAcceptable,
    Unknown,
}

/// A failed portal call as reported by a caller
#[derive(Debug, Clone)]
pub struct FailureDetails {
    pub message: String,
    pub status: Option<u16>,
}

impl FailureDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    /// One-line summary used in notifications and logs
    pub fn describe(&self) -> String {
        match self.status {
            Some(status) => format!("{} (status {})", self.message, status),
            None => self.message.clone(),
        }
    }
}

/// Map a failure message to its category.
///
/// Case-insensitive substring match, first rule wins. A message matching
/// both the token-expiry phrase and "401" is classified as expired.
pub fn classify(message: &str) -> ErrorCategory {
    let message = message.to_lowercase();

    if message.contains("token") && message.contains("expired") {
        ErrorCategory::TokenExpired
    } else if message.contains("unauthorized") || message.contains("401") {
        ErrorCategory::Unauthorized
    } else if message.contains("forbidden") || message.contains("403") {
        ErrorCategory::Forbidden
    } else if message.contains("timestamp") || message.contains("time") {
        ErrorCategory::TimestampMismatch
    } else if message.contains("secret_id")
        || message.contains("secret id")
        || message.contains("secret_pass")
        || message.contains("secret pass")
    {
        ErrorCategory::SecretInvalid
    } else if message.contains("406") {
        ErrorCategory::NotAcceptable
    } else {
        ErrorCategory::Unknown
    }
}

/// Immutable view of the accumulated evidence, used for strategy selection
#[derive(Debug, Clone)]
pub struct EvidenceSnapshot {
    pub counts: HashMap<ErrorCategory, u32>,
    pub consecutive_failures: u32,
}

impl EvidenceSnapshot {
    pub fn count(&self, category: ErrorCategory) -> u32 {
        self.counts.get(&category).copied().unwrap_or(0)
    }
}

/// Windowed per-category failure evidence.
///
/// Evidence older than the quiet period is discarded wholesale before a new
/// failure is recorded, so counts never accumulate across calm stretches.
#[derive(Debug)]
pub struct ErrorTracker {
    quiet_period: Duration,
    counts: HashMap<ErrorCategory, u32>,
    consecutive_failures: u32,
    total_in_window: u32,
    last_failure_at: Option<Instant>,
}

impl ErrorTracker {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            counts: HashMap::new(),
            consecutive_failures: 0,
            total_in_window: 0,
            last_failure_at: None,
        }
    }

    /// Record a failure and return its category.
    pub fn record_failure(&mut self, details: &FailureDetails) -> ErrorCategory {
        let now = Instant::now();

        if let Some(last) = self.last_failure_at {
            if now.duration_since(last) > self.quiet_period {
                log::debug!("Quiet period elapsed, discarding stale error evidence");
                self.counts.clear();
                self.consecutive_failures = 0;
                self.total_in_window = 0;
            }
        }

        let category = classify(&details.message);
        *self.counts.entry(category).or_insert(0) += 1;
        self.consecutive_failures += 1;
        self.total_in_window += 1;
        self.last_failure_at = Some(now);

        log::debug!(
            "Recorded failure as {:?} ({} consecutive): {}",
            category,
            self.consecutive_failures,
            details.describe()
        );

        category
    }

    /// A reported success wipes the evidence window.
    pub fn record_success(&mut self) {
        self.counts.clear();
        self.consecutive_failures = 0;
        self.total_in_window = 0;
        self.last_failure_at = None;
    }

    /// Check the circuit-breaker volume guard; tripping resets its counter.
    pub fn breaker_tripped(&mut self, threshold: u32) -> bool {
        if threshold > 0 && self.total_in_window >= threshold {
            self.total_in_window = 0;
            true
        } else {
            false
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn count(&self, category: ErrorCategory) -> u32 {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn pattern_counts(&self) -> HashMap<ErrorCategory, u32> {
        self.counts.clone()
    }

    pub fn snapshot(&self) -> EvidenceSnapshot {
        EvidenceSnapshot {
            counts: self.counts.clone(),
            consecutive_failures: self.consecutive_failures,
        }
    }
}
