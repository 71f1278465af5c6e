//! Auto-fix orchestration for portal authentication failures
//!
//! Every reported failure feeds the evidence tracker; when the entry
//! conditions hold, one recovery strategy runs at a time, bounded by a
//! cooldown and an attempt ceiling. A volume-based circuit breaker clears
//! the cache independently of strategy outcomes.

use std::collections::HashMap;

use anyhow::{Result, bail};
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::classifier::{ErrorCategory, ErrorTracker, EvidenceSnapshot, FailureDetails};
use super::config::{LifecycleConfig, RecoveryConfig};
use super::workflow::WorkflowClient;
use crate::api::events::{EventBus, TokenEvent};
use crate::api::token_manager::TokenManager;

/// Status codes that qualify a single failure for immediate recovery
const CRITICAL_STATUS_CODES: &[u16] = &[401, 406];

/// The recovery procedures, in escalation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStrategy {
    /// Force-refresh the cache from the store
    SimpleRefresh,
    /// Clear, wait briefly, refresh, and verify the result is valid
    DeepRefresh,
    /// Trigger the external regeneration workflow, settle, then refresh
    DeepExternalRefresh,
}

impl FixStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            FixStrategy::SimpleRefresh => "simple_refresh",
            FixStrategy::DeepRefresh => "deep_refresh",
            FixStrategy::DeepExternalRefresh => "deep_external_refresh",
        }
    }
}

/// Why a failure report did not trigger a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Disabled,
    AlreadyRunning,
    CoolingDown,
    AttemptsExhausted,
    BelowThreshold,
}

/// Outcome of one failure report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixOutcome {
    Executed { strategy: FixStrategy, success: bool },
    Rejected(RejectReason),
}

/// Mutable orchestrator state; `in_progress` is true for exactly the span
/// of one strategy execution.
#[derive(Debug)]
struct AutoFixState {
    enabled: bool,
    in_progress: bool,
    attempts: u32,
    last_attempt_at: Option<Instant>,
}

/// Operator-facing snapshot of the orchestrator
#[derive(Debug, Clone, Serialize)]
pub struct AutoFixStatus {
    pub enabled: bool,
    pub in_progress: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_attempt_age_secs: Option<u64>,
    pub error_pattern_counts: HashMap<ErrorCategory, u32>,
}

/// Pick a strategy from the accumulated evidence and the triggering status.
///
/// Timestamp or secret trouble (or an outright 406) means the stored
/// credential itself is beyond local repair, so the external workflow is
/// asked for a new one. Repeated expiry gets the verified deep refresh.
/// Anything else starts with a plain refresh.
fn select_strategy(
    evidence: &EvidenceSnapshot,
    status: Option<u16>,
    pattern_threshold: u32,
) -> FixStrategy {
    if evidence.count(ErrorCategory::TimestampMismatch) >= pattern_threshold
        || evidence.count(ErrorCategory::SecretInvalid) >= pattern_threshold
        || status == Some(406)
    {
        FixStrategy::DeepExternalRefresh
    } else if evidence.count(ErrorCategory::TokenExpired) >= pattern_threshold {
        FixStrategy::DeepRefresh
    } else {
        FixStrategy::SimpleRefresh
    }
}

/// Drives automatic recovery of the portal credential.
///
/// Owns the error evidence and the auto-fix state exclusively; callers only
/// interact through the report/control operations.
pub struct AutoFixOrchestrator {
    manager: TokenManager,
    workflow: WorkflowClient,
    events: EventBus,
    config: RecoveryConfig,
    tracker: Mutex<ErrorTracker>,
    state: Mutex<AutoFixState>,
}

impl AutoFixOrchestrator {
    pub fn new(manager: TokenManager, config: &LifecycleConfig, events: EventBus) -> Self {
        Self {
            manager,
            workflow: WorkflowClient::new(config.workflow.clone()),
            events,
            config: config.recovery.clone(),
            tracker: Mutex::new(ErrorTracker::new(config.recovery.quiet_period)),
            state: Mutex::new(AutoFixState {
                enabled: config.recovery.enabled,
                in_progress: false,
                attempts: 0,
                last_attempt_at: None,
            }),
        }
    }

    /// Record a failed portal call and, when the entry conditions hold,
    /// execute one recovery strategy. Concurrent reports while a strategy
    /// runs are recorded as evidence only.
    pub async fn report_failure(&self, details: FailureDetails) -> FixOutcome {
        let (evidence, breaker) = {
            let mut tracker = self.tracker.lock().await;
            tracker.record_failure(&details);
            let breaker = tracker.breaker_tripped(self.config.breaker_threshold);
            (tracker.snapshot(), breaker)
        };

        // Volume guard, independent of strategy outcomes: enough noise in
        // one window clears the cache unconditionally.
        if breaker {
            warn!("Error volume tripped the circuit breaker, clearing token cache");
            self.manager.clear().await;
        }

        let attempt = {
            let mut state = self.state.lock().await;

            if !state.enabled {
                return FixOutcome::Rejected(RejectReason::Disabled);
            }
            if state.in_progress {
                return FixOutcome::Rejected(RejectReason::AlreadyRunning);
            }
            if let Some(last) = state.last_attempt_at {
                if last.elapsed() < self.config.cooldown {
                    return FixOutcome::Rejected(RejectReason::CoolingDown);
                }
            }
            if state.attempts >= self.config.max_attempts {
                return FixOutcome::Rejected(RejectReason::AttemptsExhausted);
            }

            let critical = details
                .status
                .is_some_and(|status| CRITICAL_STATUS_CODES.contains(&status));
            if evidence.consecutive_failures < self.config.consecutive_threshold && !critical {
                return FixOutcome::Rejected(RejectReason::BelowThreshold);
            }

            state.in_progress = true;
            state.attempts += 1;
            state.last_attempt_at = Some(Instant::now());
            state.attempts
        };

        let strategy = select_strategy(&evidence, details.status, self.config.pattern_threshold);
        let correlation_id = Uuid::new_v4();

        info!(
            "Auto-fix attempt {} via {}: {}",
            attempt,
            strategy.name(),
            details.describe()
        );
        self.events.emit(TokenEvent::AutoFixStarted {
            correlation_id,
            attempt,
            details: details.describe(),
            timestamp: Utc::now(),
        });

        let result = self.execute_strategy(strategy).await;
        let success = result.is_ok();

        self.events.emit(TokenEvent::AutoFixCompleted {
            correlation_id,
            success,
            strategy: Some(strategy.name().to_string()),
            error: result.as_ref().err().map(|err| format!("{:#}", err)),
            timestamp: Utc::now(),
        });

        // Back to idle no matter how the strategy ended
        self.state.lock().await.in_progress = false;

        if let Err(err) = result {
            warn!("Auto-fix strategy {} failed: {:#}", strategy.name(), err);
        }

        FixOutcome::Executed { strategy, success }
    }

    /// Report a successful portal call: evidence and the attempt counter
    /// are reset so past trouble stops influencing future decisions.
    pub async fn report_success(&self) {
        self.tracker.lock().await.record_success();
        self.state.lock().await.attempts = 0;
    }

    /// Enable or disable auto-correction. Never interrupts a running
    /// strategy.
    pub async fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock().await;
        state.enabled = enabled;
        info!(
            "Auto-fix {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Operator reset: zero the attempt counter, clear evidence, and lift
    /// the cooldown. Never interrupts a running strategy.
    pub async fn reset_state(&self) {
        {
            let mut state = self.state.lock().await;
            state.attempts = 0;
            state.last_attempt_at = None;
        }
        self.tracker.lock().await.record_success();
        info!("Auto-fix state reset");
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.enabled
    }

    /// Operator-facing snapshot of the orchestrator.
    pub async fn status(&self) -> AutoFixStatus {
        let counts = self.tracker.lock().await.pattern_counts();
        let state = self.state.lock().await;
        AutoFixStatus {
            enabled: state.enabled,
            in_progress: state.in_progress,
            attempts: state.attempts,
            max_attempts: self.config.max_attempts,
            last_attempt_age_secs: state.last_attempt_at.map(|at| at.elapsed().as_secs()),
            error_pattern_counts: counts,
        }
    }

    async fn execute_strategy(&self, strategy: FixStrategy) -> Result<()> {
        match strategy {
            FixStrategy::SimpleRefresh => {
                self.manager.force_refresh().await;
                Ok(())
            }
            FixStrategy::DeepRefresh => {
                self.manager.clear().await;
                tokio::time::sleep(self.config.deep_refresh_delay).await;
                let info = self.manager.force_refresh().await;
                if !info.valid {
                    bail!("Deep refresh produced an invalid token");
                }
                Ok(())
            }
            FixStrategy::DeepExternalRefresh => {
                let token = self
                    .manager
                    .peek()
                    .await
                    .map(|info| info.authorization)
                    .unwrap_or_default();
                if let Err(err) = self.workflow.trigger(&token).await {
                    warn!("Recovery workflow call failed, proceeding anyway: {:#}", err);
                }
                tokio::time::sleep(self.config.settle_delay).await;
                self.manager.force_refresh().await;
                Ok(())
            }
        }
    }
}
