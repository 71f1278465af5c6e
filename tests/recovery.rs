//! Integration tests for the auto-fix orchestrator: strategy selection,
//! cooldowns, the attempt ceiling, and the volume circuit breaker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;

use declare_cli::api::recovery::{
    AutoFixOrchestrator, CacheConfig, FailureDetails, FixOutcome, FixStrategy, LifecycleConfig,
    RecoveryConfig, RejectReason,
};
use declare_cli::api::{
    CredentialRecord, CredentialStore, EventBus, NewCredentialRecord, SqliteCredentialStore,
    TokenEvent, TokenManager, constants,
};
use declare_cli::config::Config;

/// Store wrapper able to hold fetches behind a gate or fail them outright.
struct InstrumentedStore {
    inner: SqliteCredentialStore,
    gate: Semaphore,
    failing: AtomicBool,
}

impl InstrumentedStore {
    fn open(inner: SqliteCredentialStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
            failing: AtomicBool::new(false),
        })
    }

    fn gated(inner: SqliteCredentialStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate: Semaphore::new(0),
            failing: AtomicBool::new(false),
        })
    }

    fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialStore for InstrumentedStore {
    async fn fetch_latest(&self, kind: &str) -> Result<Option<CredentialRecord>> {
        self.gate.acquire().await.expect("gate closed").forget();
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("simulated store outage");
        }
        self.inner.fetch_latest(kind).await
    }

    async fn insert(&self, record: NewCredentialRecord) -> Result<CredentialRecord> {
        self.inner.insert(record).await
    }
}

fn fast_recovery() -> RecoveryConfig {
    RecoveryConfig {
        deep_refresh_delay: Duration::from_millis(1),
        settle_delay: Duration::from_millis(1),
        ..RecoveryConfig::default()
    }
}

struct Harness {
    config: Config,
    store: Arc<InstrumentedStore>,
    manager: TokenManager,
    orchestrator: Arc<AutoFixOrchestrator>,
    events: EventBus,
}

/// Seeded store + initialized manager + orchestrator under the given
/// recovery settings.
async fn harness(recovery: RecoveryConfig, gated: bool) -> Result<Harness> {
    let config = Config::new_test().await?;
    let mut record = NewCredentialRecord::new("T1", constants::TOKEN_KIND_PORTAL);
    record.captured_at = Utc::now() - chrono::Duration::seconds(60);
    config.save_token(record).await?;

    let sqlite = SqliteCredentialStore::new(config.pool().clone());
    let store = if gated {
        InstrumentedStore::gated(sqlite)
    } else {
        InstrumentedStore::open(sqlite)
    };

    let events = EventBus::default();
    let manager = TokenManager::new(
        store.clone(),
        constants::TOKEN_KIND_PORTAL,
        CacheConfig::default(),
        events.clone(),
    );

    let lifecycle = LifecycleConfig {
        recovery,
        ..LifecycleConfig::default()
    };
    let orchestrator = Arc::new(AutoFixOrchestrator::new(
        manager.clone(),
        &lifecycle,
        events.clone(),
    ));

    Ok(Harness {
        config,
        store,
        manager,
        orchestrator,
        events,
    })
}

fn expired() -> FailureDetails {
    FailureDetails::new("Token expired while calling the declaration endpoint")
}

#[tokio::test]
async fn test_deep_refresh_selected_on_second_expiry() -> Result<()> {
    let h = harness(fast_recovery(), false).await?;
    assert!(h.manager.ensure_ready().await?.valid);

    // One expiry is below the consecutive threshold
    let first = h.orchestrator.report_failure(expired()).await;
    assert_eq!(first, FixOutcome::Rejected(RejectReason::BelowThreshold));

    // The second reaches both the threshold and the expiry pattern
    let second = h.orchestrator.report_failure(expired()).await;
    assert_eq!(
        second,
        FixOutcome::Executed {
            strategy: FixStrategy::DeepRefresh,
            success: true,
        }
    );

    let status = h.orchestrator.status().await;
    assert_eq!(status.attempts, 1);
    assert!(!status.in_progress);
    assert!(h.manager.is_ready().await);

    // A third report lands inside the cooldown window; no second strategy,
    // but the volume breaker clears the cache on its own
    let third = h.orchestrator.report_failure(expired()).await;
    assert_eq!(third, FixOutcome::Rejected(RejectReason::CoolingDown));
    assert_eq!(h.orchestrator.status().await.attempts, 1);
    assert!(!h.manager.status().await.cached);
    Ok(())
}

#[tokio::test]
async fn test_disabled_autofix_records_evidence_but_never_runs() -> Result<()> {
    let recovery = RecoveryConfig {
        enabled: false,
        ..fast_recovery()
    };
    let h = harness(recovery, false).await?;
    assert!(h.manager.ensure_ready().await?.valid);

    for i in 0..10 {
        let outcome = h
            .orchestrator
            .report_failure(FailureDetails::with_status("401 unauthorized", 401))
            .await;
        assert_eq!(outcome, FixOutcome::Rejected(RejectReason::Disabled));

        // The breaker is independent of auto-fix: the third failure clears
        // the cache even though no strategy ever ran
        if i == 2 {
            assert!(!h.manager.status().await.cached);
        }
    }

    assert_eq!(h.orchestrator.status().await.attempts, 0);
    Ok(())
}

#[tokio::test]
async fn test_attempt_ceiling_holds_until_reset() -> Result<()> {
    let recovery = RecoveryConfig {
        cooldown: Duration::ZERO,
        max_attempts: 3,
        ..fast_recovery()
    };
    let h = harness(recovery, false).await?;
    assert!(h.manager.ensure_ready().await?.valid);

    // Every deep refresh fails against a dead store
    h.store.set_failing(true);

    let first = h.orchestrator.report_failure(expired()).await;
    assert_eq!(first, FixOutcome::Rejected(RejectReason::BelowThreshold));

    for expected_attempts in 1..=3 {
        let outcome = h.orchestrator.report_failure(expired()).await;
        assert_eq!(
            outcome,
            FixOutcome::Executed {
                strategy: FixStrategy::DeepRefresh,
                success: false,
            }
        );
        assert_eq!(h.orchestrator.status().await.attempts, expected_attempts);
    }

    // The ceiling is reached: further qualifying failures are rejected
    let exhausted = h.orchestrator.report_failure(expired()).await;
    assert_eq!(
        exhausted,
        FixOutcome::Rejected(RejectReason::AttemptsExhausted)
    );
    assert_eq!(h.orchestrator.status().await.attempts, 3);

    // An operator reset clears the ceiling and the evidence
    h.orchestrator.reset_state().await;
    h.store.set_failing(false);
    let status = h.orchestrator.status().await;
    assert_eq!(status.attempts, 0);
    assert!(status.error_pattern_counts.is_empty());

    let below = h.orchestrator.report_failure(expired()).await;
    assert_eq!(below, FixOutcome::Rejected(RejectReason::BelowThreshold));
    let outcome = h.orchestrator.report_failure(expired()).await;
    assert_eq!(
        outcome,
        FixOutcome::Executed {
            strategy: FixStrategy::DeepRefresh,
            success: true,
        }
    );
    assert_eq!(h.orchestrator.status().await.attempts, 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_reports_never_run_two_strategies() -> Result<()> {
    let recovery = RecoveryConfig {
        cooldown: Duration::ZERO,
        ..fast_recovery()
    };
    let h = harness(recovery, true).await?;

    // Initialization needs exactly one gated fetch
    h.store.release(1);
    assert!(h.manager.ensure_ready().await?.valid);

    // A critical status qualifies a single failure; the strategy blocks on
    // the gated store while it refreshes
    let orchestrator = h.orchestrator.clone();
    let running = tokio::spawn(async move {
        orchestrator
            .report_failure(FailureDetails::with_status("401 unauthorized", 401))
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.orchestrator.status().await.in_progress);

    // Reports arriving while the strategy runs are evidence only
    for _ in 0..4 {
        let outcome = h
            .orchestrator
            .report_failure(FailureDetails::with_status("401 unauthorized", 401))
            .await;
        assert_eq!(outcome, FixOutcome::Rejected(RejectReason::AlreadyRunning));
    }

    h.store.release(8);
    let outcome = running.await?;
    assert_eq!(
        outcome,
        FixOutcome::Executed {
            strategy: FixStrategy::SimpleRefresh,
            success: true,
        }
    );

    let status = h.orchestrator.status().await;
    assert_eq!(status.attempts, 1);
    assert!(!status.in_progress);
    Ok(())
}

#[tokio::test]
async fn test_report_success_resets_attempts_and_evidence() -> Result<()> {
    let recovery = RecoveryConfig {
        cooldown: Duration::ZERO,
        ..fast_recovery()
    };
    let h = harness(recovery, false).await?;
    assert!(h.manager.ensure_ready().await?.valid);

    h.orchestrator.report_failure(expired()).await;
    let outcome = h.orchestrator.report_failure(expired()).await;
    assert!(matches!(outcome, FixOutcome::Executed { .. }));
    assert_eq!(h.orchestrator.status().await.attempts, 1);

    h.orchestrator.report_success().await;

    let status = h.orchestrator.status().await;
    assert_eq!(status.attempts, 0);
    assert!(status.error_pattern_counts.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_not_acceptable_status_triggers_external_refresh_immediately() -> Result<()> {
    let h = harness(fast_recovery(), false).await?;
    assert!(h.manager.ensure_ready().await?.valid);

    // 406 is critical: one report is enough, and it forces the external
    // workflow strategy (unconfigured endpoint is skipped with a warning)
    let outcome = h
        .orchestrator
        .report_failure(FailureDetails::with_status("HTTP 406 from portal", 406))
        .await;
    assert_eq!(
        outcome,
        FixOutcome::Executed {
            strategy: FixStrategy::DeepExternalRefresh,
            success: true,
        }
    );
    assert!(h.manager.is_ready().await);
    Ok(())
}

#[tokio::test]
async fn test_failed_deep_refresh_is_reported_not_raised() -> Result<()> {
    let recovery = RecoveryConfig {
        cooldown: Duration::ZERO,
        ..fast_recovery()
    };
    let h = harness(recovery, false).await?;
    assert!(h.manager.ensure_ready().await?.valid);

    // The newest record is now the capture-side placeholder, so a deep
    // refresh can only produce an invalid token
    h.config
        .save_token(NewCredentialRecord::new("unknown", constants::TOKEN_KIND_PORTAL))
        .await?;

    h.orchestrator.report_failure(expired()).await;
    let outcome = h.orchestrator.report_failure(expired()).await;
    assert_eq!(
        outcome,
        FixOutcome::Executed {
            strategy: FixStrategy::DeepRefresh,
            success: false,
        }
    );

    let status = h.orchestrator.status().await;
    assert_eq!(status.attempts, 1);
    assert!(!status.in_progress);
    Ok(())
}

#[tokio::test]
async fn test_started_and_completed_events_share_a_correlation_id() -> Result<()> {
    let h = harness(fast_recovery(), false).await?;
    assert!(h.manager.ensure_ready().await?.valid);

    let mut rx = h.events.subscribe();
    let outcome = h
        .orchestrator
        .report_failure(FailureDetails::with_status("HTTP 406 from portal", 406))
        .await;
    assert!(matches!(outcome, FixOutcome::Executed { .. }));

    let mut autofix_events = Vec::new();
    while autofix_events.len() < 2 {
        match rx.recv().await? {
            event @ (TokenEvent::AutoFixStarted { .. } | TokenEvent::AutoFixCompleted { .. }) => {
                autofix_events.push(event);
            }
            _ => {}
        }
    }

    match (&autofix_events[0], &autofix_events[1]) {
        (
            TokenEvent::AutoFixStarted {
                correlation_id: started_id,
                attempt,
                ..
            },
            TokenEvent::AutoFixCompleted {
                correlation_id: completed_id,
                success,
                strategy,
                ..
            },
        ) => {
            assert_eq!(started_id, completed_id);
            assert_eq!(*attempt, 1);
            assert!(*success);
            assert_eq!(strategy.as_deref(), Some("deep_external_refresh"));
        }
        other => panic!("expected started then completed, got {:?}", other),
    }
    Ok(())
}
