//! Portal token cache with single-flight initialization
//!
//! Callers ask [`TokenManager::ensure_ready`] for a usable credential from
//! arbitrarily many tasks at once. A cached entry is served without touching
//! the store; the first readiness check is deduplicated into one store
//! round-trip that every concurrent caller awaits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow, bail};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::events::{EventBus, TokenEvent};
use super::models::{TokenInfo, TokenStatus};
use super::recovery::CacheConfig;
use super::store::CredentialStore;

type InitResult = std::result::Result<TokenInfo, Arc<anyhow::Error>>;
type InitFlight = Shared<BoxFuture<'static, InitResult>>;

/// Cache entry plus the bookkeeping around it. Owned exclusively by the
/// manager; all mutation goes through the operations below.
#[derive(Default)]
struct CacheState {
    token: Option<TokenInfo>,
    expires_at: Option<Instant>,
    last_success: Option<Instant>,
    initialized: bool,
}

impl CacheState {
    /// Fast path: cached, unexpired, and fetched recently enough that no
    /// revalidation is worth doing.
    fn fresh_token(&self, recent_window: std::time::Duration) -> Option<TokenInfo> {
        let token = self.token.as_ref()?;
        let expires_at = self.expires_at?;
        let recently_healthy = self
            .last_success
            .is_some_and(|at| at.elapsed() <= recent_window);
        (Instant::now() < expires_at && recently_healthy).then(|| token.clone())
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() >= expires_at,
            None => true,
        }
    }
}

struct ManagerInner {
    store: Arc<dyn CredentialStore>,
    events: EventBus,
    config: CacheConfig,
    kind: String,
    cache: RwLock<CacheState>,
    init_flight: Mutex<Option<(u64, InitFlight)>>,
    flight_seq: AtomicU64,
}

/// Token lifecycle manager for one credential kind.
///
/// Cheap to clone; clones share the same cache and single-flight state.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<ManagerInner>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        kind: impl Into<String>,
        config: CacheConfig,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                events,
                config,
                kind: kind.into(),
                cache: RwLock::new(CacheState::default()),
                init_flight: Mutex::new(None),
                flight_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Get a usable credential, fetching from the store only when needed.
    ///
    /// Store failures and missing records come back as the invalid fallback
    /// token, never as an error; the one exception is the very first
    /// initialization, whose failure propagates to every waiting caller.
    pub async fn ensure_ready(&self) -> Result<TokenInfo> {
        {
            let state = self.inner.cache.read().await;
            if let Some(token) = state.fresh_token(self.inner.config.recent_window) {
                debug!("Serving cached portal token (fast path)");
                return Ok(token);
            }
        }

        if !self.is_initialized().await {
            return self.initialize().await;
        }

        let cached = {
            let state = self.inner.cache.read().await;
            if state.is_expired() {
                None
            } else {
                state.token.clone()
            }
        };

        match cached {
            Some(token) => Ok(token),
            None => Ok(self.inner.fetch_and_cache().await),
        }
    }

    /// Wipe the cache entry and the initialized flag. Any in-flight
    /// initialization is discarded so the next call starts fresh.
    pub async fn clear(&self) {
        {
            let mut state = self.inner.cache.write().await;
            *state = CacheState::default();
        }
        {
            let mut flight = self.inner.init_flight.lock().await;
            *flight = None;
        }
        info!("Portal token cache cleared for kind: {}", self.inner.kind);
    }

    /// Clear followed by an unconditional store fetch.
    pub async fn force_refresh(&self) -> TokenInfo {
        self.clear().await;
        self.inner.fetch_and_cache().await
    }

    /// Current cache entry without triggering any fetch.
    pub async fn peek(&self) -> Option<TokenInfo> {
        self.inner.cache.read().await.token.clone()
    }

    /// The bus this manager publishes lifecycle events on.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.cache.read().await.initialized
    }

    /// True when an initialized, unexpired credential is cached.
    pub async fn is_ready(&self) -> bool {
        let state = self.inner.cache.read().await;
        state.initialized && state.token.is_some() && !state.is_expired()
    }

    /// Operator-facing snapshot of the cache.
    pub async fn status(&self) -> TokenStatus {
        let state = self.inner.cache.read().await;
        TokenStatus {
            initialized: state.initialized,
            cached: state.token.is_some(),
            expired: state.is_expired(),
            valid: state.token.as_ref().is_some_and(|t| t.valid),
        }
    }

    /// First readiness check, deduplicated across concurrent callers.
    ///
    /// All callers that arrive while a flight is pending await the same
    /// shared future; on completion the flight slot is cleared so a later
    /// call can start a new attempt.
    async fn initialize(&self) -> Result<TokenInfo> {
        let (flight_id, flight) = {
            let mut slot = self.inner.init_flight.lock().await;
            match slot.as_ref() {
                Some((id, flight)) => (*id, flight.clone()),
                None => {
                    let id = self.inner.flight_seq.fetch_add(1, Ordering::Relaxed);
                    let flight = ManagerInner::run_initialize(Arc::clone(&self.inner))
                        .boxed()
                        .shared();
                    *slot = Some((id, flight.clone()));
                    (id, flight)
                }
            }
        };

        let result = flight.await;

        {
            let mut slot = self.inner.init_flight.lock().await;
            if slot.as_ref().is_some_and(|(id, _)| *id == flight_id) {
                *slot = None;
            }
        }

        result.map_err(|err| anyhow!("Token service initialization failed: {:#}", err))
    }
}

impl ManagerInner {
    async fn run_initialize(inner: Arc<ManagerInner>) -> InitResult {
        info!("Initializing token service for kind: {}", inner.kind);

        match inner.fetch_token().await {
            Ok(info) => {
                inner.cache_token(&info).await;
                inner.events.emit(TokenEvent::Initialized {
                    captured_at: Some(info.captured_at),
                    valid: info.valid,
                });
                Ok(info)
            }
            Err(err) => {
                warn!("Token service initialization failed: {:#}", err);
                Err(Arc::new(err))
            }
        }
    }

    /// Fetch-and-replace; failures degrade to the uncached invalid fallback.
    async fn fetch_and_cache(&self) -> TokenInfo {
        match self.fetch_token().await {
            Ok(info) => {
                self.cache_token(&info).await;
                self.events.emit(TokenEvent::Refreshed {
                    captured_at: info.captured_at,
                });
                info
            }
            Err(err) => {
                warn!("Credential fetch failed, serving invalid fallback: {:#}", err);
                TokenInfo::fallback()
            }
        }
    }

    async fn fetch_token(&self) -> Result<TokenInfo> {
        let record = tokio::time::timeout(
            self.config.fetch_timeout,
            self.store.fetch_latest(&self.kind),
        )
        .await
        .context("Credential store lookup timed out")?
        .context("Credential store lookup failed")?
        .with_context(|| format!("No credential record found for kind '{}'", self.kind))?;

        let info = TokenInfo::from_record(&record);
        if !info.valid {
            bail!(
                "Stored credential for kind '{}' is empty or a placeholder",
                self.kind
            );
        }

        Ok(info)
    }

    async fn cache_token(&self, info: &TokenInfo) {
        let mut state = self.cache.write().await;
        let now = Instant::now();
        state.token = Some(info.clone());
        state.expires_at = Some(now + self.config.cache_ttl);
        state.last_success = Some(now);
        state.initialized = true;
        debug!(
            "Cached portal token for kind '{}' (captured at {})",
            self.kind, info.captured_at
        );
    }
}
