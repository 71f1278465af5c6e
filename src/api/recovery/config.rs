//! Lifecycle configuration with builder pattern
//!
//! Provides a unified configuration for the token cache, the auto-fix
//! orchestrator, and the external recovery workflow with sane defaults.

use std::time::Duration;

/// Global configuration for the token lifecycle manager
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub cache: CacheConfig,
    pub recovery: RecoveryConfig,
    pub workflow: WorkflowConfig,
}

/// Token cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a fetched credential stays served without revalidation.
    /// Spans the credential's real-world validity with margin while still
    /// forcing periodic store round-trips.
    pub cache_ttl: Duration,
    /// Window after a successful fetch during which `ensure_ready` skips
    /// every check and returns the cached value directly.
    pub recent_window: Duration,
    /// Upper bound on one store round-trip; a stalled store degrades to the
    /// invalid fallback instead of wedging callers.
    pub fetch_timeout: Duration,
}

/// Auto-fix orchestrator configuration
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub enabled: bool,
    /// Strategy executions allowed before an explicit operator reset
    pub max_attempts: u32,
    /// Minimum gap between two strategy executions
    pub cooldown: Duration,
    /// Rolling window after which stale error evidence is discarded
    pub quiet_period: Duration,
    /// Consecutive failures required before a strategy may run
    pub consecutive_threshold: u32,
    /// Per-category count at which deep strategies are selected
    pub pattern_threshold: u32,
    /// Errors within the quiet window that trip the unconditional
    /// cache-clear circuit breaker
    pub breaker_threshold: u32,
    /// Pause between cache clear and refetch in the deep refresh strategy
    pub deep_refresh_delay: Duration,
    /// Settle time after triggering the external recovery workflow
    pub settle_delay: Duration,
}

/// External recovery-workflow endpoint configuration
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Workflow-automation endpoint; empty disables the external call
    pub endpoint: String,
    pub device_id: String,
    pub profile_id: String,
    pub workflow_id: String,
    pub soft_id: String,
    pub close_browser: bool,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            recovery: RecoveryConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(12 * 60 * 60),
            recent_window: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            cooldown: Duration::from_secs(60),
            quiet_period: Duration::from_secs(120),
            consecutive_threshold: 2,
            pattern_threshold: 2,
            breaker_threshold: 3,
            deep_refresh_delay: Duration::from_millis(500),
            settle_delay: Duration::from_secs(5),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            device_id: String::new(),
            profile_id: String::new(),
            workflow_id: String::new(),
            soft_id: String::new(),
            close_browser: true,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl WorkflowConfig {
    /// Load the workflow settings from the environment (and `.env` if present)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("PORTAL_WORKFLOW_URL") {
            config.endpoint = endpoint;
        }
        if let Ok(device_id) = std::env::var("PORTAL_DEVICE_ID") {
            config.device_id = device_id;
        }
        if let Ok(profile_id) = std::env::var("PORTAL_PROFILE_ID") {
            config.profile_id = profile_id;
        }
        if let Ok(workflow_id) = std::env::var("PORTAL_WORKFLOW_ID") {
            config.workflow_id = workflow_id;
        }
        if let Ok(soft_id) = std::env::var("PORTAL_SOFT_ID") {
            config.soft_id = soft_id;
        }
        config
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
    }
}

impl LifecycleConfig {
    /// Create a new builder for LifecycleConfig
    pub fn builder() -> LifecycleConfigBuilder {
        LifecycleConfigBuilder::new()
    }

    /// Defaults with workflow settings taken from the environment
    pub fn from_env() -> Self {
        Self {
            workflow: WorkflowConfig::from_env(),
            ..Self::default()
        }
    }

    /// Disable auto-correction entirely (for testing)
    pub fn disabled() -> Self {
        Self {
            recovery: RecoveryConfig {
                enabled: false,
                ..RecoveryConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Builder for LifecycleConfig
#[derive(Debug)]
pub struct LifecycleConfigBuilder {
    config: LifecycleConfig,
}

impl LifecycleConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LifecycleConfig::default(),
        }
    }

    /// Configure the token cache
    pub fn cache_config(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    /// Set the cache time-to-live
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.cache_ttl = ttl;
        self
    }

    /// Set the recently-healthy fast-path window
    pub fn recent_window(mut self, window: Duration) -> Self {
        self.config.cache.recent_window = window;
        self
    }

    /// Set the store round-trip bound
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.cache.fetch_timeout = timeout;
        self
    }

    /// Configure the auto-fix orchestrator
    pub fn recovery_config(mut self, recovery: RecoveryConfig) -> Self {
        self.config.recovery = recovery;
        self
    }

    /// Enable/disable auto-correction
    pub fn enable_auto_fix(mut self, enabled: bool) -> Self {
        self.config.recovery.enabled = enabled;
        self
    }

    /// Set the strategy attempt ceiling
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.recovery.max_attempts = attempts;
        self
    }

    /// Set the cooldown between strategy executions
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.recovery.cooldown = cooldown;
        self
    }

    /// Set the evidence quiet period
    pub fn quiet_period(mut self, quiet_period: Duration) -> Self {
        self.config.recovery.quiet_period = quiet_period;
        self
    }

    /// Configure the external recovery workflow
    pub fn workflow_config(mut self, workflow: WorkflowConfig) -> Self {
        self.config.workflow = workflow;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> LifecycleConfig {
        self.config
    }
}

impl Default for LifecycleConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
