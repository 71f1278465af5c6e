//! Declaration portal token lifecycle module
//!
//! Keeps the captured portal bearer credential continuously usable: a cached
//! token with single-flight initialization, an error classifier over the
//! portal's failure messages, and an auto-fix orchestrator that escalates
//! through recovery strategies without hammering the upstream system.

pub mod constants;
pub mod events;
pub mod models;
pub mod recovery;
pub mod store;
pub mod token_manager;

pub use events::{EventBus, TokenEvent};
pub use models::{CredentialRecord, NewCredentialRecord, TokenInfo, TokenStatus};
pub use recovery::{
    AutoFixOrchestrator, AutoFixStatus, CacheConfig, ErrorCategory, ErrorTracker, FailureDetails,
    FixOutcome, FixStrategy, LifecycleConfig, RecoveryConfig, RejectReason, WorkflowClient,
    WorkflowConfig, classify,
};
pub use store::{CredentialStore, SqliteCredentialStore};
pub use token_manager::TokenManager;
