//! Lifecycle events for the portal token service.
//!
//! The manager and the auto-fix orchestrator publish fire-and-forget
//! notifications on an explicit broadcast channel; interested components
//! subscribe instead of relying on any global dispatch mechanism.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by the token lifecycle manager.
#[derive(Debug, Clone, Serialize)]
pub enum TokenEvent {
    /// The cached credential was replaced by a fresh store fetch.
    Refreshed { captured_at: DateTime<Utc> },
    /// First initialization completed.
    Initialized {
        captured_at: Option<DateTime<Utc>>,
        valid: bool,
    },
    /// An auto-fix strategy started executing.
    AutoFixStarted {
        correlation_id: Uuid,
        attempt: u32,
        details: String,
        timestamp: DateTime<Utc>,
    },
    /// An auto-fix strategy finished, successfully or not.
    AutoFixCompleted {
        correlation_id: Uuid,
        success: bool,
        strategy: Option<String>,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl TokenEvent {
    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            TokenEvent::Refreshed { captured_at } => {
                format!("token refreshed (captured at {})", captured_at)
            }
            TokenEvent::Initialized { valid, .. } => {
                format!("token service initialized (valid: {})", valid)
            }
            TokenEvent::AutoFixStarted {
                attempt, details, ..
            } => {
                format!("auto-fix attempt {} started: {}", attempt, details)
            }
            TokenEvent::AutoFixCompleted {
                success,
                strategy,
                error,
                ..
            } => match (*success, strategy, error) {
                (true, Some(strategy), _) => format!("auto-fix completed via {}", strategy),
                (_, strategy, error) => format!(
                    "auto-fix failed (strategy: {}): {}",
                    strategy.as_deref().unwrap_or("none"),
                    error.as_deref().unwrap_or("unknown error")
                ),
            },
        }
    }
}

/// Broadcast bus carrying [`TokenEvent`]s to any number of subscribers.
///
/// Emitting is fire-and-forget: with no subscribers the event is dropped.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TokenEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: TokenEvent) {
        debug!("event: {}", event.description());
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
