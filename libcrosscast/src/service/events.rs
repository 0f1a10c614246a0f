//! Event system for progress tracking
//!
//! In-process broadcast bus distributing lifecycle events to subscribers
//! without blocking the emitting operation. Events are a closed enum with
//! typed payloads; there are no string-keyed hooks to register.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Platform, PlatformResult};

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

/// Broadcast bus for lifecycle events
///
/// Emitting never blocks: with no subscribers the event is dropped, and a
/// lagging subscriber loses oldest events first.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: Event) {
        // send() errs when nobody is listening, which is fine
        let _ = self.sender.send(event);
    }

    /// Number of active subscribers; for diagnostics only
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Lifecycle events emitted by the service and scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A post was queued for future delivery
    ScheduleCreated {
        post_id: String,
        scheduled_at: DateTime<Utc>,
    },

    /// A queued post was modified while still scheduled
    ScheduleUpdated {
        post_id: String,
        scheduled_at: DateTime<Utc>,
    },

    /// A queued post was cancelled before execution
    ScheduleCancelled { post_id: String },

    /// A scheduled execution attempt began
    ExecutionStarted {
        post_id: String,
        platforms: Vec<Platform>,
        attempt: u32,
    },

    /// A scheduled post reached its terminal success state
    ExecutionCompleted {
        post_id: String,
        results: Vec<PlatformResult>,
    },

    /// A scheduled post reached its terminal failure state
    ExecutionFailed {
        post_id: String,
        error: String,
        attempts: u32,
    },

    /// A failed attempt was rescheduled with backoff
    RetryScheduled {
        post_id: String,
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },

    /// An immediate posting operation started
    PostingStarted {
        post_id: String,
        platforms: Vec<Platform>,
    },

    /// An immediate posting operation finished
    PostingCompleted {
        post_id: String,
        results: Vec<PlatformResult>,
    },

    /// An immediate posting operation failed on every platform
    PostingFailed { post_id: String, error: String },
}
