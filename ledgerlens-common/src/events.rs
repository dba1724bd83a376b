//! Event types for the LedgerLens event system
//!
//! Provides pipeline event definitions and the EventBus shared by all
//! LedgerLens components.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline events
///
/// Broadcast via EventBus; serializable so observers can forward them as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Analysis request moved to a new state
    StateChanged {
        request_id: Uuid,
        tenant_id: String,
        old_state: String,
        new_state: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Tenant reference data reloaded from the backing store
    ReferenceDataReloaded {
        tenant_id: String,
        accounts: usize,
        journals: usize,
        parties: usize,
        templates: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An external call failed and will be retried after a backoff
    CallRetried {
        operation: String,
        attempt: u32,
        category: String,
        delay_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Analysis request reached a terminal state
    AnalysisFinished {
        request_id: Uuid,
        tenant_id: String,
        status: String,
        duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for pipeline events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
