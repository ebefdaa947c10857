//! Event bus for cpfm using tokio::broadcast
//!
//! The write path publishes one event per stored row; the cache
//! invalidator subscribes and drops the entries the row affects.

use tokio::sync::broadcast;

/// Events emitted by the write path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataEvent {
    /// A telemetry heartbeat was inserted or updated
    ///
    /// `previous_plugin_name` is set when the site was stored under a
    /// different plugin before this write.
    TelemetryUpserted {
        site_id: String,
        plugin_name: String,
        previous_plugin_name: Option<String>,
    },
    /// A deactivation feedback row was appended
    FeedbackRecorded {
        site_id: Option<String>,
        plugin_name: String,
    },
    /// Bulk import finished
    ImportCompleted { rows: usize },
}

impl DataEvent {
    /// Plugin whose aggregates the event invalidates, if any
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            DataEvent::TelemetryUpserted { plugin_name, .. }
            | DataEvent::FeedbackRecorded { plugin_name, .. } => Some(plugin_name),
            DataEvent::ImportCompleted { .. } => None,
        }
    }

    /// Plugin a site moved away from, whose aggregates also go stale
    pub fn previous_plugin_name(&self) -> Option<&str> {
        match self {
            DataEvent::TelemetryUpserted {
                previous_plugin_name,
                ..
            } => previous_plugin_name.as_deref(),
            _ => None,
        }
    }
}

/// Event bus for broadcasting data events
///
/// Uses tokio::broadcast for multi-consumer support. Publishing never
/// blocks and never fails, so the synchronous store can publish directly.
pub struct EventBus {
    sender: broadcast::Sender<DataEvent>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create with default capacity (256 events)
    pub fn default_capacity() -> Self {
        Self::new(256)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DataEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::default_capacity()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
