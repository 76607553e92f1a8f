//! Telemetry event sinks.
//!
//! Host operations emit named events (plugin loaded, plugin installed,
//! registry changes) through a [`TelemetrySink`]. Emission is always
//! best-effort; a sink must never fail the operation that produced the
//! event.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// A single telemetry event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event ID.
    pub id: Uuid,
    /// Event name (e.g. `plugin_loaded`).
    pub name: String,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

impl EventRecord {
    /// Create a new event with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            timestamp: Utc::now(),
            fields: serde_json::Map::new(),
        }
    }

    /// Attach a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Read a string field from the payload.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Destination for telemetry events.
///
/// Implementations must be infallible from the caller's point of view;
/// delivery problems are the sink's own concern.
pub trait TelemetrySink: Send + Sync {
    /// Record an event.
    fn emit(&self, event: EventRecord);
}

/// Sink that forwards events to the `tracing` pipeline.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: EventRecord) {
        let payload = Value::Object(event.fields).to_string();
        info!(
            target: "trellis::telemetry",
            event = %event.name,
            event_id = %event.id,
            %payload,
            "telemetry event"
        );
    }
}

/// Sink that discards all events.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: EventRecord) {}
}

/// Sink that buffers events in memory.
///
/// Used by tests to assert on emitted events.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EventRecord>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Names of all recorded events, oldest first.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }
}

impl TelemetrySink for RecordingSink {
    fn emit(&self, event: EventRecord) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}
