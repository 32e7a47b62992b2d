use std::{collections::VecDeque, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Generated,
    GenerationFailed,
    Recommended,
    AddToCart,
    ChatInteraction,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Generated => "Outfit Generated",
            Self::GenerationFailed => "Outfit Generation Failed",
            Self::Recommended => "Recommendations Shown",
            Self::AddToCart => "Add to Cart",
            Self::ChatInteraction => "Chat Interaction",
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub session_id: String,
    pub outfit_id: Option<String>,
    pub action: ActionKind,
    pub details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(session_id: &str, outfit_id: Option<&str>, action: ActionKind, details: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            outfit_id: outfit_id.map(str::to_string),
            action,
            details,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")] Unavailable(String),
}

/// Destination for audit events. Implementations must not block for long:
/// events are written on the request path.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), SinkError>;
}

/// Writes each event as a structured log line. Stand-in for the interaction
/// table a real deployment would insert into.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &AuditEvent) -> Result<(), SinkError> {
        info!(
            session_id = %event.session_id,
            outfit_id = event.outfit_id.as_deref().unwrap_or("-"),
            event_id = %event.event_id,
            details = %event.details,
            "🗄️ DB Log: Logged {} for user {}", event.action, event.session_id
        );
        Ok(())
    }
}

/// Bounded in-memory ring of the most recent events.
pub struct MemorySink {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))) }
    }

    pub fn for_session(&self, session_id: &str) -> Vec<AuditEvent> {
        self.events.lock().iter().filter(|e| e.session_id == session_id).cloned().collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &AuditEvent) -> Result<(), SinkError> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut events = self.events.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}

/// Fans events out to every sink. Sink failures are logged and dropped so
/// they never fail the action that produced the event.
#[derive(Clone, Default)]
pub struct AuditLog {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn emit(&self, event: &AuditEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.record(event) {
                warn!("⚠️ Dropping audit event {} ({}): {}", event.event_id, event.action, e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) struct FailingSink;

#[cfg(test)]
impl EventSink for FailingSink {
    fn record(&self, _event: &AuditEvent) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("database offline".into()))
    }
}
