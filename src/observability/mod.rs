//! Structured pipeline events
//!
//! Components report progress through an [`EventSink`] instead of writing to
//! a global log. The default [`TracingSink`] forwards events to `tracing`
//! with their context as fields; [`CollectingSink`] keeps them in memory so
//! tests and embedders can inspect what happened.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuideEvent {
    pub level: EventLevel,
    pub component: &'static str,
    pub message: String,
    pub context: Vec<(String, String)>,
}

impl GuideEvent {
    pub fn new<S: Into<String>>(level: EventLevel, component: &'static str, message: S) -> Self {
        Self {
            level,
            component,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn debug<S: Into<String>>(component: &'static str, message: S) -> Self {
        Self::new(EventLevel::Debug, component, message)
    }

    pub fn info<S: Into<String>>(component: &'static str, message: S) -> Self {
        Self::new(EventLevel::Info, component, message)
    }

    pub fn warn<S: Into<String>>(component: &'static str, message: S) -> Self {
        Self::new(EventLevel::Warn, component, message)
    }

    pub fn error<S: Into<String>>(component: &'static str, message: S) -> Self {
        Self::new(EventLevel::Error, component, message)
    }

    /// Attach a key/value pair
    pub fn with<V: fmt::Display>(mut self, key: &str, value: V) -> Self {
        self.context.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn context_string(&self) -> String {
        self.context
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: GuideEvent);
}

pub type SharedEventSink = Arc<dyn EventSink>;

/// Forwards events to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: GuideEvent) {
        let context = event.context_string();
        match event.level {
            EventLevel::Debug => {
                debug!(component = event.component, context = %context, "{}", event.message)
            }
            EventLevel::Info => {
                info!(component = event.component, context = %context, "{}", event.message)
            }
            EventLevel::Warn => {
                warn!(component = event.component, context = %context, "{}", event.message)
            }
            EventLevel::Error => {
                error!(component = event.component, context = %context, "{}", event.message)
            }
        }
    }
}

pub fn tracing_sink() -> SharedEventSink {
    Arc::new(TracingSink)
}

/// Keeps every event in memory and forwards it to `tracing` as well
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<GuideEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<GuideEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events_for(&self, component: &str) -> Vec<GuideEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.component == component)
            .collect()
    }

    pub fn count_matching(&self, component: &str, message_prefix: &str) -> usize {
        self.events_for(component)
            .iter()
            .filter(|e| e.message.starts_with(message_prefix))
            .count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: GuideEvent) {
        TracingSink.emit(event.clone());
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_records_context() {
        let sink = CollectingSink::new();
        sink.emit(
            GuideEvent::warn("fetcher", "retrying window")
                .with("attempt", 2)
                .with("source", "ota"),
        );
        sink.emit(GuideEvent::info("merge", "merged"));

        let events = sink.events_for("fetcher");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, EventLevel::Warn);
        assert_eq!(events[0].get("attempt"), Some("2"));
        assert_eq!(events[0].get("missing"), None);
        assert_eq!(sink.count_matching("merge", "merged"), 1);
        assert_eq!(events[0].context_string(), "attempt=2 source=ota");
    }
}
