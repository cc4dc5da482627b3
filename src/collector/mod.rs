//! Event Collector - the ingestion loop
//!
//! Pulls raw objects from an event source, decodes them, runs them through
//! the filter engine into the buffer and fires the action callback when the
//! stash trigger matches. The loop ends when the source closes or fails, or
//! when the shutdown future resolves. Buffer state is untouched by a
//! termination, so a new `run` with a fresh source can pick up where the
//! previous producer left off.

pub mod source;

use std::future::Future;
use std::sync::Arc;

use futures::Stream;
use serde_json::Value;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn, Span};

use crate::buffer::EventBuffer;
use crate::filter::{FilterEngine, StashTrigger};
use crate::types::Event;

pub use source::{SourceError, SourceItem};

/// Action taken for an accepted event that matched the stash trigger
pub type ActionCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Why the ingestion loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorExit {
    SourceClosed,
    SourceFailed(String),
    Shutdown,
}

/// Counters for one run of the ingestion loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub received: usize,
    pub added: usize,
    pub filtered: usize,
    pub skipped: usize,
    pub triggered: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorReport {
    pub exit: CollectorExit,
    pub stats: CollectorStats,
}

/// Watches an event source, filters events into the buffer and takes actions
pub struct EventCollector {
    buffer: Arc<dyn EventBuffer>,
    filter: FilterEngine,
    trigger: Option<StashTrigger>,
    action: Option<ActionCallback>,
    span: Span,
}

impl EventCollector {
    pub fn new(buffer: Arc<dyn EventBuffer>, filter: FilterEngine, span: Span) -> Self {
        Self {
            buffer,
            filter,
            trigger: None,
            action: None,
            span,
        }
    }

    /// Fire `action` for accepted events matching `trigger`
    pub fn with_action<F>(mut self, trigger: StashTrigger, action: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.trigger = Some(trigger);
        self.action = Some(Arc::new(action));
        self
    }

    pub fn buffer(&self) -> &Arc<dyn EventBuffer> {
        &self.buffer
    }

    /// Consume `source` until it ends or `shutdown` resolves
    pub async fn run<S, F>(&self, source: S, shutdown: F) -> CollectorReport
    where
        S: Stream<Item = SourceItem>,
        F: Future<Output = ()>,
    {
        tokio::pin!(source);
        tokio::pin!(shutdown);

        info!(parent: &self.span, "starting event collection");
        let mut stats = CollectorStats::default();

        let exit = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!(parent: &self.span, "event collection stopped");
                    break CollectorExit::Shutdown;
                }
                item = source.next() => match item {
                    None => {
                        warn!(parent: &self.span, "event stream closed");
                        break CollectorExit::SourceClosed;
                    }
                    Some(Err(e)) if e.is_fatal() => {
                        error!(parent: &self.span, error = %e, "event stream failed");
                        break CollectorExit::SourceFailed(e.to_string());
                    }
                    Some(Err(e)) => {
                        warn!(parent: &self.span, error = %e, "skipping malformed object");
                        stats.received += 1;
                        stats.skipped += 1;
                    }
                    Some(Ok(value)) => {
                        stats.received += 1;
                        self.handle_object(value, &mut stats).await;
                    }
                },
            }
        };

        info!(
            parent: &self.span,
            received = stats.received,
            added = stats.added,
            filtered = stats.filtered,
            skipped = stats.skipped,
            triggered = stats.triggered,
            "event collection finished"
        );

        CollectorReport { exit, stats }
    }

    async fn handle_object(&self, value: Value, stats: &mut CollectorStats) {
        let event = match decode_event(value) {
            Ok(event) => event,
            Err(reason) => {
                warn!(parent: &self.span, %reason, "skipping unexpected object");
                stats.skipped += 1;
                return;
            }
        };

        if !self.filter.accept(&event).await {
            debug!(parent: &self.span, resource = %event.name(), "event filtered out");
            stats.filtered += 1;
            return;
        }

        let event = Arc::new(event);
        self.buffer.add(Arc::clone(&event));
        stats.added += 1;
        info!(parent: &self.span, resource = %event.name(), msg = %event.message, "event added");

        if let (Some(trigger), Some(action)) = (&self.trigger, &self.action) {
            if trigger.should_trigger(&event).await {
                stats.triggered += 1;
                action(&event);
            }
        }
    }
}

/// Decode a raw object, unwrapping watch envelopes (`{"type", "object"}`)
pub fn decode_event(value: Value) -> Result<Event, String> {
    let value = match value {
        Value::Object(mut map) if map.contains_key("object") && map.get("type").map_or(false, Value::is_string) => {
            map.remove("object").unwrap_or(Value::Null)
        }
        other => other,
    };

    if !value.is_object() {
        return Err("type mismatch: not an object".to_string());
    }

    if let Some(kind) = value.get("kind").and_then(Value::as_str) {
        if kind != "Event" {
            return Err(format!("type mismatch: kind {}", kind));
        }
    }

    serde_json::from_value(value).map_err(|e| format!("invalid event: {}", e))
}
