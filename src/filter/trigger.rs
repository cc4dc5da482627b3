//! Automatic stash triggers

use crate::types::{Event, EventType};

use super::FilterEngine;

/// Decides whether an accepted event should trigger a stash.
///
/// Evaluated as `(type predicate, if any) AND (rule-set match, if any)`.
#[derive(Debug, Clone)]
pub struct StashTrigger {
    event_type: Option<EventType>,
    filter: Option<FilterEngine>,
}

impl StashTrigger {
    pub fn new(event_type: Option<EventType>, filter: Option<FilterEngine>) -> Self {
        Self { event_type, filter }
    }

    /// Trigger on every Warning event
    pub fn on_warnings() -> Self {
        Self::new(Some(EventType::Warning), None)
    }

    pub fn event_type(&self) -> Option<EventType> {
        self.event_type
    }

    pub async fn should_trigger(&self, event: &Event) -> bool {
        if let Some(wanted) = self.event_type {
            if event.event_type != wanted {
                return false;
            }
        }

        match &self.filter {
            Some(filter) => filter.accept(event).await,
            None => true,
        }
    }
}
