//! Cluster event records
//!
//! Mirrors the shape of a core/v1 `Event` as delivered by the cluster's
//! event stream. Only the fields the collector reasons about are modelled;
//! everything else is carried through untouched so that a stash re-emits
//! exactly the object that was received.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity of an event as reported by the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventType {
    #[default]
    Normal,
    Warning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Normal" => Ok(EventType::Normal),
            "Warning" => Ok(EventType::Warning),
            other => Err(format!("unknown event type '{}'", other)),
        }
    }
}

/// Object metadata of the event record itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Unique identity used for deduplication
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Fields not modelled above (resourceVersion, creationTimestamp, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference to the cluster resource an event is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InvolvedObject {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Component that reported the event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EventSource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
}

impl EventSource {
    fn is_empty(&self) -> bool {
        self.component.is_empty() && self.host.is_empty()
    }
}

/// An immutable cluster event record
///
/// Events are never mutated once ingested; the buffer shares them as
/// `Arc<Event>` so snapshots only copy pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub metadata: EventMeta,
    #[serde(default)]
    pub involved_object: InvolvedObject,
    #[serde(rename = "type", default)]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "EventSource::is_empty")]
    pub source: EventSource,
    /// Remaining top-level fields (apiVersion, kind, firstTimestamp, eventTime, ...).
    /// Timestamps stay here so explicit nulls are re-emitted as received.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Create a minimal event, mostly useful for tests and synthetic records
    pub fn new(uid: impl Into<String>, event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            metadata: EventMeta {
                uid: uid.into(),
                ..Default::default()
            },
            involved_object: InvolvedObject::default(),
            event_type,
            reason: String::new(),
            message: message.into(),
            count: None,
            source: EventSource::default(),
            extra: Map::new(),
        }
    }

    /// Builder-style setter for the involved object
    pub fn with_involved_object(
        mut self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Self {
        self.involved_object = InvolvedObject {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            extra: Map::new(),
        };
        self
    }

    /// Identity used for deduplication
    pub fn uid(&self) -> &str {
        &self.metadata.uid
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Namespace to use when looking up the involved object
    pub fn involved_namespace(&self) -> &str {
        if self.involved_object.namespace.is_empty() {
            &self.metadata.namespace
        } else {
            &self.involved_object.namespace
        }
    }
}
