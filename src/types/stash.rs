//! Stash records and their lifecycle status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a stash: `Started -> {Complete, Failed}`, both terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StashStatus {
    Started,
    Complete,
    Failed,
}

impl StashStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StashStatus::Started)
    }
}

impl std::fmt::Display for StashStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StashStatus::Started => write!(f, "Started"),
            StashStatus::Complete => write!(f, "Complete"),
            StashStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// A durable, point-in-time export of the event buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stash {
    pub name: String,
    pub status: StashStatus,
    /// None for recovered stashes whose name does not carry a timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Stash {
    pub fn started(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: StashStatus::Started,
            created_at: Some(created_at),
        }
    }

    /// A stash found in storage at startup
    pub fn recovered(name: impl Into<String>, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            status: StashStatus::Complete,
            created_at,
        }
    }
}
