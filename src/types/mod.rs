//! Data types shared across the collector
//!
//! This module contains the event record and the stash lifecycle types.

mod event;
mod stash;

pub use event::{Event, EventMeta, EventSource, EventType, InvolvedObject};
pub use stash::{Stash, StashStatus};

/// Result type for the binary entry point
pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
