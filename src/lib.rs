//! Event Stash
//!
//! Keeps a bounded, deduplicated window of recent cluster events and exports
//! it on demand, or automatically on matching events, as durable stashes.
//!
//! # Features
//!
//! - **Ring Buffer**: Fixed capacity, one slot per event identity
//! - **Filtering**: apiVersion/kind/label rules for buffer admission and triggers
//! - **Stashes**: Background writes, retention, completion callbacks
//! - **Recovery**: Stashes on disk are picked up again after a restart
//! - **HTTP API**: List, trigger and fetch stashes, read the live buffer
//!
//! # Modules
//!
//! - `types`: Core data structures (Event, Stash)
//! - `buffer`: Deduplicating ring buffer
//! - `filter`: Filter rules, object lookups and stash triggers
//! - `stash`: Stash manager, naming and storage
//! - `collector`: Ingestion loop and event sources
//! - `config`: YAML configuration
//! - `api`: HTTP transport
//! - `utils`: Atomic writes and clocks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use event_stash::{FileStashStorage, RingEventBuffer, StashManager, StashManagerConfig};
//! use tracing::Span;
//!
//! #[tokio::main]
//! async fn main() -> event_stash::AppResult<()> {
//!     let config = StashManagerConfig::default();
//!     let buffer = Arc::new(RingEventBuffer::new(100)?);
//!     let storage = FileStashStorage::open("/tmp", &config.prefix, &Span::none())?;
//!     let manager = Arc::new(StashManager::new(config, buffer, Arc::new(storage), Span::none())?);
//!
//!     let name = manager.trigger_stash()?.wait().await?;
//!     println!("wrote {}", name);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod buffer;
pub mod collector;
pub mod config;
pub mod filter;
pub mod stash;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use buffer::{EventBuffer, RingEventBuffer};
pub use collector::{CollectorExit, CollectorReport, EventCollector};
pub use config::Config;
pub use filter::{FilterEngine, FilterRule, ObjectLookup, StashTrigger};
pub use stash::{
    FileStashStorage, PendingStash, StashError, StashManager, StashManagerConfig, StashStorage,
};
pub use types::{AppResult, Event, EventType, Stash, StashStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
