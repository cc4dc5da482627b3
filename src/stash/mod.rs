//! Stash Manager - durable snapshots of the event buffer
//!
//! The manager keeps a hot in-memory index of known stashes on top of cold
//! [`StashStorage`]. Every mutation of the index (name allocation,
//! retention purge, insertion, status transitions) happens under a single
//! lock, and that lock is never held across storage I/O.
//!
//! # Lifecycle
//!
//! ```text
//! trigger_stash ──> Started ──┬──> Complete ──> completion callbacks
//!                             └──> Failed
//! ```

mod error;
mod naming;
mod storage;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Span};

use crate::buffer::EventBuffer;
use crate::types::{Event, Stash, StashStatus};
use crate::utils::{Clock, SystemClock};

pub use error::{StashError, StorageError};
pub use naming::{CollisionPolicy, StashNamer};
pub use storage::{FileStashStorage, StashStorage, STASH_FILE_EXTENSION};

/// Default stash name prefix
pub const DEFAULT_STASH_PREFIX: &str = "event-log-";

/// Error type completion callbacks may return
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Observer invoked once per stash that reaches Complete
pub type CompletionCallback = Arc<dyn Fn(&Stash) -> Result<(), CallbackError> + Send + Sync>;

/// Settings for the stash manager
#[derive(Debug, Clone)]
pub struct StashManagerConfig {
    /// Retention bound on the number of known stashes
    pub max_stashes: usize,
    pub prefix: String,
    pub collision: CollisionPolicy,
}

impl Default for StashManagerConfig {
    fn default() -> Self {
        Self {
            max_stashes: 20,
            prefix: DEFAULT_STASH_PREFIX.to_string(),
            collision: CollisionPolicy::Reject,
        }
    }
}

/// Encode events as the JSON array used by stashes and the live buffer
pub fn encode_events(events: &[Arc<Event>]) -> Result<Vec<u8>, serde_json::Error> {
    let refs: Vec<&Event> = events.iter().map(|e| e.as_ref()).collect();
    serde_json::to_vec(&refs)
}

/// A stash whose payload is being written in the background
///
/// Dropping it does not cancel the write.
#[derive(Debug)]
pub struct PendingStash {
    name: String,
    handle: JoinHandle<Result<(), StashError>>,
}

impl PendingStash {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the terminal status; returns the stash name on Complete
    pub async fn wait(self) -> Result<String, StashError> {
        match self.handle.await {
            Ok(Ok(())) => Ok(self.name),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(StashError::Task(e.to_string())),
        }
    }
}

/// A known stash plus the generation of the trigger that created it
#[derive(Debug, Clone)]
struct IndexEntry {
    stash: Stash,
    generation: u64,
}

/// Hot state guarded by the index lock
#[derive(Debug, Default)]
struct StashIndex {
    stashes: HashMap<String, IndexEntry>,
    /// Base name of the most recent allocation and the highest suffix issued for it
    last_issued: Option<(String, u32)>,
    next_generation: u64,
}

impl StashIndex {
    fn insert(&mut self, stash: Stash) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.stashes
            .insert(stash.name.clone(), IndexEntry { stash, generation });
        generation
    }

    /// Highest suffix issued or present for `base`, if any
    fn highest_suffix(&self, namer: &StashNamer, base: &str) -> Option<u32> {
        let issued = self
            .last_issued
            .as_ref()
            .filter(|(last, _)| last == base)
            .map(|(_, n)| *n);
        let present = self
            .stashes
            .keys()
            .filter_map(|name| namer.suffix_of(base, name))
            .max();
        issued.max(present)
    }
}

/// Orchestrates creation, tracking, retention and retrieval of stashes
pub struct StashManager {
    buffer: Arc<dyn EventBuffer>,
    storage: Arc<dyn StashStorage>,
    clock: Arc<dyn Clock>,
    namer: StashNamer,
    max_stashes: usize,
    index: RwLock<StashIndex>,
    callbacks: RwLock<Vec<CompletionCallback>>,
    span: Span,
}

impl StashManager {
    /// Create a manager and recover stashes already present in storage
    pub fn new(
        config: StashManagerConfig,
        buffer: Arc<dyn EventBuffer>,
        storage: Arc<dyn StashStorage>,
        span: Span,
    ) -> Result<Self, StashError> {
        Self::with_clock(config, buffer, storage, Arc::new(SystemClock), span)
    }

    pub fn with_clock(
        config: StashManagerConfig,
        buffer: Arc<dyn EventBuffer>,
        storage: Arc<dyn StashStorage>,
        clock: Arc<dyn Clock>,
        span: Span,
    ) -> Result<Self, StashError> {
        if config.max_stashes == 0 {
            return Err(StashError::InvalidRetention);
        }

        let manager = Self {
            buffer,
            storage,
            clock,
            namer: StashNamer::new(config.prefix, config.collision),
            max_stashes: config.max_stashes,
            index: RwLock::new(StashIndex::default()),
            callbacks: RwLock::new(Vec::new()),
            span,
        };
        manager.recover();

        Ok(manager)
    }

    /// Register every persisted stash as Complete without rewriting it
    fn recover(&self) {
        let names = match self.storage.list(self.namer.prefix()) {
            Ok(names) => names,
            Err(e) => {
                error!(parent: &self.span, error = %e, "couldn't read stash storage, no existing stashes loaded");
                return;
            }
        };

        let mut index = self.index.write();
        for name in names {
            let created_at = self.namer.created_at(&name);
            index.insert(Stash::recovered(name, created_at));
        }

        if !index.stashes.is_empty() {
            info!(parent: &self.span, recovered = index.stashes.len(), "loaded existing stashes");
        }
    }

    pub fn max_stashes(&self) -> usize {
        self.max_stashes
    }

    /// Point-in-time view of every known stash, oldest first
    pub fn list_stashes(&self) -> Vec<Stash> {
        let mut stashes: Vec<Stash> = self
            .index
            .read()
            .stashes
            .values()
            .map(|entry| entry.stash.clone())
            .collect();
        stashes.sort_by(|a, b| self.namer.sort_key(&a.name).cmp(&self.namer.sort_key(&b.name)));
        stashes
    }

    /// Current status of a stash
    pub fn status(&self, name: &str) -> Option<StashStatus> {
        self.index.read().stashes.get(name).map(|entry| entry.stash.status)
    }

    /// Append a completion observer; observers run in registration order
    pub fn register_completion_callback<F>(&self, callback: F)
    where
        F: Fn(&Stash) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// Start a new stash of the buffer.
    ///
    /// The name is allocated, retention enforced and the stash recorded as
    /// Started before this returns; the buffer snapshot is taken here too.
    /// Encoding and writing continue on the blocking pool of the current
    /// tokio runtime; calling this outside a runtime fails with `NoRuntime`.
    pub fn trigger_stash(self: &Arc<Self>) -> Result<PendingStash, StashError> {
        let runtime = Handle::try_current().map_err(|_| StashError::NoRuntime)?;
        let now = self.clock.now();

        let (name, generation, purged) = {
            let mut index = self.index.write();
            let base = self.namer.base_name(&now);
            let highest = index.highest_suffix(&self.namer, &base);
            let (name, suffix) = self.namer.allocate(&now, highest).map_err(|taken| {
                error!(parent: &self.span, stash = %taken, "stash creation failed, name already exists");
                StashError::AlreadyExists(taken)
            })?;
            index.last_issued = Some((base, suffix));

            let purged = self.purge_oldest(&mut index.stashes, self.max_stashes - 1);
            let generation = index.insert(Stash::started(name.clone(), now));
            (name, generation, purged)
        };

        info!(parent: &self.span, stash = %name, "creating event stash");
        let snapshot = self.buffer.snapshot();

        let manager = Arc::clone(self);
        let task_runtime = runtime.clone();
        let task_name = name.clone();
        let handle = runtime.spawn_blocking(move || {
            manager.persist(&task_runtime, &task_name, generation, &purged, &snapshot)
        });

        Ok(PendingStash { name, handle })
    }

    /// Trigger a stash without waiting for it; failures are only logged
    pub fn trigger_detached(self: &Arc<Self>) -> Option<String> {
        match self.trigger_stash() {
            Ok(pending) => Some(pending.name().to_string()),
            Err(e) => {
                warn!(parent: &self.span, error = %e, "automatic stash not started");
                None
            }
        }
    }

    /// Drop the oldest stashes from the index until `keep` remain.
    ///
    /// Returns the dropped names; their payloads are deleted later, off the lock.
    fn purge_oldest(&self, index: &mut HashMap<String, IndexEntry>, keep: usize) -> Vec<String> {
        if index.len() <= keep {
            return Vec::new();
        }

        let mut names: Vec<String> = index.keys().cloned().collect();
        names.sort_by(|a, b| self.namer.sort_key(a).cmp(&self.namer.sort_key(b)));
        names.truncate(index.len() - keep);

        for name in &names {
            info!(parent: &self.span, stash = %name, "removing old stash");
            index.remove(name);
        }

        names
    }

    fn persist(
        &self,
        runtime: &Handle,
        name: &str,
        generation: u64,
        purged: &[String],
        snapshot: &[Arc<Event>],
    ) -> Result<(), StashError> {
        for old in purged {
            if let Err(e) = self.storage.delete(old) {
                warn!(parent: &self.span, stash = %old, error = %e, "failed to delete old stash");
            }
        }

        let result = encode_events(snapshot)
            .map_err(StashError::from)
            .and_then(|payload| self.storage.write(name, &payload).map_err(StashError::from));

        let status = match result {
            Ok(()) => StashStatus::Complete,
            Err(_) => StashStatus::Failed,
        };

        // Only the trigger that created the record may finish it
        let (finished, name_reused) = {
            let mut index = self.index.write();
            match index.stashes.get_mut(name) {
                Some(entry) if entry.generation == generation => {
                    entry.stash.status = status;
                    (Some(entry.stash.clone()), false)
                }
                Some(_) => (None, true),
                None => (None, false),
            }
        };

        match (&result, finished) {
            (Err(e), _) => {
                error!(parent: &self.span, stash = %name, error = %e, "error writing stash");
            }
            (Ok(()), Some(stash)) => {
                info!(parent: &self.span, stash = %name, events = snapshot.len(), "stash complete");
                self.notify_completion(runtime, stash);
            }
            (Ok(()), None) if name_reused => {
                warn!(parent: &self.span, stash = %name, "stash purged before completion, name now held by a newer stash");
            }
            (Ok(()), None) => {
                warn!(parent: &self.span, stash = %name, "stash purged before completion, discarding payload");
                if let Err(e) = self.storage.delete(name) {
                    warn!(parent: &self.span, stash = %name, error = %e, "failed to delete purged stash");
                }
            }
        }

        result
    }

    /// Run completion callbacks on a background task, each one isolated
    fn notify_completion(&self, runtime: &Handle, stash: Stash) {
        let callbacks: Vec<CompletionCallback> = self.callbacks.read().clone();
        if callbacks.is_empty() {
            return;
        }

        info!(parent: &self.span, stash = %stash.name, callbacks = callbacks.len(), "executing completion callbacks");
        let span = self.span.clone();
        runtime.spawn_blocking(move || {
            for (position, callback) in callbacks.iter().enumerate() {
                match panic::catch_unwind(AssertUnwindSafe(|| callback(&stash))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(parent: &span, stash = %stash.name, position, error = %e, "completion callback failed");
                    }
                    Err(_) => {
                        error!(parent: &span, stash = %stash.name, position, "completion callback panicked");
                    }
                }
            }
        });
    }

    /// Fetch the payload of a completed stash
    pub async fn get_stash(&self, name: &str) -> Result<Vec<u8>, StashError> {
        match self.status(name) {
            None | Some(StashStatus::Failed) => return Err(StashError::NotFound(name.to_string())),
            Some(StashStatus::Started) => return Err(StashError::InProgress(name.to_string())),
            Some(StashStatus::Complete) => {}
        }

        let storage = Arc::clone(&self.storage);
        let owned = name.to_string();
        let read = tokio::task::spawn_blocking(move || storage.read(&owned))
            .await
            .map_err(|e| StashError::Task(e.to_string()))?;

        match read {
            Ok(payload) => Ok(payload),
            // Purged between the status check and the read
            Err(StorageError::NotFound(_)) => Err(StashError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Encode the buffer's current contents, bypassing storage
    pub fn live_buffer(&self) -> Result<Vec<u8>, StashError> {
        let snapshot = self.buffer.snapshot();
        encode_events(&snapshot).map_err(|e| {
            error!(parent: &self.span, error = %e, "failed to encode live buffer");
            StashError::from(e)
        })
    }
}

impl std::fmt::Debug for StashManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StashManager")
            .field("namer", &self.namer)
            .field("max_stashes", &self.max_stashes)
            .field("stashes", &self.index.read().stashes.len())
            .finish_non_exhaustive()
    }
}
