//! Shared application state for HTTP handlers

use std::sync::Arc;

use crate::stash::StashManager;

pub struct AppState {
    pub manager: Arc<StashManager>,
}

impl AppState {
    pub fn new(manager: Arc<StashManager>) -> Self {
        Self { manager }
    }
}
