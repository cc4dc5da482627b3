//! HTTP transport for the stash manager
//!
//! Exposes stash listing, triggering and retrieval plus the live buffer
//! over a small REST API.

pub mod http;
pub mod rest;
pub mod state;

pub use http::create_router;
pub use state::AppState;
