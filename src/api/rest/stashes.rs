//! Stash endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::stash_error_response;
use crate::api::state::AppState;
use crate::types::Stash;

fn json_payload(payload: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], payload).into_response()
}

/// GET /stashes - Known stashes with their status
pub async fn list_stashes(State(state): State<Arc<AppState>>) -> Json<Vec<Stash>> {
    Json(state.manager.list_stashes())
}

/// POST /stashes - Stash the buffer and wait for the write to finish
///
/// Responds 201 with the stash name as body.
pub async fn create_stash(State(state): State<Arc<AppState>>) -> Response {
    let pending = match state.manager.trigger_stash() {
        Ok(pending) => pending,
        Err(e) => return stash_error_response(&e),
    };

    match pending.wait().await {
        Ok(name) => (StatusCode::CREATED, name).into_response(),
        Err(e) => stash_error_response(&e),
    }
}

/// GET /stashes/:name - Payload of a completed stash
pub async fn get_stash(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.manager.get_stash(&name).await {
        Ok(payload) => json_payload(payload),
        Err(e) => stash_error_response(&e),
    }
}

/// GET /buffer - Current buffer contents
pub async fn get_buffer(State(state): State<Arc<AppState>>) -> Response {
    match state.manager.live_buffer() {
        Ok(payload) => json_payload(payload),
        Err(e) => stash_error_response(&e),
    }
}
