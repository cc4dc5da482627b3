//! REST API module for HTTP endpoints
//!
//! - `GET /stashes` - Known stashes, oldest first
//! - `POST /stashes` - Create a stash of the buffer
//! - `GET /stashes/:name` - Payload of a completed stash
//! - `GET /buffer` - Live buffer contents

pub mod stashes;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::stash::StashError;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "NOT_FOUND".to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>, code: &str) -> Self {
        Self {
            error: message.into(),
            code: code.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "INTERNAL_ERROR".to_string(),
        }
    }
}

impl From<&StashError> for ApiError {
    fn from(err: &StashError) -> Self {
        match err {
            StashError::NotFound(_) => ApiError::not_found(err.to_string()),
            StashError::AlreadyExists(_) => ApiError::conflict(err.to_string(), "ALREADY_EXISTS"),
            StashError::InProgress(_) => ApiError::conflict(err.to_string(), "IN_PROGRESS"),
            _ => ApiError::internal(err.to_string()),
        }
    }
}

/// Map a stash error onto a status code and JSON body
pub fn stash_error_response(err: &StashError) -> Response {
    let status = match err {
        StashError::NotFound(_) => StatusCode::NOT_FOUND,
        StashError::AlreadyExists(_) | StashError::InProgress(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError::from(err))).into_response()
}
