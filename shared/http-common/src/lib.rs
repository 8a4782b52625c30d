//! Shared HTTP response envelopes for the todo API workspace.
//!
//! Every endpoint answers with the same JSON shape: successful responses
//! carry `{status, message, data}` and failures carry `{status, message}`.
//! The builders here are framework-agnostic; the server wraps them in its
//! own JSON responder.

use serde::Serialize;

pub const MESSAGE_SUCCESS: &str = "Success";
pub const MESSAGE_BAD_REQUEST: &str = "Bad Request";
pub const MESSAGE_NOT_FOUND: &str = "Not Found";
pub const MESSAGE_INTERNAL_SERVER_ERR: &str = "Internal Server Error";

/// Success envelope: `{"status": "Success", "message": "Success", "data": …}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub message: &'static str,
    pub data: T,
}

/// Error envelope: `{"status": "<category>", "message": "<detail>"}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub status: &'static str,
    pub message: String,
}

/// Wrap `data` in the success envelope.
pub fn success<T: Serialize>(data: T) -> ApiResponse<T> {
    ApiResponse {
        status: MESSAGE_SUCCESS,
        message: MESSAGE_SUCCESS,
        data,
    }
}

/// Build an error envelope from a status category and a detail message.
pub fn error(status: &'static str, message: impl Into<String>) -> ApiError {
    ApiError {
        status,
        message: message.into(),
    }
}
