//! Errors that fail a run request outright.
//!
//! Anything the script itself does wrong (non-zero exit, timeout, bad result
//! file) is reported inside a successful response instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The per-request directory or script file could not be written.
    #[error("Failed to materialize script: {0}")]
    Materialize(#[source] io::Error),

    /// The interpreter could not be started.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Waiting on the child or draining its pipes failed.
    #[error("Failed to wait for script process: {0}")]
    Wait(#[source] io::Error),

    /// The process tree could not be killed after the deadline.
    #[error("Failed to terminate script process tree: {0}")]
    Terminate(#[source] io::Error),

    /// The task driving the run panicked or was cancelled.
    #[error("Run task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RunError {
    pub fn code(&self) -> &'static str {
        match self {
            RunError::Spawn { .. } => "SPAWN_FAILED",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for RunError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, code = self.code(), "Run request failed");

        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}
