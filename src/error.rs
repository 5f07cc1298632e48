//! Error types shared by the directory clients, the git transport and the
//! mirror operations.
//!
//! Startup and CLI code uses `anyhow`; everything below the daemon boundary
//! reports one of these so callers can tell a name collision from a network
//! failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failure talking to either hosting service's repository API.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The request never produced a response (DNS, TLS, connection reset, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered, but not with the expected success code.
    #[error("unexpected response {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// A create collided with an existing repository of the same name.
    #[error("repository already exists: {0}")]
    AlreadyExists(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for DirectoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DirectoryError::Decode(e.to_string())
        } else {
            DirectoryError::Transport(e.to_string())
        }
    }
}

/// Failure of the external `git` process.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git exited with {status}: {output}")]
    Failed { status: String, output: String },

    #[error("git timed out after {0}s")]
    Timeout(u64),

    #[error("project id {0} cannot be addressed in hashed storage")]
    InvalidProjectId(u64),
}

/// Outcome of a single mirror operation (create, update, remove, push).
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Git(#[from] GitError),

    /// The source record changed its display name since it was listed
    #[error("repository {expected} is now named {found}")]
    Renamed { expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, MirrorError>;

/// Rejection of an inbound webhook request. No collaborator has been
/// invoked when one of these is returned.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("forbidden")]
    Forbidden,

    #[error("unknown event kind: {0}")]
    UnknownEvent(String),

    #[error("bad payload: {0}")]
    BadPayload(String),
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        let status = match &self {
            HookError::Forbidden => StatusCode::FORBIDDEN,
            HookError::UnknownEvent(_) | HookError::BadPayload(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}
