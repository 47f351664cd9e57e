//! Error types for the batch streaming pipeline.
//!
//! This module defines the central `Error` enum shared by every stage of the
//! pipeline and by the HTTP surface. It implements [`IntoResponse`] so that
//! request-level failures map onto HTTP status codes directly.
//!
//! ## Error Cases
//! - `NotFound`: The requested resource does not exist in the store.
//! - `Io`: Reading a resource failed for any reason other than absence.
//! - `Encoding`: A payload or a wire record was malformed.
//! - `Timeout`: A single item exceeded its per-item deadline.
//! - `Cancelled`: The request was cancelled before the item completed.
//! - `InvalidRequest`: The client request was malformed or exceeded bounds.
//! - `Transport`: Writing to the client connection failed.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.
//!
//! Only `InvalidRequest`, `ServiceShutdown` and `Transport` ever leave the
//! dispatcher. Per-item errors are logged and the item is omitted.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::io;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the batch streaming pipeline.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The identifier does not resolve to a resource.
    #[error("Resource not found: {id}")]
    NotFound { id: String },

    /// Reading the resource failed.
    #[error("I/O error reading {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: io::Error,
    },

    /// Malformed input while sniffing, encoding or decoding.
    #[error("Encoding error: {reason}")]
    Encoding { reason: String },

    /// The item did not complete within its deadline.
    #[error("Timed out after {millis}ms loading {id}")]
    Timeout { id: String, millis: u128 },

    /// The request was cancelled while the item was in flight.
    #[error("Request cancelled")]
    Cancelled,

    /// The client request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Writing to the transport failed; the connection must not be reused.
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub(crate) fn encoding(reason: impl Into<String>) -> Self {
        Self::Encoding {
            reason: reason.into(),
        }
    }

    /// Classifies a store read failure for `id`.
    pub fn from_read(id: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { id: id.to_string() },
            _ => Self::Io {
                id: id.to_string(),
                source,
            },
        }
    }

    /// HTTP status used when this error terminates a request before streaming
    /// starts.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::ServiceShutdown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Cancelled | Self::Io { .. } | Self::Encoding { .. } | Self::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        }
        (status, self.to_string()).into_response()
    }
}
