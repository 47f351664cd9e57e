//! HTTP service and request lifecycle.
//!
//! ## Structure
//!
//! - [`handler`] - axum routes and shared [`handler::AppState`].
//! - [`lifecycle`] - in-flight stream tracking and graceful shutdown.

pub mod handler;
pub mod lifecycle;
