//! HTTP routes for batch streaming.
//!
//! | route | behavior |
//! |---|---|
//! | `GET /thumbnail-batch-concurrent?paths=a,b` | one task per path, completion order |
//! | `GET /thumbnail-batch-blocking?paths=a,b` | one path at a time, request order |
//! | `GET /data` | raw chunked demo payload |
//! | `GET /health` | `SERVING` / `NOT_SERVING` |
//!
//! Request validation happens before any header is sent, so a bad request
//! gets a plain `400` and the pipeline is never started.

use crate::server::{
    config::ServerConfig,
    service::lifecycle::Lifecycle,
    streaming::{coordinator::stream_batch, raw},
    telemetry::{increment_requests, increment_stream_errors, record_items_per_request},
};
use axum::{
    Router,
    extract::{Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use chunkline_core::{Dispatcher, Error, Loader, ResourceId, ResourceStore, Strategy};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for every route.
pub struct AppState<S> {
    config: Arc<ServerConfig>,
    dispatcher: Dispatcher<S>,
    lifecycle: Arc<Lifecycle>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            dispatcher: self.dispatcher.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<S: ResourceStore> AppState<S> {
    pub fn new(config: ServerConfig, store: S) -> Self {
        let dispatcher =
            Dispatcher::new(Loader::new(store)).with_item_timeout(config.item_timeout);
        let lifecycle = Arc::new(Lifecycle::new(config.shutdown_timeout));
        Self {
            config: Arc::new(config),
            dispatcher,
            lifecycle,
        }
    }

    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    /// Comma-separated resource identifiers, e.g.
    /// `/images/timg1.png,/images/timg2.png`.
    paths: Option<String>,
}

pub fn router<S: ResourceStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/thumbnail-batch-concurrent", get(batch_concurrent::<S>))
        .route("/thumbnail-batch-blocking", get(batch_blocking::<S>))
        .route("/data", get(raw_data::<S>))
        .route("/health", get(health::<S>))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn batch_concurrent<S: ResourceStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<BatchQuery>,
) -> Result<Response, Error> {
    stream_thumbnails(&state, query, Strategy::Concurrent)
}

async fn batch_blocking<S: ResourceStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<BatchQuery>,
) -> Result<Response, Error> {
    stream_thumbnails(&state, query, Strategy::Sequential)
}

fn stream_thumbnails<S: ResourceStore>(
    state: &AppState<S>,
    query: BatchQuery,
    strategy: Strategy,
) -> Result<Response, Error> {
    let ids = parse_paths(query.paths.as_deref(), state.config.max_paths).inspect_err(|_| {
        increment_stream_errors();
    })?;

    let Some(guard) = state.lifecycle.begin_stream() else {
        increment_stream_errors();
        return Err(Error::ServiceShutdown);
    };

    increment_requests();
    record_items_per_request(ids.len() as f64);
    tracing::info!("Extracted {} paths ({strategy})", ids.len());
    for id in &ids {
        tracing::debug!("{id}");
    }

    Ok(stream_batch(
        &state.dispatcher,
        ids,
        strategy,
        state.lifecycle.request_token(),
        guard,
        state.config.pipe_buffer_bytes,
    ))
}

fn parse_paths(paths: Option<&str>, max_paths: usize) -> Result<Vec<ResourceId>, Error> {
    let paths = paths
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::InvalidRequest {
            reason: "Missing 'paths' query parameter".to_string(),
        })?;

    let ids = ResourceId::parse_list(paths);
    if ids.len() > max_paths {
        return Err(Error::InvalidRequest {
            reason: format!(
                "Requested {} paths exceeds maximum allowed ({max_paths})",
                ids.len()
            ),
        });
    }
    Ok(ids)
}

async fn raw_data<S: ResourceStore>(State(state): State<AppState<S>>) -> Response {
    raw::stream_raw(
        raw::demo_payload(state.config.demo_bytes),
        state.config.raw_chunk_size,
        state.config.pipe_buffer_bytes,
    )
}

async fn health<S: ResourceStore>(State(state): State<AppState<S>>) -> Response {
    if state.lifecycle.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_SERVING").into_response()
    } else {
        (StatusCode::OK, "SERVING").into_response()
    }
}
