use crate::server::{
    service::lifecycle::StreamGuard,
    telemetry::{
        increment_chunks_emitted, increment_stream_errors, record_items_failed,
        record_stream_duration,
    },
};
use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use chunkline_core::{Dispatcher, FrameWriter, ResourceId, ResourceStore, Strategy};
use futures::StreamExt;
use std::time::Instant;
use tokio_util::{
    io::ReaderStream,
    sync::{CancellationToken, DropGuard},
};
use tracing::Instrument;

/// Dispatches a batch and returns a response whose body is fed by a
/// [`FrameWriter`] running in the background.
///
/// # Arguments
///
/// - `dispatcher`: Loads and encodes each identifier.
/// - `ids`: Identifiers in request order; ordinals are positions in this list.
/// - `strategy`: Sequential (request order) or concurrent (completion order).
/// - `cancel`: Request token. Cancelled when the response body is dropped
///   (finished or client gone), and by the server on shutdown.
/// - `guard`: Keeps the stream counted as in flight until the body is dropped.
/// - `pipe_buffer_bytes`: Capacity of the pipe between writer and body.
///
/// # Behavior
///
/// - Headers are sent before any item is loaded.
/// - Every record is flushed into the pipe as soon as it arrives.
/// - Failed items are omitted; the body still ends with `0\r\n\r\n`.
/// - If the client goes away, outstanding producers are cancelled even while
///   the writer is still waiting on a slow item, and the body is abandoned
///   without a terminator.
pub fn stream_batch<S: ResourceStore>(
    dispatcher: &Dispatcher<S>,
    ids: Vec<ResourceId>,
    strategy: Strategy,
    cancel: CancellationToken,
    guard: StreamGuard,
    pipe_buffer_bytes: usize,
) -> Response {
    let span = tracing::info_span!("batch", %strategy, items = ids.len());
    let stream = span.in_scope(|| dispatcher.dispatch(ids, strategy, cancel.clone()));
    let requested = stream.requested();
    let (pipe_tx, pipe_rx) = tokio::io::duplex(pipe_buffer_bytes);

    let lease = BodyLease {
        _stream: guard,
        _cancel: cancel.clone().drop_guard(),
    };

    let started = Instant::now();
    let fut = async move {
        let chunks = stream.inspect(|_| increment_chunks_emitted());

        match FrameWriter::new(pipe_tx).write_stream(chunks).await {
            Ok(stats) => {
                record_items_failed(requested.saturating_sub(stats.records) as u64);
                record_stream_duration(started.elapsed().as_secs_f64() * 1_000.0);
                tracing::info!(
                    "All files sent: {}/{} records, {} bytes",
                    stats.records,
                    requested,
                    stats.bytes
                );
            }
            Err(e) => {
                increment_stream_errors();
                cancel.cancel();
                tracing::warn!("Stream aborted: {e}");
            }
        }
    };
    tokio::spawn(fut.instrument(span));

    (
        [
            (header::CONTENT_TYPE, "text/plain"),
            (header::TRANSFER_ENCODING, "chunked"),
        ],
        Body::from_stream(ReaderStream::new(pipe_rx).map(move |bytes| {
            let _lease = &lease;
            bytes
        })),
    )
        .into_response()
}

/// Owned by the response body. Dropping the body releases the stream slot and
/// cancels any producers still running for it.
struct BodyLease {
    _stream: StreamGuard,
    _cancel: DropGuard,
}
