use crate::server::telemetry::increment_stream_errors;
use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use chunkline_core::write_chunked;
use tokio_util::io::ReaderStream;

/// Repeating `A..Z` filler used by the `/data` endpoint.
pub fn demo_payload(len: usize) -> Vec<u8> {
    (b'A'..=b'Z').cycle().take(len).collect()
}

/// Streams `data` as raw hex-length-prefixed chunks of `chunk_size` bytes.
pub fn stream_raw(data: Vec<u8>, chunk_size: usize, pipe_buffer_bytes: usize) -> Response {
    let (pipe_tx, pipe_rx) = tokio::io::duplex(pipe_buffer_bytes);

    tokio::spawn(async move {
        match write_chunked(pipe_tx, &data, chunk_size).await {
            Ok(stats) => tracing::debug!(
                "Raw stream complete: {} chunks, {} bytes",
                stats.records,
                stats.bytes
            ),
            Err(e) => {
                increment_stream_errors();
                tracing::warn!("Raw stream aborted: {e}");
            }
        }
    });

    (
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (header::TRANSFER_ENCODING, "chunked"),
        ],
        Body::from_stream(ReaderStream::new(pipe_rx)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_payload_cycles_the_alphabet() {
        let data = demo_payload(28);
        assert_eq!(&data[..3], b"ABC");
        assert_eq!(&data[25..], b"ZAB");
    }
}
