//! Frame Writer.
//!
//! Serializes a batch onto a transport using chunked framing, flushing after
//! every item so the client can consume results as they arrive.
//!
//! ## Framing variants
//!
//! - Text records ([`FrameWriter`]): `<record>\r\n` per chunk, then
//!   `0\r\n\r\n`. No hex length prefix; the records are newline-delimited
//!   text carried inside the HTTP transfer encoding.
//! - Raw chunks ([`RawChunkWriter`]): `<hex-len>\r\n<bytes>\r\n` per write,
//!   then `0\r\n\r\n`. This is byte-exact HTTP/1.1 chunked framing.
//!
//! A writer serves exactly one response. Once it has terminated or aborted,
//! every further write is rejected.

use crate::{
    EncodedChunk, Error, Result,
    types::{END_OF_STREAM, RECORD_TERMINATOR},
};
use futures::{Stream, StreamExt};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Lifecycle of a single response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// Nothing written yet.
    Idle,
    /// At least one record written, terminator pending.
    Streaming,
    /// End-of-stream marker written.
    Terminated,
    /// A write failed; the connection is in an unknown state.
    Aborted,
}

/// Totals for a completed response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub records: usize,
    pub bytes: u64,
}

/// Shared state machine and flush discipline for both framing variants.
#[derive(Debug)]
struct Framer<W> {
    out: W,
    state: FrameState,
    stats: FrameStats,
}

impl<W: AsyncWrite + Unpin> Framer<W> {
    const fn new(out: W) -> Self {
        Self {
            out,
            state: FrameState::Idle,
            stats: FrameStats {
                records: 0,
                bytes: 0,
            },
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            FrameState::Idle | FrameState::Streaming => Ok(()),
            state => Err(Error::Transport(io::Error::other(format!(
                "write attempted on {state:?} stream"
            )))),
        }
    }

    /// Writes `parts` back to back and flushes once.
    async fn emit(&mut self, parts: &[&[u8]]) -> Result<()> {
        self.ensure_open()?;
        match write_flushed(&mut self.out, parts).await {
            Ok(written) => {
                self.stats.bytes += written;
                Ok(())
            }
            Err(e) => {
                self.state = FrameState::Aborted;
                Err(Error::Transport(e))
            }
        }
    }

    async fn record(&mut self, parts: &[&[u8]]) -> Result<()> {
        self.emit(parts).await?;
        self.state = FrameState::Streaming;
        self.stats.records += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<FrameStats> {
        self.emit(&[END_OF_STREAM]).await?;
        self.state = FrameState::Terminated;
        Ok(self.stats)
    }
}

async fn write_flushed<W: AsyncWrite + Unpin>(out: &mut W, parts: &[&[u8]]) -> io::Result<u64> {
    let mut written = 0;
    for part in parts {
        out.write_all(part).await?;
        written += part.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

/// Writes [`EncodedChunk`]s as newline-delimited text records.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: Framer<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub const fn new(out: W) -> Self {
        Self {
            inner: Framer::new(out),
        }
    }

    pub const fn state(&self) -> FrameState {
        self.inner.state
    }

    pub const fn stats(&self) -> FrameStats {
        self.inner.stats
    }

    /// Writes one record followed by `\r\n`, then flushes.
    ///
    /// # Errors
    ///
    /// [`Error::Transport`] if the write or flush fails (the writer moves to
    /// [`FrameState::Aborted`]) or if the writer is no longer open.
    pub async fn write_record(&mut self, chunk: &EncodedChunk) -> Result<()> {
        let wire = chunk.to_wire();
        self.inner
            .record(&[wire.as_bytes(), RECORD_TERMINATOR])
            .await?;
        tracing::trace!(ordinal = chunk.ordinal, bytes = wire.len(), "Record flushed");
        Ok(())
    }

    /// Writes the end-of-stream marker.
    ///
    /// # Errors
    ///
    /// [`Error::Transport`] on write failure or if already closed.
    pub async fn finish(&mut self) -> Result<FrameStats> {
        self.inner.finish().await
    }

    /// Drains `stream` in arrival order, writing and flushing each chunk, then
    /// terminates the response.
    ///
    /// # Errors
    ///
    /// The first transport error aborts the loop and is returned; nothing else
    /// is written after it.
    pub async fn write_stream<S>(mut self, stream: S) -> Result<FrameStats>
    where
        S: Stream<Item = EncodedChunk>,
    {
        let mut stream = core::pin::pin!(stream);
        while let Some(chunk) = stream.next().await {
            self.write_record(&chunk).await?;
        }
        self.finish().await
    }
}

/// Writes raw byte chunks with HTTP/1.1 chunk-size prefixes.
#[derive(Debug)]
pub struct RawChunkWriter<W> {
    inner: Framer<W>,
}

impl<W: AsyncWrite + Unpin> RawChunkWriter<W> {
    pub const fn new(out: W) -> Self {
        Self {
            inner: Framer::new(out),
        }
    }

    pub const fn state(&self) -> FrameState {
        self.inner.state
    }

    /// Writes `<hex-len>\r\n<data>\r\n` and flushes. Empty slices are
    /// skipped, since a zero-length chunk would end the body.
    ///
    /// # Errors
    ///
    /// [`Error::Transport`] on write failure or if already closed.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return self.inner.ensure_open();
        }
        let size_line = format!("{:x}\r\n", data.len());
        tracing::trace!(size = data.len(), "Raw chunk");
        self.inner
            .record(&[size_line.as_bytes(), data, RECORD_TERMINATOR])
            .await
    }

    /// Writes the terminating zero-size chunk.
    ///
    /// # Errors
    ///
    /// [`Error::Transport`] on write failure or if already closed.
    pub async fn finish(&mut self) -> Result<FrameStats> {
        self.inner.finish().await
    }
}

/// Frames `data` as consecutive raw chunks of at most `chunk_size` bytes and
/// terminates the body.
///
/// # Errors
///
/// [`Error::InvalidRequest`] if `chunk_size` is zero, otherwise any transport
/// error.
pub async fn write_chunked<W>(out: W, data: &[u8], chunk_size: usize) -> Result<FrameStats>
where
    W: AsyncWrite + Unpin,
{
    if chunk_size == 0 {
        return Err(Error::InvalidRequest {
            reason: "chunk size must be greater than 0".to_string(),
        });
    }

    let mut writer = RawChunkWriter::new(out);
    for piece in data.chunks(chunk_size) {
        writer.write_chunk(piece).await?;
    }
    writer.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dispatcher, Loader, LoadedResource, MemoryStore, ResourceId, Strategy};
    use base64::{Engine, engine::general_purpose::STANDARD};
    use core::{
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio_util::sync::CancellationToken;

    /// Records the buffer contents at every flush and fails once `budget`
    /// bytes have been written.
    #[derive(Default)]
    struct ProbeWriter {
        buf: Vec<u8>,
        flushed: Vec<usize>,
        budget: Option<usize>,
    }

    impl AsyncWrite for ProbeWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            data: &[u8],
        ) -> Poll<io::Result<usize>> {
            if let Some(budget) = self.budget {
                if self.buf.len() + data.len() > budget {
                    return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
                }
            }
            self.buf.extend_from_slice(data);
            Poll::Ready(Ok(data.len()))
        }

        fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            let len = self.buf.len();
            self.flushed.push(len);
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn chunk(ordinal: usize, body: &str) -> EncodedChunk {
        EncodedChunk::new(
            ordinal,
            LoadedResource {
                size_bytes: 0,
                encoded_body: body.to_string(),
                content_type: "image/png",
            },
        )
    }

    #[tokio::test]
    async fn writes_records_then_terminator() -> Result<()> {
        let chunks = futures::stream::iter([chunk(1, "AAAA"), chunk(0, "BBBB")]);
        let mut out = Vec::new();
        let stats = FrameWriter::new(&mut out).write_stream(chunks).await?;

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1:data:image/png;AAAA\r\n0:data:image/png;BBBB\r\n0\r\n\r\n"
        );
        assert_eq!(stats.records, 2);
        Ok(())
    }

    #[tokio::test]
    async fn flushes_after_every_record() -> Result<()> {
        let mut probe = ProbeWriter::default();
        let mut writer = FrameWriter::new(&mut probe);
        writer.write_record(&chunk(0, "AAAA")).await?;
        writer.write_record(&chunk(1, "BB")).await?;
        let stats = writer.finish().await?;

        let first = "0:data:image/png;AAAA\r\n".len();
        let second = first + "1:data:image/png;BB\r\n".len();
        assert_eq!(probe.flushed, [first, second, second + END_OF_STREAM.len()]);
        assert_eq!(stats.bytes, probe.buf.len() as u64);
        Ok(())
    }

    #[tokio::test]
    async fn empty_stream_writes_only_terminator() -> Result<()> {
        let mut out = Vec::new();
        FrameWriter::new(&mut out)
            .write_stream(futures::stream::empty())
            .await?;
        assert_eq!(out, END_OF_STREAM);
        Ok(())
    }

    #[tokio::test]
    async fn transport_failure_aborts_the_stream() {
        let mut probe = ProbeWriter {
            budget: Some(30),
            ..ProbeWriter::default()
        };
        let mut writer = FrameWriter::new(&mut probe);
        assert!(writer.write_record(&chunk(0, "AAAA")).await.is_ok());
        assert_eq!(writer.state(), FrameState::Streaming);

        let err = writer.write_record(&chunk(1, "BBBB")).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(writer.state(), FrameState::Aborted);

        // Nothing more may be written, not even the terminator.
        assert!(writer.finish().await.is_err());
        drop(writer);
        assert_eq!(probe.buf, b"0:data:image/png;AAAA\r\n");
    }

    #[tokio::test]
    async fn terminated_writer_rejects_records() -> Result<()> {
        let mut out = Vec::new();
        let mut writer = FrameWriter::new(&mut out);
        writer.finish().await?;
        assert_eq!(writer.state(), FrameState::Terminated);
        assert!(writer.write_record(&chunk(0, "AAAA")).await.is_err());
        assert!(writer.finish().await.is_err());
        assert_eq!(out, END_OF_STREAM);
        Ok(())
    }

    #[tokio::test]
    async fn raw_chunks_are_hex_prefixed() -> Result<()> {
        let data: Vec<u8> = (0..2600).map(|i| b'A' + (i % 26) as u8).collect();
        let mut out = Vec::new();
        let stats = write_chunked(&mut out, &data, 1024).await?;

        let mut expected = Vec::new();
        for piece in data.chunks(1024) {
            expected.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
            expected.extend_from_slice(piece);
            expected.extend_from_slice(b"\r\n");
        }
        expected.extend_from_slice(b"0\r\n\r\n");

        assert_eq!(out, expected);
        assert!(out.starts_with(b"400\r\nABC"));
        assert_eq!(stats.records, 3);
        Ok(())
    }

    #[tokio::test]
    async fn raw_writer_skips_empty_chunks() -> Result<()> {
        let mut out = Vec::new();
        let mut writer = RawChunkWriter::new(&mut out);
        writer.write_chunk(b"").await?;
        writer.write_chunk(b"hello").await?;
        writer.finish().await?;
        assert_eq!(out, b"5\r\nhello\r\n0\r\n\r\n");
        Ok(())
    }

    #[tokio::test]
    async fn raw_zero_chunk_size_is_rejected() {
        let err = write_chunked(Vec::new(), b"abc", 0).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn end_to_end_partial_batch() -> Result<()> {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.resize(100, 0);
        let expected = format!("0:data:image/png;{}\r\n0\r\n\r\n", STANDARD.encode(&png));
        let dispatcher = Dispatcher::new(Loader::new(MemoryStore::new().with("/a.png", png)));

        for strategy in [Strategy::Sequential, Strategy::Concurrent] {
            let ids = vec![ResourceId::from("/a.png"), ResourceId::from("/b.png")];
            let stream = dispatcher.dispatch(ids, strategy, CancellationToken::new());
            let mut out = Vec::new();
            FrameWriter::new(&mut out).write_stream(stream).await?;
            assert_eq!(String::from_utf8(out).unwrap(), expected, "{strategy}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn end_to_end_all_missing() -> Result<()> {
        let dispatcher = Dispatcher::new(Loader::new(MemoryStore::new()));
        for strategy in [Strategy::Sequential, Strategy::Concurrent] {
            let ids = vec![ResourceId::from("/a.png"), ResourceId::from("/b.png")];
            let stream = dispatcher.dispatch(ids, strategy, CancellationToken::new());
            let mut out = Vec::new();
            FrameWriter::new(&mut out).write_stream(stream).await?;
            assert_eq!(out, b"0\r\n\r\n", "{strategy}");
        }
        Ok(())
    }
}
