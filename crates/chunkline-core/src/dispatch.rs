//! Fan-out Dispatcher.
//!
//! Turns a list of [`ResourceId`]s into a [`ResultStream`] of
//! [`EncodedChunk`]s using one of two [`Strategy`]s:
//!
//! - [`Strategy::Sequential`] loads items one at a time, in list order.
//! - [`Strategy::Concurrent`] spawns one task per item up front and forwards
//!   chunks in completion order.
//!
//! In both strategies a failed item is logged and omitted. A batch in which
//! every item fails is an empty stream that still closes normally.
//!
//! The result channel has capacity `N`, so producers never wait on the
//! consumer. It is closed exactly once: the coordinating task holds the last
//! sender and drops it only after every producer has finished.

use crate::{EncodedChunk, Error, Loader, ResourceId, Result, store::ResourceStore};
use core::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use futures::{Stream, future::join_all};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// How a batch is fanned out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// One item at a time; wire order equals request order.
    Sequential,
    /// One task per item; wire order is completion order.
    Concurrent,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Concurrent => f.write_str("concurrent"),
        }
    }
}

/// Receiving end of a dispatched batch.
///
/// Yields chunks until every producer has finished, then `None`.
#[derive(Debug)]
pub struct ResultStream {
    rx: mpsc::Receiver<EncodedChunk>,
    requested: usize,
}

impl ResultStream {
    /// Waits for the next chunk, or `None` once the batch is complete.
    pub async fn recv(&mut self) -> Option<EncodedChunk> {
        self.rx.recv().await
    }

    /// Number of identifiers in the originating request.
    pub const fn requested(&self) -> usize {
        self.requested
    }
}

impl Stream for ResultStream {
    type Item = EncodedChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Drives [`Loader`] invocations for a batch and feeds a [`ResultStream`].
pub struct Dispatcher<S> {
    loader: Loader<S>,
    item_timeout: Option<Duration>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            item_timeout: self.item_timeout,
        }
    }
}

impl<S: ResourceStore> Dispatcher<S> {
    pub const fn new(loader: Loader<S>) -> Self {
        Self {
            loader,
            item_timeout: None,
        }
    }

    /// Bounds how long a single item may take. Items that exceed it are
    /// omitted like any other failure.
    #[must_use]
    pub const fn with_item_timeout(mut self, item_timeout: Option<Duration>) -> Self {
        self.item_timeout = item_timeout;
        self
    }

    /// Starts loading `ids` in the background and returns the stream their
    /// chunks arrive on.
    ///
    /// Must be called from within a Tokio runtime. Cancelling `cancel` stops
    /// producers at their next suspension point; the stream still closes.
    pub fn dispatch(
        &self,
        ids: Vec<ResourceId>,
        strategy: Strategy,
        cancel: CancellationToken,
    ) -> ResultStream {
        let requested = ids.len();
        let (tx, rx) = mpsc::channel(requested.max(1));
        let batch = Batch {
            loader: self.loader.clone(),
            item_timeout: self.item_timeout,
            cancel,
        };

        match strategy {
            Strategy::Sequential => {
                tokio::spawn(batch.run_sequential(ids, tx).in_current_span());
            }
            Strategy::Concurrent => {
                tokio::spawn(batch.run_concurrent(ids, tx).in_current_span());
            }
        }

        ResultStream { rx, requested }
    }
}

/// Per-request state shared by the producers of one batch.
struct Batch<S> {
    loader: Loader<S>,
    item_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl<S> Clone for Batch<S> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            item_timeout: self.item_timeout,
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: ResourceStore> Batch<S> {
    async fn run_sequential(self, ids: Vec<ResourceId>, tx: mpsc::Sender<EncodedChunk>) {
        let requested = ids.len();
        let mut delivered = 0;

        for (ordinal, id) in ids.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::debug!("Batch cancelled before item {ordinal}");
                break;
            }

            match self.produce(ordinal, &id).await {
                Ok(chunk) => {
                    if tx.send(chunk).await.is_err() {
                        tracing::debug!("Result stream dropped, abandoning batch at {ordinal}");
                        return;
                    }
                    delivered += 1;
                }
                Err(e) => report_failure(ordinal, &id, &e),
            }
        }

        tracing::info!("Sequential batch complete: {delivered}/{requested} items");
    }

    async fn run_concurrent(self, ids: Vec<ResourceId>, tx: mpsc::Sender<EncodedChunk>) {
        let requested = ids.len();

        // Every unit is spawned before any of them is awaited.
        let handles: Vec<_> = ids
            .into_iter()
            .enumerate()
            .map(|(ordinal, id)| {
                let batch = self.clone();
                let tx = tx.clone();
                tokio::spawn(
                    async move {
                        match batch.produce(ordinal, &id).await {
                            Ok(chunk) => {
                                if let Err(_e) = tx.send(chunk).await {
                                    tracing::debug!("Result stream dropped before item {ordinal}");
                                    return false;
                                }
                                true
                            }
                            Err(e) => {
                                report_failure(ordinal, &id, &e);
                                false
                            }
                        }
                    }
                    .in_current_span(),
                )
            })
            .collect();

        // Join barrier: fires once every unit has terminated, whatever the
        // outcome.
        let mut delivered = 0;
        for (ordinal, outcome) in join_all(handles).await.into_iter().enumerate() {
            match outcome {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => tracing::error!("Producer for item {ordinal} panicked: {e}"),
            }
        }

        // Last sender; dropping it closes the stream.
        drop(tx);
        tracing::info!("Concurrent batch complete: {delivered}/{requested} items");
    }

    async fn produce(&self, ordinal: usize, id: &ResourceId) -> Result<EncodedChunk> {
        let load = self.loader.load(id);
        let loaded = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(Error::Cancelled),
            loaded = with_deadline(load, self.item_timeout, id) => loaded?,
        };
        Ok(EncodedChunk::new(ordinal, loaded))
    }
}

async fn with_deadline<F, T>(fut: F, limit: Option<Duration>, id: &ResourceId) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout {
                id: id.to_string(),
                millis: limit.as_millis(),
            })?,
    }
}

fn report_failure(ordinal: usize, id: &ResourceId, err: &Error) {
    match err {
        Error::Cancelled => tracing::debug!("Item {ordinal} ({id}) cancelled"),
        _ => tracing::warn!("Error getting chunk for item {ordinal} ({id}): {err}"),
    }
}
