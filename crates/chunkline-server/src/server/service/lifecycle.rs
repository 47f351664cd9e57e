//! Admission control and graceful shutdown for streaming responses.
//!
//! [`Lifecycle`] tracks how many chunked responses are in flight and owns the
//! root [`CancellationToken`] from which every request's token is derived.
//! Shutdown proceeds in phases:
//!
//! 1. Refuse new batch requests (they get `503`).
//! 2. Let in-flight streams drain for up to `shutdown_timeout`.
//! 3. Cancel the root token, which stops every remaining producer; their
//!    streams close and the frame writers terminate them.

use crate::server::telemetry::{decrement_streams_inflight, increment_streams_inflight};
use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct Lifecycle {
    shutdown_token: CancellationToken,
    shutting_down: AtomicBool,
    inflight: AtomicUsize,
    shutdown_timeout: Duration,
}

/// Marks one in-flight stream; released on drop.
#[derive(Debug)]
pub struct StreamGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.lifecycle.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_streams_inflight();
    }
}

impl Lifecycle {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
            shutting_down: AtomicBool::new(false),
            inflight: AtomicUsize::new(0),
            shutdown_timeout,
        }
    }

    /// Admits a new stream, or returns `None` once shutdown has begun.
    pub fn begin_stream(self: &Arc<Self>) -> Option<StreamGuard> {
        // Count first so a concurrent shutdown never misses this stream.
        self.inflight.fetch_add(1, Ordering::AcqRel);
        increment_streams_inflight();
        let guard = StreamGuard {
            lifecycle: Arc::clone(self),
        };

        if self.is_shutting_down() {
            return None;
        }
        Some(guard)
    }

    pub fn streams_inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Token for one request; cancelled by the request itself or by shutdown.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    pub async fn shutdown(&self) {
        // === Phase 1: Stop accepting new requests ===
        tracing::info!("Refusing new requests");
        self.shutting_down.store(true, Ordering::Release);

        // === Phase 2: Wait for in-flight streams to drain ===
        tracing::info!(
            "Draining in-flight streams ({} active)",
            self.streams_inflight()
        );
        let drained = timeout(self.shutdown_timeout, async {
            while self.streams_inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::debug!("All in-flight streams drained successfully"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} streams still active)",
                self.streams_inflight()
            ),
        }

        // === Phase 3: Cancel remaining producers ===
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guards_track_inflight_streams() {
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_secs(1)));
        let first = lifecycle.begin_stream();
        let second = lifecycle.begin_stream();
        assert!(first.is_some() && second.is_some());
        assert_eq!(lifecycle.streams_inflight(), 2);

        drop(first);
        assert_eq!(lifecycle.streams_inflight(), 1);
        drop(second);
        assert_eq!(lifecycle.streams_inflight(), 0);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_streams() {
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_secs(1)));
        lifecycle.shutdown().await;
        assert!(lifecycle.is_shutting_down());
        assert!(lifecycle.begin_stream().is_none());
        assert_eq!(lifecycle.streams_inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_streams_that_outlive_the_drain() {
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_secs(2)));
        let token = lifecycle.request_token();
        let _guard = lifecycle.begin_stream();

        lifecycle.shutdown().await;
        assert!(token.is_cancelled());
        assert_eq!(lifecycle.streams_inflight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_streams_to_finish() {
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_secs(30)));
        let guard = lifecycle.begin_stream();

        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            drop(guard);
        });

        let started = tokio::time::Instant::now();
        lifecycle.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(lifecycle.streams_inflight(), 0);
    }
}
