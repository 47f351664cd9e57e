//! Resource storage backends.
//!
//! The pipeline treats storage as a black box exposing a single read
//! capability, [`ResourceStore::read`]. Two implementations ship with the
//! crate:
//!
//! - [`FsStore`] - files under a root directory, addressed by `/`-separated
//!   identifiers.
//! - [`MemoryStore`] - an in-memory map with optional injected latency and
//!   failures, used by tests and benchmarks.

use crate::{Error, ResourceId, Result};
use bytes::Bytes;
use core::{future::Future, time::Duration};
use std::{
    collections::HashMap,
    io,
    path::PathBuf,
};

/// Read access to the bytes behind a [`ResourceId`].
///
/// Implementations must be safe to share across producer tasks; the
/// dispatcher holds them behind an `Arc` and calls `read` concurrently.
pub trait ResourceStore: Send + Sync + 'static {
    /// Reads the full payload for `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the resource does not exist.
    /// - [`Error::Io`] for any other read failure.
    fn read(&self, id: &ResourceId) -> impl Future<Output = Result<Bytes>> + Send;
}

/// File-system store rooted at a directory.
///
/// `/images/timg1.png` resolves to `<root>/images/timg1.png`. Empty and `.`
/// segments are ignored; identifiers containing `..` never resolve.
#[derive(Clone, Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, id: &ResourceId) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in id.as_str().split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(Error::NotFound {
                        id: id.to_string(),
                    });
                }
                segment => path.push(segment),
            }
        }
        Ok(path)
    }
}

impl ResourceStore for FsStore {
    fn read(&self, id: &ResourceId) -> impl Future<Output = Result<Bytes>> + Send {
        let resolved = self.resolve(id);
        let id = id.clone();
        async move {
            let path = resolved?;
            let meta = tokio::fs::metadata(&path)
                .await
                .map_err(|e| Error::from_read(id.as_str(), e))?;
            if !meta.is_file() {
                return Err(Error::NotFound { id: id.to_string() });
            }
            tracing::debug!("File size: {} bytes ({})", meta.len(), path.display());

            let data = tokio::fs::read(&path)
                .await
                .map_err(|e| Error::from_read(id.as_str(), e))?;
            Ok(Bytes::from(data))
        }
    }
}

#[derive(Clone, Debug)]
enum Entry {
    Ready { data: Bytes, latency: Duration },
    Failing(io::ErrorKind),
    Hang,
}

/// In-memory store with scriptable latency and failures.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `data` under `id`, returned immediately on read.
    #[must_use]
    pub fn with(self, id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.with_latency(id, data, Duration::ZERO)
    }

    /// Registers `data` under `id`, returned after sleeping for `latency`.
    #[must_use]
    pub fn with_latency(
        mut self,
        id: impl Into<String>,
        data: impl Into<Bytes>,
        latency: Duration,
    ) -> Self {
        self.entries.insert(
            id.into(),
            Entry::Ready {
                data: data.into(),
                latency,
            },
        );
        self
    }

    /// Makes every read of `id` fail with an I/O error of `kind`.
    #[must_use]
    pub fn with_failure(mut self, id: impl Into<String>, kind: io::ErrorKind) -> Self {
        self.entries.insert(id.into(), Entry::Failing(kind));
        self
    }

    /// Makes every read of `id` suspend forever.
    #[must_use]
    pub fn with_hang(mut self, id: impl Into<String>) -> Self {
        self.entries.insert(id.into(), Entry::Hang);
        self
    }
}

impl ResourceStore for MemoryStore {
    fn read(&self, id: &ResourceId) -> impl Future<Output = Result<Bytes>> + Send {
        let entry = self.entries.get(id.as_str()).cloned();
        let id = id.clone();
        async move {
            match entry {
                None => Err(Error::NotFound { id: id.to_string() }),
                Some(Entry::Failing(kind)) => Err(Error::from_read(id.as_str(), kind.into())),
                Some(Entry::Hang) => std::future::pending().await,
                Some(Entry::Ready { data, latency }) => {
                    if !latency.is_zero() {
                        tokio::time::sleep(latency).await;
                    }
                    Ok(data)
                }
            }
        }
    }
}
