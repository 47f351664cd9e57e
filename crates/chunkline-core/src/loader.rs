//! Resource Loader: read, classify, encode.

use crate::{LoadedResource, ResourceId, Result, sniff::sniff, store::ResourceStore};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::sync::Arc;

/// Loads resources from a shared [`ResourceStore`] and prepares them for
/// transport.
///
/// A loader holds no mutable state; cloning it only bumps the store's
/// reference count, so each producer task gets its own handle.
pub struct Loader<S> {
    store: Arc<S>,
}

impl<S> Clone for Loader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ResourceStore> Loader<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub const fn from_shared(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Reads `id`, sniffs its content type and base64-encodes the payload.
    ///
    /// # Errors
    ///
    /// Propagates [`NotFound`](crate::Error::NotFound) and
    /// [`Io`](crate::Error::Io) from the store.
    pub async fn load(&self, id: &ResourceId) -> Result<LoadedResource> {
        let data = self.store.read(id).await?;
        let content_type = sniff(&data);
        tracing::debug!(%id, size = data.len(), content_type, "Loaded resource");

        Ok(LoadedResource {
            size_bytes: data.len() as u64,
            encoded_body: STANDARD.encode(&data),
            content_type,
        })
    }
}
