//! # Shared pipeline types and wire constants
//!
//! These types flow through every stage of a single batch request:
//!
//! - [`ResourceId`] - caller-supplied identifier, one per requested item
//! - [`LoadedResource`] - the result of one successful load
//! - [`EncodedChunk`] - a loaded resource tagged with its request ordinal
//!
//! None of them are cached or shared across requests.

use core::fmt;
use std::sync::Arc;

/// Number of leading bytes inspected when classifying a payload.
pub const SNIFF_LEN: usize = 512;

/// Separates records in the text-record framing.
pub const RECORD_TERMINATOR: &[u8] = b"\r\n";

/// Zero-size chunk marking the end of a chunked body.
pub const END_OF_STREAM: &[u8] = b"0\r\n\r\n";

/// Marker between the ordinal and the content type of a record.
pub const DATA_MARKER: &str = "data:";

/// Opaque identifier locating a resource, e.g. `/images/timg1.png`.
///
/// Cheap to clone so that every producer task can own its copy.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits a comma-separated list, as carried by the `paths` query
    /// parameter, into identifiers. Empty entries are kept so that ordinals
    /// line up with the client's list.
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',').map(Self::new).collect()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A resource read from the store, classified and encoded for transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedResource {
    pub size_bytes: u64,
    pub encoded_body: String,
    pub content_type: &'static str,
}

/// One record of the batch response.
///
/// `ordinal` is the position of the identifier in the original request list,
/// never the arrival position, so clients can recover identity from an
/// out-of-order stream.
///
/// Protocol constraint: `content_type` never contains `:` or `;`, and
/// `encoded_body` never contains `\r\n`. Neither is escaped on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedChunk {
    pub ordinal: usize,
    pub content_type: String,
    pub encoded_body: String,
}
