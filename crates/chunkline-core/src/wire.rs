//! Chunk Encoder and the matching record decoder.
//!
//! A record is `<ordinal>:data:<content-type>;<encoded-body>`. Records are
//! written one per line (`\r\n`) and the body ends with `0\r\n\r\n`.
//! Nothing is escaped: content types come from the sniffer and never contain
//! the delimiters, and base64 bodies never contain line breaks.

use crate::{
    EncodedChunk, Error, LoadedResource, Result,
    types::{DATA_MARKER, END_OF_STREAM, RECORD_TERMINATOR},
};
use core::{fmt, str::FromStr};

impl EncodedChunk {
    /// Tags a loaded resource with its request ordinal.
    pub fn new(ordinal: usize, resource: LoadedResource) -> Self {
        debug_assert!(
            !resource.content_type.contains([':', ';']),
            "content type {:?} collides with record delimiters",
            resource.content_type
        );
        Self {
            ordinal,
            content_type: resource.content_type.to_string(),
            encoded_body: resource.encoded_body,
        }
    }

    /// Serialized wire form, without the record terminator.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EncodedChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{DATA_MARKER}{};{}",
            self.ordinal, self.content_type, self.encoded_body
        )
    }
}

impl FromStr for EncodedChunk {
    type Err = Error;

    fn from_str(record: &str) -> Result<Self> {
        let (ordinal, rest) = record
            .split_once(':')
            .ok_or_else(|| Error::encoding(format!("record has no ordinal: {record:.32}")))?;
        let ordinal = ordinal
            .parse::<usize>()
            .map_err(|e| Error::encoding(format!("invalid ordinal {ordinal:?}: {e}")))?;
        let rest = rest
            .strip_prefix(DATA_MARKER)
            .ok_or_else(|| Error::encoding(format!("record {ordinal} lacks `{DATA_MARKER}`")))?;
        let (content_type, encoded_body) = rest
            .split_once(';')
            .ok_or_else(|| Error::encoding(format!("record {ordinal} lacks a content type")))?;

        Ok(Self {
            ordinal,
            content_type: content_type.to_string(),
            encoded_body: encoded_body.to_string(),
        })
    }
}

/// Decodes a complete text-record response body into its chunks, in wire
/// order.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the body does not end with the
/// end-of-stream marker or contains a malformed record.
pub fn parse_records(body: &str) -> Result<Vec<EncodedChunk>> {
    // Safe to treat as str: both markers are ASCII.
    let terminator = core::str::from_utf8(END_OF_STREAM).unwrap_or_default();
    let separator = core::str::from_utf8(RECORD_TERMINATOR).unwrap_or_default();

    let records = body
        .strip_suffix(terminator)
        .ok_or_else(|| Error::encoding("body is missing the end-of-stream marker"))?;

    if records.is_empty() {
        return Ok(Vec::new());
    }

    records
        .strip_suffix(separator)
        .ok_or_else(|| Error::encoding("last record is not terminated"))?
        .split(separator)
        .map(str::parse)
        .collect()
}
