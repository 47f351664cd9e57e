//! Magic-byte content classification.
//!
//! [`sniff`] inspects at most [`SNIFF_LEN`] leading bytes and returns a bare
//! MIME essence (`type/subtype`, no parameters). Because no parameters are
//! ever emitted, the result never contains the `;` or `:` delimiters used by
//! the record framing.

use crate::types::SNIFF_LEN;

/// Fallback for payloads containing binary control bytes.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Fallback for payloads that look like text.
pub const TEXT_PLAIN: &str = "text/plain";

struct Signature {
    offset: usize,
    magic: &'static [u8],
    mime: &'static str,
}

const fn sig(offset: usize, magic: &'static [u8], mime: &'static str) -> Signature {
    Signature {
        offset,
        magic,
        mime,
    }
}

// Ordered; first match wins.
const SIGNATURES: &[Signature] = &[
    sig(0, b"\x89PNG\r\n\x1a\n", "image/png"),
    sig(0, b"\xff\xd8\xff", "image/jpeg"),
    sig(0, b"GIF87a", "image/gif"),
    sig(0, b"GIF89a", "image/gif"),
    sig(0, b"\x00\x00\x01\x00", "image/x-icon"),
    sig(0, b"\x00\x00\x02\x00", "image/x-icon"),
    sig(0, b"II*\x00", "image/tiff"),
    sig(0, b"MM\x00*", "image/tiff"),
    sig(0, b"BM", "image/bmp"),
    sig(0, b"%PDF-", "application/pdf"),
    sig(0, b"PK\x03\x04", "application/zip"),
    sig(0, b"\x1f\x8b\x08", "application/x-gzip"),
    sig(8, b"WEBPVP", "image/webp"),
];

// ISO BMFF major brands (bytes 8..12 after a `ftyp` box header).
const FTYP_BRANDS: &[(&[u8], &str)] = &[
    (b"avif", "image/avif"),
    (b"avis", "image/avif"),
    (b"heic", "image/heic"),
    (b"heix", "image/heic"),
    (b"mif1", "image/heif"),
];

/// Classifies `data` by its leading bytes.
///
/// Payloads shorter than [`SNIFF_LEN`] are handled without reading past their
/// end; signatures longer than the payload simply do not match.
pub fn sniff(data: &[u8]) -> &'static str {
    let prefix = &data[..data.len().min(SNIFF_LEN)];

    if let Some(found) = SIGNATURES.iter().find(|s| matches_at(prefix, s.offset, s.magic)) {
        // WebP additionally requires the RIFF container header.
        if found.offset != 8 || prefix.starts_with(b"RIFF") {
            return found.mime;
        }
    }

    if matches_at(prefix, 4, b"ftyp") {
        if let Some(&(_, mime)) = FTYP_BRANDS
            .iter()
            .find(|(brand, _)| matches_at(prefix, 8, brand))
        {
            return mime;
        }
    }

    if let Some(mime) = sniff_markup(prefix) {
        return mime;
    }

    if prefix.iter().copied().any(is_binary_byte) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

fn matches_at(prefix: &[u8], offset: usize, magic: &[u8]) -> bool {
    prefix
        .get(offset..offset + magic.len())
        .is_some_and(|window| window == magic)
}

fn sniff_markup(prefix: &[u8]) -> Option<&'static str> {
    let start = prefix.iter().position(|b| !b.is_ascii_whitespace())?;
    let rest = &prefix[start..];
    if starts_with_ignore_case(rest, b"<svg") {
        Some("image/svg+xml")
    } else if rest.starts_with(b"<?xml") {
        Some("text/xml")
    } else {
        None
    }
}

fn starts_with_ignore_case(data: &[u8], needle: &[u8]) -> bool {
    data.get(..needle.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(needle))
}

const fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}
