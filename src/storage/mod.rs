pub mod azure;
pub mod memory;

use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::core::error::StorageError;
use crate::core::types::BlobLocation;

// ---------------------------------------------------------------------------
// BlobStore trait
// ---------------------------------------------------------------------------

/// Trait-based abstraction over the blob backend.
///
/// The production implementation (`AzureBlobStore`) talks to the Azure Blob
/// REST API with a SAS token. Tests use `InMemoryBlobStore`, which also
/// records every call so probe order can be asserted.
pub trait BlobStore: Send + Sync {
    /// HEAD a blob. `StorageError::NotFound` when it does not exist.
    fn head_blob(
        &self,
        location: &BlobLocation,
    ) -> impl std::future::Future<Output = Result<BlobMeta, StorageError>> + Send;

    /// GET a blob as a byte stream, optionally restricted to a byte range.
    fn get_blob(
        &self,
        location: &BlobLocation,
        range: Option<ByteRange>,
    ) -> impl std::future::Future<Output = Result<BlobResponse, StorageError>> + Send;
}

// ---------------------------------------------------------------------------
// Storage types
// ---------------------------------------------------------------------------

/// Body of a blob, streamed chunk by chunk from upstream.
pub type BlobStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Response headers of interest from a HEAD or GET.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlobMeta {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub accept_ranges: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl BlobMeta {
    /// Fill fields missing from `self` with values from `other`.
    pub fn or(self, other: BlobMeta) -> BlobMeta {
        BlobMeta {
            content_type: self.content_type.or(other.content_type),
            content_length: self.content_length.or(other.content_length),
            accept_ranges: self.accept_ranges.or(other.accept_ranges),
            etag: self.etag.or(other.etag),
            last_modified: self.last_modified.or(other.last_modified),
        }
    }
}

/// Output from a GET blob operation.
pub struct BlobResponse {
    pub meta: BlobMeta,
    /// `Some` when upstream honoured a range request (206).
    pub content_range: Option<String>,
    pub body: BlobStream,
}

impl std::fmt::Debug for BlobResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobResponse")
            .field("meta", &self.meta)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// A single `bytes=start-end` range; `end` is inclusive and optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Parse a Range header value like "bytes=0-1048575" or "bytes=100-".
    ///
    /// Suffix ranges and multi-range requests are not supported and yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let range_str = value.trim().strip_prefix("bytes=")?;
        let (start, end) = range_str.split_once('-')?;
        if end.contains(',') {
            return None;
        }
        let start: u64 = start.trim().parse().ok()?;
        let end = match end.trim() {
            "" => None,
            e => {
                let end: u64 = e.parse().ok()?;
                if end < start {
                    return None;
                }
                Some(end)
            }
        };
        Some(Self { start, end })
    }

    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

// ---------------------------------------------------------------------------
// Path encoding
// ---------------------------------------------------------------------------

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode one path segment (`día 1` → `d%C3%ADa%201`).
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, URI_COMPONENT).to_string()
}

/// Percent-encode a blob path segment by segment, keeping the `/` separators.
///
/// Blob names carry literal spaces and accents, so encoding the path as a
/// whole would turn the separators into `%2F` and address a different blob.
pub fn encode_blob_path(path: &str) -> String {
    path.split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Content type helpers
// ---------------------------------------------------------------------------

/// Determine content type from file extension.
pub fn content_type_for_path(path: &str) -> &'static str {
    let lower = path.to_ascii_lowercase();
    let ext = lower.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_segment_matches_uri_component() {
        assert_eq!(encode_segment("día 1"), "d%C3%ADa%201");
        assert_eq!(encode_segment(" día 1"), "%20d%C3%ADa%201");
        assert_eq!(encode_segment("2023_cw003.mp4"), "2023_cw003.mp4");
        assert_eq!(encode_segment("a/b"), "a%2Fb");
        assert_eq!(encode_segment("it's(1)!~*"), "it's(1)!~*");
    }

    #[test]
    fn test_encode_blob_path_per_segment() {
        assert_eq!(
            encode_blob_path("10011090/día 1/2023_cm005.mp4"),
            "10011090/d%C3%ADa%201/2023_cm005.mp4"
        );
        assert_eq!(
            encode_blob_path("10031897/ día 1/images/3177842281.png"),
            "10031897/%20d%C3%ADa%201/images/3177842281.png"
        );
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(
            ByteRange::parse("bytes=0-1048575"),
            Some(ByteRange {
                start: 0,
                end: Some(1048575)
            })
        );
        assert_eq!(
            ByteRange::parse("bytes=100-"),
            Some(ByteRange {
                start: 100,
                end: None
            })
        );
        assert_eq!(ByteRange::parse("bytes=-500"), None);
        assert_eq!(ByteRange::parse("bytes=10-5"), None);
        assert_eq!(ByteRange::parse("bytes=0-1,5-9"), None);
        assert_eq!(ByteRange::parse("items=0-1"), None);
    }

    #[test]
    fn test_range_header_value() {
        let range = ByteRange::parse("bytes=5-").unwrap();
        assert_eq!(range.header_value(), "bytes=5-");
        let range = ByteRange::parse("bytes=0-9").unwrap();
        assert_eq!(range.header_value(), "bytes=0-9");
    }

    #[test]
    fn test_content_type_for_path() {
        assert_eq!(content_type_for_path("a/2023_cw003.MP4"), "video/mp4");
        assert_eq!(content_type_for_path("x/images/1.png"), "image/png");
        assert_eq!(content_type_for_path("x/images/1.jpeg"), "image/jpeg");
        assert_eq!(content_type_for_path("noext"), "application/octet-stream");
    }

    #[test]
    fn test_meta_or_fills_missing() {
        let get = BlobMeta {
            content_length: Some(10),
            ..Default::default()
        };
        let head = BlobMeta {
            content_type: Some("video/mp4".into()),
            content_length: Some(99),
            ..Default::default()
        };
        let merged = get.or(head);
        assert_eq!(merged.content_length, Some(10));
        assert_eq!(merged.content_type.as_deref(), Some("video/mp4"));
    }
}
