use std::ops::RangeInclusive;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::IoError;

/// Inclusive byte span within an object, `start..=end`.
pub type ByteRange = RangeInclusive<u64>;

/// A forward-only stream of object bytes.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Opens byte streams over objects in remote or local storage.
///
/// This is the only outbound transport seam of the crate. Everything above it
/// (header parsing, tile fetching) works on forward-only streams and never
/// needs the object size up front.
///
/// Implementations must report a missing object as [`IoError::NotFound`] so
/// that callers can tell a legitimately absent file apart from a failure.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Open `path` for reading.
    ///
    /// With `range = None` the whole object is streamed. With
    /// `Some(start..=end)` only that inclusive span is streamed, and the first
    /// byte yielded is the byte at `start`.
    async fn open(&self, path: &str, range: Option<ByteRange>) -> Result<ByteStream, IoError>;
}

/// Formats a range as an HTTP `Range` header value.
pub fn range_header(range: &ByteRange) -> String {
    format!("bytes={}-{}", range.start(), range.end())
}

/// Number of bytes in an inclusive range.
pub fn range_len(range: &ByteRange) -> u64 {
    if range.end() < range.start() {
        0
    } else {
        range.end() - range.start() + 1
    }
}
