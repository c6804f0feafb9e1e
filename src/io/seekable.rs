//! Seekable view over a forward-only byte stream.
//!
//! Network responses can only be consumed front to back, but TIFF headers
//! point back and forth: an IFD entry names an offset, the reader jumps there,
//! then returns to the next entry. [`SeekableReader`] keeps the bytes it has
//! already consumed so that such backward jumps can be served from memory
//! without reopening the source.
//!
//! # Buffer Window
//!
//! ```text
//!  buffer_start            position              consumed_end
//!       |----------------------|------------------------|~~~~ inner stream ~~~~
//!       <------------- retained history --------------->
//! ```
//!
//! History starts at the stream origin and is only discarded by
//! [`SeekableReader::mark`], which drops everything before the mark. Seeking
//! before the retained window is a caller bug and fails with
//! [`IoError::SeekBeforeBuffer`].

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::IoError;

/// Size of each read from the inner stream.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Seek/mark/reset over any `AsyncRead`.
///
/// All positions are absolute object offsets. A reader created with
/// [`SeekableReader::with_base_offset`] over a ranged stream starting at byte
/// `k` reports its first byte as position `k`.
pub struct SeekableReader<R> {
    inner: R,

    /// Bytes consumed from `inner` that are still retained
    buffer: Vec<u8>,

    /// Absolute offset of `buffer[0]`
    buffer_start: u64,

    /// Absolute offset of the next byte to hand out
    position: u64,

    /// Position restored by `reset()`
    mark: u64,
}

impl<R: AsyncRead + Unpin> SeekableReader<R> {
    /// Wrap a stream whose first byte is object offset 0.
    pub fn new(inner: R) -> Self {
        Self::with_base_offset(inner, 0)
    }

    /// Wrap a stream whose first byte is object offset `base`.
    pub fn with_base_offset(inner: R, base: u64) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            buffer_start: base,
            position: base,
            mark: base,
        }
    }

    /// Current absolute position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Absolute offset one past the last byte pulled from the inner stream.
    fn consumed_end(&self) -> u64 {
        self.buffer_start + self.buffer.len() as u64
    }

    /// Pull from the inner stream until `end` has been consumed.
    async fn fill_to(&mut self, end: u64) -> Result<(), IoError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        while self.consumed_end() < end {
            let n = self
                .inner
                .read(&mut chunk)
                .await
                .map_err(|e| IoError::Connection(e.to_string()))?;
            if n == 0 {
                return Err(IoError::UnexpectedEof {
                    offset: self.consumed_end(),
                });
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Read one byte and advance.
    pub async fn read_u8(&mut self) -> Result<u8, IoError> {
        self.fill_to(self.position + 1).await?;
        let byte = self.buffer[(self.position - self.buffer_start) as usize];
        self.position += 1;
        Ok(byte)
    }

    /// Read exactly `len` bytes and advance past them.
    pub async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, IoError> {
        let end = self.position + len as u64;
        self.fill_to(end).await?;
        let from = (self.position - self.buffer_start) as usize;
        let bytes = self.buffer[from..from + len].to_vec();
        self.position = end;
        Ok(bytes)
    }

    /// Advance `count` bytes without returning them.
    pub async fn skip(&mut self, count: u64) -> Result<(), IoError> {
        self.seek(self.position + count).await
    }

    /// Move to absolute position `target`.
    ///
    /// Forward seeks consume the inner stream; backward seeks rewind within the
    /// retained history.
    pub async fn seek(&mut self, target: u64) -> Result<(), IoError> {
        if target < self.buffer_start {
            return Err(IoError::SeekBeforeBuffer {
                target,
                buffer_start: self.buffer_start,
            });
        }
        self.fill_to(target).await?;
        self.position = target;
        Ok(())
    }

    /// Remember the current position and drop history before it.
    pub fn mark(&mut self) {
        let keep_from = self.position.min(self.consumed_end());
        let drop = (keep_from - self.buffer_start) as usize;
        self.buffer.drain(..drop);
        self.buffer_start = keep_from;
        self.mark = self.position;
    }

    /// Return to the last mark (or the stream origin if never marked).
    pub fn reset(&mut self) {
        self.position = self.mark;
    }
}
