//! Byte transport for MOG files.
//!
//! [`ByteSource`] opens forward-only streams over whole objects or inclusive
//! byte ranges. [`SeekableReader`] layers seek/mark/reset on top of such a
//! stream so header parsing can follow offsets without reopening the object.

mod file_source;
mod s3_source;
mod seekable;
mod source;

pub use file_source::FileByteSource;
pub use s3_source::{create_s3_client, S3ByteSource};
pub use seekable::SeekableReader;
pub use source::{range_header, range_len, ByteRange, ByteSource, ByteStream};
