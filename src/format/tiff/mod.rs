//! Streaming TIFF header reader for MOG files.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian,
//!   MM = big-endian) in the header. All multi-byte values are read in that
//!   order.
//!
//! - **IFD (Image File Directory)**: One per pyramid level, plus one per
//!   internal transparency mask. Masks are told apart by their
//!   PhotometricInterpretation.
//!
//! - **Inline vs offset values**: Values up to 4 bytes live in the IFD entry;
//!   larger ones are stored at an offset the entry points to.
//!
//! Only classic TIFF is read. BigTIFF headers are rejected.

mod parser;
mod tags;

pub use parser::{ByteOrder, Ifd, TagValue, TiffHeader, TiffReader, IFD_ENTRY_SIZE, TIFF_HEADER_SIZE};
pub use tags::{FieldType, TiffTag, COMPRESSION_JPEG, PHOTOMETRIC_RGB_BIT};
