//! Streaming TIFF header and IFD parsing.
//!
//! Headers are read from a forward-only stream through [`SeekableReader`].
//! The walk follows the layout GDAL writes for cloud-optimized files, where
//! every IFD and its out-of-line tag data precede the tile payloads:
//!
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (42 = 0x002A)
//! Bytes 4-7: Offset to first IFD (4 bytes)
//! ```
//!
//! Each IFD is a 2-byte entry count, 12-byte entries, and a 4-byte offset to
//! the next IFD (0 terminates the chain). For every entry the reader marks the
//! entry start, follows the value offset if the value is out of line, then
//! resets to the mark and skips to the next entry. Marking discards history,
//! so an IFD chain that points backwards fails with
//! [`IoError::SeekBeforeBuffer`](crate::error::IoError::SeekBeforeBuffer).

use std::collections::BTreeMap;

use tokio::io::AsyncRead;
use tracing::trace;

use super::tags::{FieldType, TiffTag};
use crate::error::TiffError;
use crate::io::SeekableReader;

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes indicating little-endian byte order ("II" for Intel)
const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;

/// Magic bytes indicating big-endian byte order ("MM" for Motorola)
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

/// Version number for classic TIFF
const VERSION_TIFF: u16 = 42;

/// Version number for BigTIFF
const VERSION_BIGTIFF: u16 = 43;

/// Size of classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of one classic IFD entry: tag, type, count, value/offset
pub const IFD_ENTRY_SIZE: u64 = 12;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian ("II" = Intel)
    LittleEndian,
    /// Big-endian ("MM" = Motorola)
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from the first two bytes of `bytes`.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let raw = [bytes[0], bytes[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        }
    }

    /// Read a u32 from the first four bytes of `bytes`.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed classic TIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Offset to the first IFD in the file
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF header from its first 8 bytes.
    ///
    /// # Errors
    /// - `InvalidMagic` if byte order bytes are not II or MM
    /// - `UnsupportedBigTiff` for version 43
    /// - `InvalidVersion` for anything else but 42
    pub fn parse(bytes: &[u8; TIFF_HEADER_SIZE]) -> Result<Self, TiffError> {
        // Read as little-endian because we're matching fixed byte patterns
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        match byte_order.read_u16(&bytes[2..4]) {
            VERSION_TIFF => Ok(TiffHeader {
                byte_order,
                first_ifd_offset: byte_order.read_u32(&bytes[4..8]) as u64,
            }),
            VERSION_BIGTIFF => Err(TiffError::UnsupportedBigTiff),
            version => Err(TiffError::InvalidVersion(version)),
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// Decoded value of a recognised tag.
#[derive(Debug, Clone)]
pub enum TagValue {
    /// BYTE, SHORT or LONG values widened to u64
    Unsigned(Vec<u64>),

    /// ASCII value without its trailing NULs
    Ascii(String),

    /// UNDEFINED bytes (e.g. JPEGTables)
    Undefined(Vec<u8>),
}

/// One Image File Directory, reduced to the tags in [`TiffTag`].
#[derive(Debug, Clone, Default)]
pub struct Ifd {
    /// Offset of this IFD in the file
    pub offset: u64,

    entries: BTreeMap<u16, TagValue>,
}

impl Ifd {
    /// Raw value of a tag, if present.
    pub fn get(&self, tag: TiffTag) -> Option<&TagValue> {
        self.entries.get(&tag.as_u16())
    }

    /// Whether the tag was present.
    pub fn contains(&self, tag: TiffTag) -> bool {
        self.entries.contains_key(&tag.as_u16())
    }

    /// First value of an integer tag.
    pub fn get_u64(&self, tag: TiffTag) -> Result<Option<u64>, TiffError> {
        Ok(self.get_u64_array(tag)?.and_then(|values| values.first().copied()))
    }

    /// First value of an integer tag, failing if absent.
    pub fn require_u64(&self, tag: TiffTag) -> Result<u64, TiffError> {
        self.get_u64(tag)?.ok_or(TiffError::MissingTag(tag.name()))
    }

    /// All values of an integer tag.
    pub fn get_u64_array(&self, tag: TiffTag) -> Result<Option<&[u64]>, TiffError> {
        match self.get(tag) {
            None => Ok(None),
            Some(TagValue::Unsigned(values)) => Ok(Some(values)),
            Some(_) => Err(invalid(tag, "expected an integer value")),
        }
    }

    /// Bytes of an UNDEFINED or BYTE tag.
    pub fn get_bytes(&self, tag: TiffTag) -> Result<Option<Vec<u8>>, TiffError> {
        match self.get(tag) {
            None => Ok(None),
            Some(TagValue::Undefined(bytes)) => Ok(Some(bytes.clone())),
            Some(TagValue::Unsigned(values)) => values
                .iter()
                .map(|&v| u8::try_from(v).map_err(|_| invalid(tag, "value exceeds a byte")))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(TagValue::Ascii(_)) => Err(invalid(tag, "expected byte data")),
        }
    }

    /// Text of an ASCII tag.
    pub fn get_ascii(&self, tag: TiffTag) -> Result<Option<&str>, TiffError> {
        match self.get(tag) {
            None => Ok(None),
            Some(TagValue::Ascii(text)) => Ok(Some(text)),
            Some(_) => Err(invalid(tag, "expected ASCII text")),
        }
    }

    /// Number of recognised tags in this IFD.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn invalid(tag: TiffTag, message: &str) -> TiffError {
    TiffError::InvalidTagValue {
        tag: tag.name(),
        message: message.to_string(),
    }
}

// =============================================================================
// TiffReader
// =============================================================================

/// Walks the IFD chain of a TIFF stream.
pub struct TiffReader<R> {
    reader: SeekableReader<R>,
    header: TiffHeader,
}

impl<R: AsyncRead + Unpin> TiffReader<R> {
    /// Read and validate the header at the start of `reader`.
    pub async fn new(mut reader: SeekableReader<R>) -> Result<Self, TiffError> {
        let bytes = reader.read_exact(TIFF_HEADER_SIZE).await?;
        let mut raw = [0u8; TIFF_HEADER_SIZE];
        raw.copy_from_slice(&bytes);
        let header = TiffHeader::parse(&raw)?;
        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    /// Read every IFD in chain order.
    pub async fn read_ifds(&mut self) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut next = self.header.first_ifd_offset;
        while next != 0 {
            let (ifd, following) = self.read_ifd(next).await?;
            ifds.push(ifd);
            next = following;
        }
        Ok(ifds)
    }

    /// Read the IFD at `offset`, returning it with the offset of the next one.
    async fn read_ifd(&mut self, offset: u64) -> Result<(Ifd, u64), TiffError> {
        self.reader.seek(offset).await?;
        let entry_count = self.read_u16().await?;
        trace!(offset, entry_count, "Reading IFD");

        let mut ifd = Ifd {
            offset,
            entries: BTreeMap::new(),
        };
        for _ in 0..entry_count {
            self.reader.mark();
            if let Some((tag, value)) = self.read_entry().await? {
                ifd.entries.insert(tag.as_u16(), value);
            }
            self.reader.reset();
            self.reader.skip(IFD_ENTRY_SIZE).await?;
        }

        let next = self.read_u32().await? as u64;
        Ok((ifd, next))
    }

    /// Decode the entry at the current position, if its tag is recognised.
    async fn read_entry(&mut self) -> Result<Option<(TiffTag, TagValue)>, TiffError> {
        let tag_id = self.read_u16().await?;
        let type_id = self.read_u16().await?;
        let count = self.read_u32().await?;

        let Some(tag) = TiffTag::from_u16(tag_id) else {
            return Ok(None);
        };
        let field_type = FieldType::from_u16(type_id).ok_or(TiffError::UnknownFieldType(type_id))?;

        let byte_len = field_type.size_in_bytes() * count as usize;
        let raw = if field_type.fits_inline(count) {
            let inline = self.reader.read_exact(FieldType::INLINE_THRESHOLD).await?;
            inline[..byte_len].to_vec()
        } else {
            let value_offset = self.read_u32().await? as u64;
            self.reader.seek(value_offset).await?;
            self.reader.read_exact(byte_len).await?
        };

        let value = self.decode(tag, field_type, &raw)?;
        Ok(Some((tag, value)))
    }

    fn decode(&self, tag: TiffTag, field_type: FieldType, raw: &[u8]) -> Result<TagValue, TiffError> {
        let order = self.header.byte_order;
        let value = match field_type {
            FieldType::Byte => TagValue::Unsigned(raw.iter().map(|&b| b as u64).collect()),
            FieldType::Short => TagValue::Unsigned(
                raw.chunks_exact(2)
                    .map(|c| order.read_u16(c) as u64)
                    .collect(),
            ),
            FieldType::Long => TagValue::Unsigned(
                raw.chunks_exact(4)
                    .map(|c| order.read_u32(c) as u64)
                    .collect(),
            ),
            FieldType::Ascii => {
                let text = String::from_utf8_lossy(raw);
                TagValue::Ascii(text.trim_end_matches('\0').to_string())
            }
            FieldType::Undefined => TagValue::Undefined(raw.to_vec()),
            other => {
                return Err(invalid(
                    tag,
                    &format!("unsupported field type {:?}", other),
                ))
            }
        };
        Ok(value)
    }

    async fn read_u16(&mut self) -> Result<u16, TiffError> {
        let bytes = self.reader.read_exact(2).await?;
        Ok(self.header.byte_order.read_u16(&bytes))
    }

    async fn read_u32(&mut self) -> Result<u32, TiffError> {
        let bytes = self.reader.read_exact(4).await?;
        Ok(self.header.byte_order.read_u32(&bytes))
    }
}

// =============================================================================
// Tests
// =============================================================================
