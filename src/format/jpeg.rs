//! JPEG tile framing.
//!
//! Tiles inside a MOG are abbreviated JPEG streams: the quantization (DQT)
//! and Huffman (DHT) tables they need are stored once per level in the
//! `JPEGTables` tag. A tile only becomes a standalone image once the tables
//! are spliced in front of its scan data.
//!
//! # Framing
//!
//! ```text
//! SOI | APP0 (JFIF) | tables without SOI/EOI | tile without SOI/EOI | EOI
//! ```
//!
//! The JFIF segment carries the tile width and height in its density fields
//! with units set to "no units", i.e. a square-pixel aspect ratio.

use bytes::{BufMut, Bytes, BytesMut};

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// Application segment 0 (JFIF) marker
pub const APP0: [u8; 2] = [0xFF, 0xE0];

/// Length field of the JFIF APP0 segment (excludes the marker itself)
const JFIF_SEGMENT_LENGTH: u16 = 16;

/// Total bytes of the JFIF APP0 segment including its marker
pub const JFIF_APP0_SIZE: usize = 2 + JFIF_SEGMENT_LENGTH as usize;

// =============================================================================
// Segment Helpers
// =============================================================================

/// JFIF APP0 segment with the given density values.
pub fn jfif_app0(x_density: u16, y_density: u16) -> [u8; JFIF_APP0_SIZE] {
    let mut segment = [0u8; JFIF_APP0_SIZE];
    segment[0..2].copy_from_slice(&APP0);
    segment[2..4].copy_from_slice(&JFIF_SEGMENT_LENGTH.to_be_bytes());
    segment[4..9].copy_from_slice(b"JFIF\0");
    // Version 1.02
    segment[9] = 1;
    segment[10] = 2;
    // Density units: none, so the densities only express aspect ratio
    segment[11] = 0;
    segment[12..14].copy_from_slice(&x_density.to_be_bytes());
    segment[14..16].copy_from_slice(&y_density.to_be_bytes());
    // No thumbnail: bytes 16 and 17 stay zero
    segment
}

/// Strip a leading SOI and a trailing EOI, if present.
pub fn strip_soi_eoi(data: &[u8]) -> &[u8] {
    let start = if data.starts_with(&SOI) { 2 } else { 0 };
    let end = if data.len() >= start + 2 && data.ends_with(&EOI) {
        data.len() - 2
    } else {
        data.len()
    };
    &data[start..end]
}

// =============================================================================
// Tile Framing
// =============================================================================

/// Build a standalone JPEG from shared tables and one tile's payload.
///
/// `width` and `height` are the tile dimensions. Values beyond `u16::MAX`
/// saturate in the JFIF density fields; the decoder takes actual dimensions
/// from the frame header in the tables/scan data, not from JFIF.
pub fn frame_tile(tables: &[u8], tile_data: &[u8], width: u32, height: u32) -> Bytes {
    let tables = strip_soi_eoi(tables);
    let tile = strip_soi_eoi(tile_data);

    let mut out = BytesMut::with_capacity(2 + JFIF_APP0_SIZE + tables.len() + tile.len() + 2);
    out.put_slice(&SOI);
    out.put_slice(&jfif_app0(saturate(width), saturate(height)));
    out.put_slice(tables);
    out.put_slice(tile);
    out.put_slice(&EOI);
    out.freeze()
}

fn saturate(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

// =============================================================================
// Tests
// =============================================================================
