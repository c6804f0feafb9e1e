//! Parsed MOG headers.
//!
//! A MOG file holds one pyramid level per RGB IFD. [`MogImageMetadata`]
//! describes one level: where its tile grid sits in the world, and where each
//! tile's bytes live in the file. [`MogMetadata`] groups the levels of one file
//! by zoom.
//!
//! None of these types implement `PartialEq` or `Hash`. They hold large offset
//! arrays and are compared by identity (through `Arc`) where it matters.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::MogError;
use crate::io::ByteRange;
use crate::tiles::TileCoordinates;

// =============================================================================
// MogImageMetadata
// =============================================================================

/// Header of one pyramid level.
///
/// ```compile_fail
/// fn requires_eq<T: PartialEq>() {}
/// requires_eq::<mog_client::MogImageMetadata>();
/// ```
#[derive(Debug, Clone)]
pub struct MogImageMetadata {
    /// First tile of the level's grid
    pub origin_tile: TileCoordinates,

    pub tile_width: u32,
    pub tile_length: u32,
    pub image_width: u32,
    pub image_length: u32,

    /// Offset of each tile, row-major from the origin tile
    pub tile_offsets: Vec<u64>,

    /// Byte count of each tile, parallel to `tile_offsets`
    pub byte_counts: Vec<u64>,

    /// Shared JPEG tables (may be empty)
    pub jpeg_tables: Bytes,

    /// GDAL no-data value, when the file declares one
    pub no_data_value: Option<f64>,
}

impl MogImageMetadata {
    /// Number of tile columns.
    pub fn tile_count_x(&self) -> u32 {
        self.image_width.checked_div(self.tile_width).unwrap_or(0)
    }

    /// Number of tile rows.
    pub fn tile_count_y(&self) -> u32 {
        self.image_length.checked_div(self.tile_length).unwrap_or(0)
    }

    /// Whether `(x, y)` falls inside this level's tile grid.
    pub fn has_tile(&self, x: u32, y: u32) -> bool {
        let origin = self.origin_tile;
        x >= origin.x
            && y >= origin.y
            && (x - origin.x) < self.tile_count_x()
            && (y - origin.y) < self.tile_count_y()
    }

    /// Inclusive byte range of tile `(x, y)`.
    ///
    /// Returns `Ok(None)` for tiles outside the grid and for sparse tiles
    /// (byte count 0). Fails with [`MogError::DataConsistency`] when the grid
    /// says the tile exists but the offset arrays are too short for it.
    pub fn byte_range(&self, x: u32, y: u32) -> Result<Option<ByteRange>, MogError> {
        if !self.has_tile(x, y) {
            return Ok(None);
        }
        let idx = (y - self.origin_tile.y) as usize * self.tile_count_x() as usize
            + (x - self.origin_tile.x) as usize;
        let (Some(&offset), Some(&count)) = (self.tile_offsets.get(idx), self.byte_counts.get(idx))
        else {
            return Err(MogError::DataConsistency(format!(
                "tile ({x}, {y}) has index {idx} but the level has {} offsets and {} byte counts",
                self.tile_offsets.len(),
                self.byte_counts.len()
            )));
        };
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(offset..=offset + count - 1))
    }

    /// Everything needed to fetch and frame tile `coordinates`.
    pub fn tile_metadata(
        &self,
        coordinates: TileCoordinates,
    ) -> Result<Option<MogTileMetadata>, MogError> {
        let Some(byte_range) = self.byte_range(coordinates.x, coordinates.y)? else {
            return Ok(None);
        };
        Ok(Some(MogTileMetadata {
            tile_coordinates: coordinates,
            width: self.tile_width,
            height: self.tile_length,
            jpeg_tables: self.jpeg_tables.clone(),
            byte_range,
            no_data_value: self.no_data_value,
        }))
    }
}

// =============================================================================
// MogMetadata
// =============================================================================

/// Header of one MOG file.
#[derive(Debug, Clone)]
pub struct MogMetadata {
    /// Path the header was read from
    pub source_url: String,

    /// Anchor tile of the file
    pub bounds: TileCoordinates,

    /// One level per zoom
    pub images_by_zoom: BTreeMap<u8, Arc<MogImageMetadata>>,
}

impl MogMetadata {
    /// Level for `zoom`, if the file has one.
    pub fn image_metadata(&self, zoom: u8) -> Option<&MogImageMetadata> {
        self.images_by_zoom.get(&zoom).map(Arc::as_ref)
    }

    /// Zooms present in the file.
    pub fn zoom_range(&self) -> Option<RangeInclusive<u8>> {
        let min = *self.images_by_zoom.keys().next()?;
        let max = *self.images_by_zoom.keys().next_back()?;
        Some(min..=max)
    }
}

// =============================================================================
// MogTileMetadata
// =============================================================================

/// Location and framing data for one tile.
///
/// ```compile_fail
/// fn requires_hash<T: std::hash::Hash>() {}
/// requires_hash::<mog_client::MogTileMetadata>();
/// ```
#[derive(Debug, Clone)]
pub struct MogTileMetadata {
    pub tile_coordinates: TileCoordinates,
    pub width: u32,
    pub height: u32,
    pub jpeg_tables: Bytes,
    pub byte_range: ByteRange,
    pub no_data_value: Option<f64>,
}

// =============================================================================
// Tests
// =============================================================================
