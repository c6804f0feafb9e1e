use bytes::Bytes;
use image::{ImageFormat, RgbaImage};

use super::metadata::MogTileMetadata;
use crate::error::MogError;
use crate::format::frame_tile;

/// A fetched tile: its metadata and a standalone JPEG.
#[derive(Debug, Clone)]
pub struct MogTile {
    pub metadata: MogTileMetadata,

    /// Framed JPEG, decodable on its own
    pub data: Bytes,
}

impl MogTile {
    /// Frame a raw tile payload with its level's JPEG tables.
    pub fn from_payload(metadata: MogTileMetadata, payload: &[u8]) -> Self {
        let data = frame_tile(&metadata.jpeg_tables, payload, metadata.width, metadata.height);
        Self { metadata, data }
    }

    /// Decode to RGBA.
    ///
    /// When the level declares a no-data value, pixels whose channels all
    /// equal it become fully transparent. GDAL writes black (0) for areas
    /// outside the imagery footprint.
    pub fn decode_rgba(&self) -> Result<RgbaImage, MogError> {
        let decoded = image::load_from_memory_with_format(&self.data, ImageFormat::Jpeg)
            .map_err(|e| {
                MogError::Decode(format!("{}: {}", self.metadata.tile_coordinates, e))
            })?;
        let mut rgba = decoded.to_rgba8();

        if let Some(no_data) = self.metadata.no_data_value {
            let no_data = no_data.clamp(0.0, 255.0).round() as u8;
            for pixel in rgba.pixels_mut() {
                if pixel.0[..3].iter().all(|&c| c == no_data) {
                    pixel.0[3] = 0;
                }
            }
        }
        Ok(rgba)
    }
}
