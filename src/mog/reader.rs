//! Reads [`MogMetadata`] from the head of a MOG file.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use super::metadata::{MogImageMetadata, MogMetadata};
use crate::error::{MogError, TiffError};
use crate::format::tiff::{Ifd, TiffReader, TiffTag, COMPRESSION_JPEG, PHOTOMETRIC_RGB_BIT};
use crate::io::SeekableReader;
use crate::tiles::{TileCoordinates, MAX_ZOOM};

/// Parse the header of the MOG at `source_url`, anchored at `anchor`.
///
/// `stream` must start at byte 0 of the file. Mask IFDs are skipped; the
/// remaining IFDs are taken to be ordered from most to least detailed, the
/// last one covering exactly the anchor tile.
pub async fn read_mog_metadata<R: AsyncRead + Unpin>(
    source_url: &str,
    anchor: TileCoordinates,
    stream: R,
) -> Result<MogMetadata, MogError> {
    let started = Instant::now();

    let mut reader = TiffReader::new(SeekableReader::new(stream)).await?;
    let ifds = reader.read_ifds().await?;
    let total_ifds = ifds.len();

    let mut image_ifds = Vec::with_capacity(ifds.len());
    for ifd in ifds {
        if is_image_ifd(&ifd)? {
            image_ifds.push(ifd);
        }
    }

    let mut images_by_zoom = BTreeMap::new();
    if let Some(last) = image_ifds.len().checked_sub(1) {
        let max_zoom = anchor.zoom as usize + last;
        let max_zoom = u8::try_from(max_zoom)
            .ok()
            .filter(|&zoom| zoom <= MAX_ZOOM)
            .ok_or_else(|| {
                MogError::DataConsistency(format!(
                    "{source_url}: {} levels above zoom {} go past zoom {MAX_ZOOM}",
                    image_ifds.len(),
                    anchor.zoom
                ))
            })?;
        for (i, ifd) in image_ifds.iter().enumerate() {
            let zoom = max_zoom - i as u8;
            let origin_tile = anchor.origin_at_zoom(zoom).ok_or_else(|| {
                MogError::DataConsistency(format!(
                    "{source_url}: anchor {anchor} has no descendant at zoom {zoom}"
                ))
            })?;
            let image = image_metadata(ifd, origin_tile)?;
            images_by_zoom.insert(zoom, Arc::new(image));
        }
    }

    debug!(
        source_url,
        ifds = total_ifds,
        levels = images_by_zoom.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Read MOG header"
    );

    Ok(MogMetadata {
        source_url: source_url.to_string(),
        bounds: anchor,
        images_by_zoom,
    })
}

/// Imagery IFDs have the RGB bit in PhotometricInterpretation; masks do not.
fn is_image_ifd(ifd: &Ifd) -> Result<bool, TiffError> {
    let photometric = ifd.require_u64(TiffTag::PhotometricInterpretation)?;
    Ok(photometric & PHOTOMETRIC_RGB_BIT != 0)
}

fn image_metadata(ifd: &Ifd, origin_tile: TileCoordinates) -> Result<MogImageMetadata, TiffError> {
    if let Some(compression) = ifd.get_u64(TiffTag::Compression)? {
        if compression != COMPRESSION_JPEG {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::Compression.name(),
                message: format!("expected JPEG ({COMPRESSION_JPEG}), got {compression}"),
            });
        }
    }

    let tile_offsets = ifd
        .get_u64_array(TiffTag::TileOffsets)?
        .ok_or(TiffError::MissingTag(TiffTag::TileOffsets.name()))?
        .to_vec();
    let byte_counts = ifd
        .get_u64_array(TiffTag::TileByteCounts)?
        .ok_or(TiffError::MissingTag(TiffTag::TileByteCounts.name()))?
        .to_vec();

    Ok(MogImageMetadata {
        origin_tile,
        tile_width: require_u32(ifd, TiffTag::TileWidth)?,
        tile_length: require_u32(ifd, TiffTag::TileLength)?,
        image_width: require_u32(ifd, TiffTag::ImageWidth)?,
        image_length: require_u32(ifd, TiffTag::ImageLength)?,
        tile_offsets,
        byte_counts,
        jpeg_tables: ifd
            .get_bytes(TiffTag::JpegTables)?
            .map(Bytes::from)
            .unwrap_or_default(),
        no_data_value: no_data_value(ifd)?,
    })
}

fn require_u32(ifd: &Ifd, tag: TiffTag) -> Result<u32, TiffError> {
    let value = ifd.require_u64(tag)?;
    u32::try_from(value).map_err(|_| TiffError::InvalidTagValue {
        tag: tag.name(),
        message: format!("{value} does not fit in 32 bits"),
    })
}

fn no_data_value(ifd: &Ifd) -> Result<Option<f64>, TiffError> {
    let Some(text) = ifd.get_ascii(TiffTag::GdalNoData)? else {
        return Ok(None);
    };
    match text.trim().parse::<f64>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            warn!(ifd_offset = ifd.offset, value = text, "Ignoring unparseable GDAL_NODATA");
            Ok(None)
        }
    }
}
