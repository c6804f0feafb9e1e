//! Mapping from tiles to the MOG files that hold them.
//!
//! A [`MogSource`] covers a contiguous zoom range. Every file of a source is
//! anchored at a tile at the range's minimum zoom, and holds that tile plus
//! all of its descendants down to the range's maximum zoom.
//!
//! The usual deployment is two-tiered:
//!
//! ```text
//! zooms 0..=min-1   {base}/world.tif          one overview file
//! zooms min..=max   {base}/{min}/{x}/{y}.tif  one file per tile at `min`
//! ```

use std::ops::RangeInclusive;

use crate::error::MogError;
use crate::tiles::{TileCoordinates, MAX_ZOOM};

// =============================================================================
// MogSource
// =============================================================================

/// A family of MOG files covering one zoom range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MogSource {
    zoom_range: RangeInclusive<u8>,
    path_template: String,
}

impl MogSource {
    /// Create a source from a zoom range and a path template.
    ///
    /// The tokens `{x}` and `{y}` in the template are replaced with the
    /// coordinates of the file's anchor tile. Zooms beyond [`MAX_ZOOM`] are
    /// never covered, whatever the range says.
    pub fn new(zoom_range: RangeInclusive<u8>, path_template: impl Into<String>) -> Self {
        Self {
            zoom_range,
            path_template: path_template.into(),
        }
    }

    pub fn zoom_range(&self) -> &RangeInclusive<u8> {
        &self.zoom_range
    }

    pub fn min_zoom(&self) -> u8 {
        *self.zoom_range.start()
    }

    pub fn max_zoom(&self) -> u8 {
        *self.zoom_range.end()
    }

    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    /// Whether this source serves tiles at `zoom`.
    pub fn covers(&self, zoom: u8) -> bool {
        zoom <= MAX_ZOOM && self.zoom_range.contains(&zoom)
    }

    fn check_zoom(&self, zoom: u8) -> Result<(), MogError> {
        if self.covers(zoom) {
            Ok(())
        } else {
            Err(MogError::ZoomOutOfRange {
                zoom,
                min: self.min_zoom(),
                max: self.max_zoom(),
            })
        }
    }

    /// Path of the file containing `tile`.
    pub fn mog_path(&self, tile: &TileCoordinates) -> Result<String, MogError> {
        self.check_zoom(tile.zoom)?;
        let anchor = self.mog_bounds_for_tile(tile)?;
        Ok(self
            .path_template
            .replace("{x}", &anchor.x.to_string())
            .replace("{y}", &anchor.y.to_string()))
    }

    /// Anchor tile of the file containing `tile`.
    ///
    /// This is the tile's ancestor at the source's minimum zoom, or the tile
    /// itself when it already sits at that zoom.
    pub fn mog_bounds_for_tile(&self, tile: &TileCoordinates) -> Result<TileCoordinates, MogError> {
        let out_of_range = || MogError::ZoomOutOfRange {
            zoom: tile.zoom,
            min: self.min_zoom(),
            max: self.max_zoom(),
        };
        if tile.zoom < self.min_zoom() || tile.zoom > MAX_ZOOM {
            return Err(out_of_range());
        }
        tile.origin_at_zoom(self.min_zoom()).ok_or_else(out_of_range)
    }
}

// =============================================================================
// MogCollection
// =============================================================================

/// The configured set of sources, resolved by zoom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MogCollection {
    sources: Vec<MogSource>,
}

impl MogCollection {
    pub fn new(sources: Vec<MogSource>) -> Self {
        Self { sources }
    }

    /// An overview file for low zooms plus one file per tile at
    /// `hi_res_min_zoom` for the detailed zooms.
    ///
    /// With `hi_res_min_zoom == 0` there are no overview zooms and only the
    /// per-tile source is created.
    pub fn two_tier(base_path: &str, hi_res_min_zoom: u8, hi_res_max_zoom: u8) -> Self {
        let base = base_path.trim_end_matches('/');
        let mut sources = Vec::with_capacity(2);
        if hi_res_min_zoom > 0 {
            sources.push(MogSource::new(
                0..=hi_res_min_zoom - 1,
                format!("{base}/world.tif"),
            ));
        }
        sources.push(MogSource::new(
            hi_res_min_zoom..=hi_res_max_zoom,
            format!("{base}/{hi_res_min_zoom}/{{x}}/{{y}}.tif"),
        ));
        Self::new(sources)
    }

    pub fn sources(&self) -> &[MogSource] {
        &self.sources
    }

    /// The source serving `zoom`, if any.
    pub fn mog_source(&self, zoom: u8) -> Option<&MogSource> {
        self.sources.iter().find(|source| source.covers(zoom))
    }

    /// Lowest zoom served by any source.
    pub fn min_zoom(&self) -> Option<u8> {
        self.sources.iter().map(MogSource::min_zoom).min()
    }

    /// Highest zoom served by any source.
    pub fn max_zoom(&self) -> Option<u8> {
        self.sources.iter().map(MogSource::max_zoom).max()
    }

    /// Full zoom range spanned by the sources.
    pub fn zoom_range(&self) -> Option<RangeInclusive<u8>> {
        Some(self.min_zoom()?..=self.max_zoom()?)
    }
}

// =============================================================================
// Tests
// =============================================================================
