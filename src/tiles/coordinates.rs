//! Web Mercator tile and pixel addressing.
//!
//! Tiles follow the standard slippy-map scheme: at zoom `z` the world is
//! split into `2^z × 2^z` tiles of 256×256 pixels, with `(0, 0)` at the
//! north-west corner.

use std::f64::consts::PI;
use std::fmt;

use serde::Serialize;

/// Width and height of a slippy-map tile in pixels.
pub const TILE_SIZE: u64 = 256;

/// Deepest supported zoom. Tile indices up to this zoom fit in `u32`.
pub const MAX_ZOOM: u8 = 30;

/// Latitude limit of the Web Mercator projection.
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

// =============================================================================
// Geographic Types
// =============================================================================

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A geographic rectangle given by its south-west and north-east corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub sw: LatLng,
    pub ne: LatLng,
}

impl Bounds {
    pub fn new(sw: LatLng, ne: LatLng) -> Self {
        Self { sw, ne }
    }

    /// North-west corner.
    pub fn northwest(&self) -> LatLng {
        LatLng::new(self.ne.lat, self.sw.lng)
    }

    /// South-east corner.
    pub fn southeast(&self) -> LatLng {
        LatLng::new(self.sw.lat, self.ne.lng)
    }
}

// =============================================================================
// TileCoordinates
// =============================================================================

/// Address of a single map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileCoordinates {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileCoordinates {
    pub const fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// The single tile covering the whole world at zoom 0.
    pub const WORLD: TileCoordinates = TileCoordinates::new(0, 0, 0);

    /// Returns the tile containing the given position at `zoom`.
    pub fn from_lat_lng(position: LatLng, zoom: u8) -> Self {
        let pixel = PixelCoordinates::from_lat_lng(position, zoom);
        Self::new(
            (pixel.x / TILE_SIZE) as u32,
            (pixel.y / TILE_SIZE) as u32,
            zoom,
        )
    }

    /// Returns every tile at `zoom` that overlaps `bounds`, row by row from
    /// the north-west corner.
    pub fn within_bounds(bounds: &Bounds, zoom: u8) -> Vec<TileCoordinates> {
        let nw = Self::from_lat_lng(bounds.northwest(), zoom);
        let se = Self::from_lat_lng(bounds.southeast(), zoom);
        let mut tiles = Vec::new();
        for y in nw.y..=se.y {
            for x in nw.x..=se.x {
                tiles.push(Self::new(x, y, zoom));
            }
        }
        tiles
    }

    /// Returns the tile with the same north-west corner at another zoom.
    ///
    /// At deeper zooms this is the first descendant; at shallower zooms it is
    /// the ancestor containing this tile.
    ///
    /// Returns `None` when descending past [`MAX_ZOOM`] or when the
    /// descendant's indices would not fit in `u32`.
    pub fn origin_at_zoom(&self, zoom: u8) -> Option<Self> {
        if zoom >= self.zoom {
            if zoom > MAX_ZOOM {
                return None;
            }
            let dz = (zoom - self.zoom) as u32;
            let x = u32::try_from((self.x as u64) << dz).ok()?;
            let y = u32::try_from((self.y as u64) << dz).ok()?;
            Some(Self::new(x, y, zoom))
        } else {
            let dz = (self.zoom - zoom) as u32;
            Some(Self::new(
                self.x.checked_shr(dz).unwrap_or(0),
                self.y.checked_shr(dz).unwrap_or(0),
                zoom,
            ))
        }
    }

    /// Pixel at the given offset from this tile's north-west corner.
    pub fn to_pixel(&self, offset_x: u64, offset_y: u64) -> PixelCoordinates {
        PixelCoordinates::new(
            self.x as u64 * TILE_SIZE + offset_x,
            self.y as u64 * TILE_SIZE + offset_y,
            self.zoom,
        )
    }

    /// Relative path of this tile in a `{z}/{x}/{y}.jpg` tile tree.
    pub fn tile_path(&self) -> String {
        format!("{}/{}/{}.jpg", self.zoom, self.x, self.y)
    }
}

impl fmt::Display for TileCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) @ z{}", self.x, self.y, self.zoom)
    }
}

// =============================================================================
// PixelCoordinates
// =============================================================================

/// Address of a single pixel in the world image at a given zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelCoordinates {
    pub x: u64,
    pub y: u64,
    pub zoom: u8,
}

impl PixelCoordinates {
    pub const fn new(x: u64, y: u64, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// Projects a position to Web Mercator pixel space at `zoom`.
    ///
    /// Latitudes beyond the projection limit are clamped, and the result is
    /// clamped to the last pixel of the world image.
    pub fn from_lat_lng(position: LatLng, zoom: u8) -> Self {
        let world_size = TILE_SIZE << zoom;
        let lat = position.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x_fraction = (position.lng + 180.0) / 360.0;
        let y_fraction = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0;
        let max = (world_size - 1) as f64;
        let x = (x_fraction * world_size as f64).floor().clamp(0.0, max);
        let y = (y_fraction * world_size as f64).floor().clamp(0.0, max);
        Self::new(x as u64, y as u64, zoom)
    }

    /// Scales these coordinates to another zoom level.
    pub fn at_zoom(&self, zoom: u8) -> Self {
        if zoom > self.zoom {
            let dz = (zoom - self.zoom) as u32;
            Self::new(self.x << dz, self.y << dz, zoom)
        } else if zoom < self.zoom {
            let dz = (self.zoom - zoom) as u32;
            Self::new(self.x >> dz, self.y >> dz, zoom)
        } else {
            *self
        }
    }

    /// The tile containing this pixel.
    pub fn tile(&self) -> TileCoordinates {
        TileCoordinates::new(
            (self.x / TILE_SIZE) as u32,
            (self.y / TILE_SIZE) as u32,
            self.zoom,
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
