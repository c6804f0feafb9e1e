//! Slippy-map tile addressing.

mod coordinates;

pub use coordinates::{Bounds, LatLng, PixelCoordinates, TileCoordinates, MAX_ZOOM, TILE_SIZE};
