//! # MOG Client
//!
//! A client for map-optimized GeoTIFFs (MOGs): tiled, JPEG-compressed TIFF
//! pyramids stored in S3-compatible object storage and read with byte-range
//! requests.
//!
//! A MOG holds one pyramid level per zoom. All headers sit at the front of
//! the file, so a single forward pass over the header locates every tile,
//! and each tile can then be fetched on its own or merged with its
//! neighbours into one ranged request.
//!
//! ## Features
//!
//! - **Range-based streaming**: Fetches only the bytes needed for each tile
//! - **Header cache**: Parsed headers are cached, and concurrent lookups of
//!   one file share a single fetch
//! - **Request consolidation**: Neighbouring tiles are fetched together when
//!   the gap between them is small
//! - **Standalone tiles**: Abbreviated tile data is framed with the level's
//!   JPEG tables into a JPEG any decoder accepts
//!
//! ## Architecture
//!
//! - [`tiles`] - Slippy-map tile and pixel coordinates
//! - [`io`] - Byte sources (S3, local files) and the seekable stream reader
//! - [`mod@format`] - TIFF header parsing and JPEG framing
//! - [`mog`] - Sources, metadata, cache, request planning and the client
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mog_client::{create_s3_client, MogClient, MogCollection, S3ByteSource, TileCoordinates};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mog_client::MogError> {
//!     let s3 = create_s3_client(None, "us-east-1").await;
//!     let source = Arc::new(S3ByteSource::new(s3, "basemaps"));
//!     let client = MogClient::new(MogCollection::two_tier("imagery", 8, 14), source);
//!
//!     if let Some(tile) = client.get_tile(TileCoordinates::new(301, 384, 10)).await? {
//!         std::fs::write("tile.jpg", &tile.data).ok();
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod mog;
pub mod tiles;

// Re-export commonly used types
pub use config::{Cli, Command, InspectConfig, PrefetchConfig, SourceConfig, Storage, TileConfig};
pub use error::{IoError, MogError, TiffError};
pub use io::{create_s3_client, ByteRange, ByteSource, ByteStream, FileByteSource, S3ByteSource, SeekableReader};
pub use mog::{
    consolidate, DownloadedTile, MetadataCache, MogClient, MogClientConfig, MogCollection,
    MogImageMetadata, MogMetadata, MogSource, MogTile, MogTileDownloader, MogTileMetadata,
    MogTilesRequest, TileStream,
};
pub use tiles::{Bounds, LatLng, PixelCoordinates, TileCoordinates, MAX_ZOOM, TILE_SIZE};
