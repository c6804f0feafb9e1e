//! MOG (map-optimized GeoTIFF) client.
//!
//! A MOG is a tiled, JPEG-compressed TIFF holding one pyramid level per IFD,
//! laid out so that all headers come first and every tile can be fetched
//! with a byte-range request. This module resolves tiles to files, reads and
//! caches file headers, plans consolidated range requests, and streams
//! standalone JPEG tiles back to the caller.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use mog_client::{Bounds, FileByteSource, LatLng, MogClient, MogCollection};
//!
//! let collection = MogCollection::two_tier("imagery", 8, 14);
//! let client = MogClient::new(collection, Arc::new(FileByteSource::new("/data")));
//!
//! let bounds = Bounds::new(LatLng::new(-1.0, 36.7), LatLng::new(-0.9, 36.9));
//! let requests = client.build_tiles_requests(&bounds, None).await?;
//! let mut tiles = client.get_tiles(requests);
//! while let Some(tile) = tiles.next().await {
//!     let tile = tile?;
//!     println!("{} ({} bytes)", tile.metadata.tile_coordinates, tile.data.len());
//! }
//! ```

mod cache;
mod client;
mod downloader;
mod metadata;
mod reader;
mod request;
mod source;
mod tile;

pub use cache::{MetadataCache, MetadataResult, DEFAULT_METADATA_CACHE_CAPACITY};
pub use client::{MogClient, MogClientConfig, TileStream, DEFAULT_MAX_CONCURRENT_REQUESTS};
pub use downloader::{DownloadedTile, MogTileDownloader};
pub use metadata::{MogImageMetadata, MogMetadata, MogTileMetadata};
pub use reader::read_mog_metadata;
pub use request::{consolidate, MogTilesRequest, DEFAULT_MAX_OVER_FETCH_PER_TILE};
pub use source::{MogCollection, MogSource};
pub use tile::MogTile;
