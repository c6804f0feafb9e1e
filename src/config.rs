//! Configuration management for the MOG client CLI.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `MOG_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Commands
//!
//! - `tile` - Fetch a single tile and write it as a JPEG
//! - `prefetch` - Download every tile of a region into a `{z}/{x}/{y}.jpg` tree
//! - `inspect` - Print the parsed header of the MOG containing a tile
//!
//! # Environment Variables
//!
//! Storage and client options can be set via environment variables:
//!
//! - `MOG_BASE_PATH` - Path prefix of the MOG files (default: empty)
//! - `MOG_HI_RES_MIN_ZOOM` - First zoom served by per-tile files (default: 8)
//! - `MOG_HI_RES_MAX_ZOOM` - Last zoom served by per-tile files (default: 14)
//! - `MOG_S3_BUCKET` - S3 bucket holding the files
//! - `MOG_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `MOG_S3_REGION` - AWS region (default: us-east-1)
//! - `MOG_LOCAL_ROOT` - Read files from this directory instead of S3
//! - `MOG_METADATA_CACHE_SIZE` - Headers kept in memory (default: 16)
//! - `MOG_MAX_OVER_FETCH` - Largest gap merged into one request (default: 1024)
//! - `MOG_MAX_CONCURRENT_REQUESTS` - Parallel ranged fetches (default: 8)
//! - `MOG_HEADER_FETCH_BYTES` - Fetch only this prefix when reading headers

use std::ops::RangeInclusive;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::mog::{
    MogClientConfig, MogCollection, DEFAULT_MAX_CONCURRENT_REQUESTS,
    DEFAULT_MAX_OVER_FETCH_PER_TILE, DEFAULT_METADATA_CACHE_CAPACITY,
};
use crate::tiles::{Bounds, LatLng, TileCoordinates, MAX_ZOOM};

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default first zoom of the per-tile files.
pub const DEFAULT_HI_RES_MIN_ZOOM: u8 = 8;

/// Default last zoom of the per-tile files.
pub const DEFAULT_HI_RES_MAX_ZOOM: u8 = 14;

// =============================================================================
// CLI Structure
// =============================================================================

/// MOG client - tiled imagery out of map-optimized GeoTIFFs.
#[derive(Parser, Debug, Clone)]
#[command(name = "mog-client")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch one tile and write it as a standalone JPEG.
    Tile(TileConfig),

    /// Download every tile of a region for offline use.
    Prefetch(PrefetchConfig),

    /// Print the parsed header of the MOG containing a tile as JSON.
    Inspect(InspectConfig),
}

// =============================================================================
// Shared Options
// =============================================================================

/// Where the MOG files live and how the client talks to them.
#[derive(Args, Debug, Clone)]
pub struct SourceConfig {
    /// Path prefix of the MOG files within the bucket or local root.
    #[arg(long, default_value = "", env = "MOG_BASE_PATH")]
    pub base_path: String,

    /// First zoom served by the per-tile files; lower zooms use world.tif.
    #[arg(long, default_value_t = DEFAULT_HI_RES_MIN_ZOOM, env = "MOG_HI_RES_MIN_ZOOM")]
    pub hi_res_min_zoom: u8,

    /// Last zoom served by the per-tile files.
    #[arg(long, default_value_t = DEFAULT_HI_RES_MAX_ZOOM, env = "MOG_HI_RES_MAX_ZOOM")]
    pub hi_res_max_zoom: u8,

    /// S3 bucket containing the MOG files.
    #[arg(long, env = "MOG_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "MOG_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "MOG_S3_REGION")]
    pub s3_region: String,

    /// Read MOG files from this directory instead of S3.
    #[arg(long, env = "MOG_LOCAL_ROOT", conflicts_with = "s3_bucket")]
    pub local_root: Option<PathBuf>,

    /// Number of MOG headers kept in memory.
    #[arg(long, default_value_t = DEFAULT_METADATA_CACHE_CAPACITY, env = "MOG_METADATA_CACHE_SIZE")]
    pub metadata_cache_size: usize,

    /// Largest gap in bytes fetched to merge two tiles into one request.
    #[arg(long, default_value_t = DEFAULT_MAX_OVER_FETCH_PER_TILE, env = "MOG_MAX_OVER_FETCH")]
    pub max_over_fetch: u64,

    /// Ranged fetches running at once.
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_REQUESTS, env = "MOG_MAX_CONCURRENT_REQUESTS")]
    pub max_concurrent_requests: usize,

    /// Fetch only this many leading bytes when reading headers.
    #[arg(long, env = "MOG_HEADER_FETCH_BYTES")]
    pub header_fetch_bytes: Option<u64>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Resolved storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    S3 {
        bucket: String,
        endpoint: Option<String>,
        region: String,
    },
    Local(PathBuf),
}

impl SourceConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.s3_bucket, &self.local_root) {
            (None, None) => {
                return Err(
                    "No storage configured. Set --s3-bucket (MOG_S3_BUCKET) or --local-root (MOG_LOCAL_ROOT)"
                        .to_string(),
                )
            }
            (Some(_), Some(_)) => {
                return Err("--s3-bucket and --local-root are mutually exclusive".to_string())
            }
            (Some(bucket), None) if bucket.is_empty() => {
                return Err("S3 bucket name must not be empty".to_string())
            }
            _ => {}
        }

        if self.hi_res_min_zoom > self.hi_res_max_zoom {
            return Err(format!(
                "hi_res_min_zoom ({}) must not exceed hi_res_max_zoom ({})",
                self.hi_res_min_zoom, self.hi_res_max_zoom
            ));
        }
        if self.hi_res_max_zoom > MAX_ZOOM {
            return Err(format!("hi_res_max_zoom must be at most {MAX_ZOOM}"));
        }

        if self.metadata_cache_size == 0 {
            return Err("metadata_cache_size must be greater than 0".to_string());
        }
        if self.max_concurrent_requests == 0 {
            return Err("max_concurrent_requests must be greater than 0".to_string());
        }
        if self.header_fetch_bytes == Some(0) {
            return Err("header_fetch_bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// The storage backend selected by the flags (call validate() first).
    pub fn storage(&self) -> Option<Storage> {
        if let Some(root) = &self.local_root {
            return Some(Storage::Local(root.clone()));
        }
        self.s3_bucket.as_ref().map(|bucket| Storage::S3 {
            bucket: bucket.clone(),
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
        })
    }

    /// The two-tier collection described by the zoom flags.
    pub fn collection(&self) -> MogCollection {
        MogCollection::two_tier(&self.base_path, self.hi_res_min_zoom, self.hi_res_max_zoom)
    }

    pub fn client_config(&self) -> MogClientConfig {
        MogClientConfig {
            metadata_cache_capacity: self.metadata_cache_size,
            max_over_fetch: self.max_over_fetch,
            max_concurrent_requests: self.max_concurrent_requests,
            header_fetch_bytes: self.header_fetch_bytes,
        }
    }
}

// =============================================================================
// Tile Command
// =============================================================================

/// Options for `tile`.
#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    #[command(flatten)]
    pub source: SourceConfig,

    /// Tile zoom level.
    pub zoom: u8,

    /// Tile column.
    pub x: u32,

    /// Tile row.
    pub y: u32,

    /// Output file (default: `{z}_{x}_{y}.jpg` in the current directory).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl TileConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()?;
        validate_tile(self.coordinates())
    }

    pub fn coordinates(&self) -> TileCoordinates {
        TileCoordinates::new(self.x, self.y, self.zoom)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}_{}_{}.jpg", self.zoom, self.x, self.y)))
    }
}

// =============================================================================
// Prefetch Command
// =============================================================================

/// Options for `prefetch`.
#[derive(Args, Debug, Clone)]
pub struct PrefetchConfig {
    #[command(flatten)]
    pub source: SourceConfig,

    /// Southern latitude of the region.
    #[arg(long, allow_hyphen_values = true)]
    pub south: f64,

    /// Western longitude of the region.
    #[arg(long, allow_hyphen_values = true)]
    pub west: f64,

    /// Northern latitude of the region.
    #[arg(long, allow_hyphen_values = true)]
    pub north: f64,

    /// Eastern longitude of the region.
    #[arg(long, allow_hyphen_values = true)]
    pub east: f64,

    /// First zoom to download (default: the collection's lowest zoom).
    #[arg(long)]
    pub min_zoom: Option<u8>,

    /// Last zoom to download (default: the collection's highest zoom).
    #[arg(long)]
    pub max_zoom: Option<u8>,

    /// Directory receiving the `{z}/{x}/{y}.jpg` tree.
    #[arg(short, long, default_value = "tiles")]
    pub output: PathBuf,

    /// Only report the download size; fetch headers but no tiles.
    #[arg(long, default_value_t = false)]
    pub estimate_only: bool,
}

impl PrefetchConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()?;

        if !(-90.0..=90.0).contains(&self.south) || !(-90.0..=90.0).contains(&self.north) {
            return Err("latitudes must be between -90 and 90".to_string());
        }
        if !(-180.0..=180.0).contains(&self.west) || !(-180.0..=180.0).contains(&self.east) {
            return Err("longitudes must be between -180 and 180".to_string());
        }
        if self.south > self.north {
            return Err("south must not exceed north".to_string());
        }
        if self.west > self.east {
            return Err("west must not exceed east (regions crossing the antimeridian are not supported)".to_string());
        }

        let zooms = self.zoom_range();
        if zooms.start() > zooms.end() {
            return Err(format!(
                "min_zoom ({}) must not exceed max_zoom ({})",
                zooms.start(),
                zooms.end()
            ));
        }
        Ok(())
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(
            LatLng::new(self.south, self.west),
            LatLng::new(self.north, self.east),
        )
    }

    /// Requested zooms, defaulting to the collection's full range.
    pub fn zoom_range(&self) -> RangeInclusive<u8> {
        let min = self.min_zoom.unwrap_or(0);
        let max = self.max_zoom.unwrap_or(self.source.hi_res_max_zoom);
        min..=max
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

/// Options for `inspect`.
#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    #[command(flatten)]
    pub source: SourceConfig,

    /// Zoom of any tile inside the MOG to inspect.
    pub zoom: u8,

    /// Column of that tile.
    pub x: u32,

    /// Row of that tile.
    pub y: u32,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate()?;
        validate_tile(self.coordinates())
    }

    pub fn coordinates(&self) -> TileCoordinates {
        TileCoordinates::new(self.x, self.y, self.zoom)
    }
}

fn validate_tile(tile: TileCoordinates) -> Result<(), String> {
    if tile.zoom > MAX_ZOOM {
        return Err(format!("zoom must be at most {MAX_ZOOM}"));
    }
    let tiles_per_axis = 1u64 << tile.zoom;
    if tile.x as u64 >= tiles_per_axis || tile.y as u64 >= tiles_per_axis {
        return Err(format!(
            "tile {} is outside the {}x{} grid of zoom {}",
            tile, tiles_per_axis, tiles_per_axis, tile.zoom
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
