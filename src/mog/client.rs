//! MOG client: tile lookup, request planning and streaming fetches.
//!
//! # Fetch Paths
//!
//! ```text
//! get_tile(coords)
//!   collection ──> source ──> (path, anchor) ──> cache/header ──> level ──> range
//!   ──> one ranged GET ──> framed JPEG
//!
//! build_tiles_requests(bounds, zooms) ──> consolidated requests
//! get_tiles(requests) ──> TileStream (one producer task per request)
//! ```
//!
//! Missing files, missing levels and tiles outside a level's grid are not
//! errors: single lookups return `Ok(None)` and region planning skips them.
//! Transport failures and corrupt headers propagate to the caller, which owns
//! any retry policy.

use std::ops::RangeInclusive;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::cache::{MetadataCache, MetadataResult, DEFAULT_METADATA_CACHE_CAPACITY};
use super::metadata::{MogMetadata, MogTileMetadata};
use super::reader::read_mog_metadata;
use super::request::{consolidate, MogTilesRequest, DEFAULT_MAX_OVER_FETCH_PER_TILE};
use super::source::MogCollection;
use super::tile::MogTile;
use crate::error::MogError;
use crate::io::{range_len, ByteSource, SeekableReader};
use crate::tiles::{Bounds, TileCoordinates};

/// Default number of ranged fetches running at once for a [`TileStream`].
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;

/// Tiles buffered between producers and the consumer of a [`TileStream`].
const TILE_CHANNEL_CAPACITY: usize = 32;

// =============================================================================
// Configuration
// =============================================================================

/// Library-level tuning for [`MogClient`].
#[derive(Debug, Clone)]
pub struct MogClientConfig {
    /// Number of MOG headers kept in memory
    pub metadata_cache_capacity: usize,

    /// Largest gap merged into one ranged request
    pub max_over_fetch: u64,

    /// Ranged fetches running at once per [`TileStream`]
    pub max_concurrent_requests: usize,

    /// Fetch only this many leading bytes when reading headers.
    ///
    /// `None` streams the whole object and stops reading once the header has
    /// been parsed.
    pub header_fetch_bytes: Option<u64>,
}

impl Default for MogClientConfig {
    fn default() -> Self {
        Self {
            metadata_cache_capacity: DEFAULT_METADATA_CACHE_CAPACITY,
            max_over_fetch: DEFAULT_MAX_OVER_FETCH_PER_TILE,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            header_fetch_bytes: None,
        }
    }
}

// =============================================================================
// MogClient
// =============================================================================

/// Fetches tiles out of the MOG files of a [`MogCollection`].
pub struct MogClient {
    collection: MogCollection,
    source: Arc<dyn ByteSource>,
    cache: Arc<MetadataCache>,
    config: MogClientConfig,
}

impl MogClient {
    /// Create a client with default settings.
    pub fn new(collection: MogCollection, source: Arc<dyn ByteSource>) -> Self {
        Self::with_config(collection, source, MogClientConfig::default())
    }

    pub fn with_config(
        collection: MogCollection,
        source: Arc<dyn ByteSource>,
        config: MogClientConfig,
    ) -> Self {
        let cache = Arc::new(MetadataCache::new(config.metadata_cache_capacity));
        Self {
            collection,
            source,
            cache,
            config,
        }
    }

    /// Replace the metadata cache, e.g. to share one between clients.
    pub fn with_cache(mut self, cache: Arc<MetadataCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn collection(&self) -> &MogCollection {
        &self.collection
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn config(&self) -> &MogClientConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    /// Header of the file at `path`, anchored at `anchor`.
    ///
    /// Served from the cache when possible; concurrent calls for one path
    /// share a single fetch. `Ok(None)` means the file does not exist.
    pub async fn metadata(&self, path: &str, anchor: TileCoordinates) -> MetadataResult {
        let source = self.source.clone();
        let owned_path = path.to_string();
        let header_range = self
            .config
            .header_fetch_bytes
            .map(|len| 0..=len.saturating_sub(1));

        self.cache
            .get_or_fetch(path, move || async move {
                match source.open(&owned_path, header_range).await {
                    Ok(stream) => read_mog_metadata(&owned_path, anchor, stream)
                        .await
                        .map(Some),
                    Err(e) if e.is_not_found() => {
                        debug!(path = %owned_path, "MOG not found");
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Header of the file containing `tile`.
    pub async fn metadata_for_tile(
        &self,
        tile: TileCoordinates,
    ) -> Result<Option<Arc<MogMetadata>>, MogError> {
        let source = self
            .collection
            .mog_source(tile.zoom)
            .ok_or(MogError::NoSource { zoom: tile.zoom })?;
        let path = source.mog_path(&tile)?;
        let anchor = source.mog_bounds_for_tile(&tile)?;
        self.metadata(&path, anchor).await
    }

    /// Where tile `coordinates` lives, or `None` if no file holds it.
    pub async fn tile_metadata(
        &self,
        coordinates: TileCoordinates,
    ) -> Result<Option<(String, MogTileMetadata)>, MogError> {
        let Some(metadata) = self.metadata_for_tile(coordinates).await? else {
            return Ok(None);
        };
        let Some(image) = metadata.image_metadata(coordinates.zoom) else {
            return Ok(None);
        };
        Ok(image
            .tile_metadata(coordinates)?
            .map(|tile| (metadata.source_url.clone(), tile)))
    }

    // -------------------------------------------------------------------------
    // Single tiles
    // -------------------------------------------------------------------------

    /// Fetch one tile with a single ranged request.
    ///
    /// Fails with [`MogError::NoSource`] when no source covers the zoom.
    pub async fn get_tile(&self, coordinates: TileCoordinates) -> Result<Option<MogTile>, MogError> {
        let Some((url, tile)) = self.tile_metadata(coordinates).await? else {
            return Ok(None);
        };
        let range = tile.byte_range.clone();
        debug!(url = %url, tile = %coordinates, start = range.start(), end = range.end(), "Fetching tile");

        let stream = self.source.open(&url, Some(range.clone())).await?;
        let mut reader = SeekableReader::with_base_offset(stream, *range.start());
        let payload = reader.read_exact(range_len(&range) as usize).await?;
        Ok(Some(MogTile::from_payload(tile, &payload)))
    }

    // -------------------------------------------------------------------------
    // Regions
    // -------------------------------------------------------------------------

    /// Plan the ranged fetches covering `bounds` at every zoom in `zoom_range`
    /// (the collection's full range when `None`).
    pub async fn build_tiles_requests(
        &self,
        bounds: &Bounds,
        zoom_range: Option<RangeInclusive<u8>>,
    ) -> Result<Vec<MogTilesRequest>, MogError> {
        let Some(zooms) = zoom_range.or_else(|| self.collection.zoom_range()) else {
            return Ok(Vec::new());
        };

        let mut singles = Vec::new();
        for zoom in zooms {
            if self.collection.mog_source(zoom).is_none() {
                continue;
            }
            for coordinates in TileCoordinates::within_bounds(bounds, zoom) {
                if let Some((url, tile)) = self.tile_metadata(coordinates).await? {
                    singles.push(MogTilesRequest::new(url, vec![tile]));
                }
            }
        }

        let requests = consolidate(singles, self.config.max_over_fetch);
        debug!(requests = requests.len(), "Planned tile requests");
        Ok(requests)
    }

    /// Stream the tiles of `requests`.
    ///
    /// Each request is fetched with one ranged stream by its own task, with
    /// at most `max_concurrent_requests` tasks fetching at once. Tiles of one
    /// request arrive in ascending offset order; requests interleave freely.
    /// Dropping the returned stream aborts the tasks and closes their
    /// connections.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn get_tiles(&self, requests: Vec<MogTilesRequest>) -> TileStream {
        let (tx, rx) = mpsc::channel(TILE_CHANNEL_CAPACITY);
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_requests.max(1)));
        let mut producers = JoinSet::new();

        for request in requests {
            let tx = tx.clone();
            let source = self.source.clone();
            let permits = permits.clone();
            producers.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if let Err(e) = fetch_request(source.as_ref(), &request, &tx).await {
                    warn!(url = %request.source_url, error = %e, "Tile request failed");
                    let _ = tx.send(Err(e)).await;
                }
            });
        }

        TileStream {
            rx,
            _producers: producers,
        }
    }

    /// Bytes that fetching `bounds` over `zoom_range` would transfer.
    pub async fn estimate_size(
        &self,
        bounds: &Bounds,
        zoom_range: Option<RangeInclusive<u8>>,
    ) -> Result<u64, MogError> {
        let requests = self.build_tiles_requests(bounds, zoom_range).await?;
        Ok(requests.iter().map(MogTilesRequest::total_bytes).sum())
    }

    /// Whether any tile of `bounds` exists at `zoom`.
    pub async fn has_imagery(&self, bounds: &Bounds, zoom: u8) -> Result<bool, MogError> {
        let requests = self.build_tiles_requests(bounds, Some(zoom..=zoom)).await?;
        Ok(!requests.is_empty())
    }
}

/// Fetch one request's span and send its tiles in offset order.
///
/// Returns early without error once the receiver is gone.
async fn fetch_request(
    source: &dyn ByteSource,
    request: &MogTilesRequest,
    tx: &mpsc::Sender<Result<MogTile, MogError>>,
) -> Result<(), MogError> {
    let Some(span) = request.byte_range() else {
        return Ok(());
    };
    debug!(
        url = %request.source_url,
        start = span.start(),
        end = span.end(),
        tiles = request.tiles.len(),
        "Fetching tile range"
    );

    let mut tiles: Vec<&MogTileMetadata> = request.tiles.iter().collect();
    tiles.sort_by_key(|tile| *tile.byte_range.start());

    let stream = source.open(&request.source_url, Some(span.clone())).await?;
    let mut reader = SeekableReader::with_base_offset(stream, *span.start());
    for tile in tiles {
        reader.seek(*tile.byte_range.start()).await?;
        reader.mark();
        let payload = reader.read_exact(range_len(&tile.byte_range) as usize).await?;
        if tx
            .send(Ok(MogTile::from_payload(tile.clone(), &payload)))
            .await
            .is_err()
        {
            return Ok(());
        }
    }
    Ok(())
}

// =============================================================================
// TileStream
// =============================================================================

/// Lazily fetched tiles of a set of requests.
///
/// Finite and not restartable. Dropping it stops every producer.
pub struct TileStream {
    rx: mpsc::Receiver<Result<MogTile, MogError>>,
    _producers: JoinSet<()>,
}

impl Stream for TileStream {
    type Item = Result<MogTile, MogError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
