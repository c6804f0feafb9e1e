//! Planning of ranged fetches.
//!
//! Tiles of one level sit next to each other in the file, so a region's
//! tiles can usually be fetched with a handful of ranged requests instead of
//! one per tile. Consolidation merges tiles of the same file whose byte
//! ranges are separated by at most a small gap; the gap bytes are fetched and
//! thrown away.

use std::collections::HashMap;

use super::metadata::MogTileMetadata;
use crate::io::{range_len, ByteRange};

/// Largest gap, in bytes, fetched and discarded to join two tiles into one
/// request.
pub const DEFAULT_MAX_OVER_FETCH_PER_TILE: u64 = 1024;

// =============================================================================
// MogTilesRequest
// =============================================================================

/// One ranged fetch covering one or more tiles of a single file.
#[derive(Debug, Clone)]
pub struct MogTilesRequest {
    /// Path of the MOG file
    pub source_url: String,

    /// Tiles in ascending offset order
    pub tiles: Vec<MogTileMetadata>,
}

impl MogTilesRequest {
    pub fn new(source_url: impl Into<String>, tiles: Vec<MogTileMetadata>) -> Self {
        Self {
            source_url: source_url.into(),
            tiles,
        }
    }

    /// Span from the first tile's start to the furthest tile end.
    ///
    /// `None` for a request without tiles.
    pub fn byte_range(&self) -> Option<ByteRange> {
        let start = self.tiles.iter().map(|t| *t.byte_range.start()).min()?;
        let end = self.tiles.iter().map(|t| *t.byte_range.end()).max()?;
        Some(start..=end)
    }

    /// Bytes transferred by this request, gaps included.
    pub fn total_bytes(&self) -> u64 {
        self.byte_range().map_or(0, |range| range_len(&range))
    }
}

// =============================================================================
// Consolidation
// =============================================================================

/// Merge requests into as few ranged fetches as the gap tolerance allows.
///
/// Tiles of different files are never merged. Within a file, tiles are
/// sorted by offset and swept once: a tile joins the current group when the
/// gap between the group's end and the tile's start is at most
/// `max_over_fetch` bytes, otherwise it starts a new group.
///
/// Files appear in the output in order of first appearance in the input,
/// and each file's groups in ascending offset order.
pub fn consolidate(
    requests: impl IntoIterator<Item = MogTilesRequest>,
    max_over_fetch: u64,
) -> Vec<MogTilesRequest> {
    let mut order: Vec<String> = Vec::new();
    let mut tiles_by_url: HashMap<String, Vec<MogTileMetadata>> = HashMap::new();
    for request in requests {
        let tiles = tiles_by_url
            .entry(request.source_url.clone())
            .or_insert_with(|| {
                order.push(request.source_url.clone());
                Vec::new()
            });
        tiles.extend(request.tiles);
    }

    let mut consolidated = Vec::new();
    for url in order {
        let Some(mut tiles) = tiles_by_url.remove(&url) else {
            continue;
        };
        tiles.sort_by_key(|tile| *tile.byte_range.start());

        let mut group: Vec<MogTileMetadata> = Vec::new();
        let mut group_end = 0u64;
        for tile in tiles {
            let start = *tile.byte_range.start();
            let end = *tile.byte_range.end();
            let joins = !group.is_empty() && start.saturating_sub(group_end + 1) <= max_over_fetch;
            if !joins && !group.is_empty() {
                consolidated.push(MogTilesRequest::new(url.clone(), std::mem::take(&mut group)));
            }
            group_end = if joins { group_end.max(end) } else { end };
            group.push(tile);
        }
        if !group.is_empty() {
            consolidated.push(MogTilesRequest::new(url, group));
        }
    }
    consolidated
}

// =============================================================================
// Tests
// =============================================================================
