//! End-to-end tests of MogClient against an in-memory collection.
//!
//! Layout of the fixture collection (`two_tier("mogs", 2, 3)`):
//!
//! - `mogs/world.tif`: zooms 0 and 1
//! - `mogs/2/1/1.tif`: zooms 2 and 3, every tile present
//! - `mogs/2/2/1.tif`: zoom 2 only
//! - `mogs/2/1/2.tif`: zooms 2 and 3, first zoom-3 tile sparse
//! - `mogs/2/0/0.tif`: missing

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use mog_client::error::{IoError, MogError};
use mog_client::mog::{MogClient, MogClientConfig, MogCollection, MogTile, MogTilesRequest};
use mog_client::tiles::TileCoordinates;

use super::test_utils::*;

const FULL: &str = "mogs/2/1/1.tif";

pub async fn fixture_source() -> MemoryByteSource {
    let source = MemoryByteSource::new();
    populate(&source).await;
    source
}

pub async fn populate(source: &MemoryByteSource) {
    source
        .insert("mogs/world.tif", full_mog(TileCoordinates::WORLD, 2).build())
        .await;
    source
        .insert(FULL, full_mog(TileCoordinates::new(1, 1, 2), 2).build())
        .await;
    source
        .insert("mogs/2/2/1.tif", full_mog(TileCoordinates::new(2, 1, 2), 1).build())
        .await;

    let sparse = MogBuilder::new()
        .jpeg_tables(fixture_tables())
        .image_level(2, 2, |col, row| {
            if col == 0 && row == 0 {
                None
            } else {
                Some(fixture_tile([90, 90, 90]))
            }
        })
        .image_level(1, 1, |_, _| Some(fixture_tile([60, 60, 60])))
        .build();
    source.insert("mogs/2/1/2.tif", sparse).await;
}

pub fn client(source: &MemoryByteSource) -> MogClient {
    client_with(source, MogClientConfig::default())
}

pub fn client_with(source: &MemoryByteSource, config: MogClientConfig) -> MogClient {
    MogClient::with_config(
        MogCollection::two_tier("mogs", 2, 3),
        Arc::new(source.clone()),
        config,
    )
}

fn center_color(tile: &MogTile) -> [u8; 3] {
    let rgba = tile.decode_rgba().unwrap();
    let pixel = rgba.get_pixel(128, 128).0;
    [pixel[0], pixel[1], pixel[2]]
}

// =============================================================================
// Single Tiles
// =============================================================================

#[tokio::test]
async fn test_get_tile_returns_standalone_jpeg() {
    let source = fixture_source().await;
    let client = client(&source);
    let coords = TileCoordinates::new(3, 2, 3);

    let tile = client.get_tile(coords).await.unwrap().unwrap();

    assert_eq!(tile.metadata.tile_coordinates, coords);
    assert_eq!(&tile.data[..2], &[0xFF, 0xD8]);
    assert_eq!(&tile.data[6..11], b"JFIF\0");
    assert_eq!(&tile.data[tile.data.len() - 2..], &[0xFF, 0xD9]);

    let rgba = tile.decode_rgba().unwrap();
    assert_eq!(rgba.dimensions(), (256, 256));
    assert!(color_close(center_color(&tile), tile_color(coords)));
}

#[tokio::test]
async fn test_get_tile_anchor_level() {
    let source = fixture_source().await;
    let client = client(&source);
    let coords = TileCoordinates::new(1, 1, 2);

    let tile = client.get_tile(coords).await.unwrap().unwrap();
    assert!(color_close(center_color(&tile), tile_color(coords)));
}

#[tokio::test]
async fn test_get_tile_from_world_file() {
    let source = fixture_source().await;
    let client = client(&source);

    for coords in [
        TileCoordinates::WORLD,
        TileCoordinates::new(1, 0, 1),
        TileCoordinates::new(0, 1, 1),
    ] {
        let tile = client.get_tile(coords).await.unwrap().unwrap();
        assert!(color_close(center_color(&tile), tile_color(coords)), "{}", coords);
    }
    assert_eq!(source.header_opens("mogs/world.tif").await, 1);
}

#[tokio::test]
async fn test_get_tile_fetches_exact_range() {
    let source = fixture_source().await;
    let client = client(&source);
    let coords = TileCoordinates::new(2, 3, 3);

    let (url, metadata) = client.tile_metadata(coords).await.unwrap().unwrap();
    assert_eq!(url, FULL);
    source.reset_tracking().await;

    client.get_tile(coords).await.unwrap().unwrap();

    assert_eq!(source.tile_opens().await, vec![(FULL.to_string(), metadata.byte_range)]);
}

#[tokio::test]
async fn test_missing_file_returns_none_and_is_remembered() {
    let source = fixture_source().await;
    let client = client(&source);

    assert!(client
        .get_tile(TileCoordinates::new(0, 0, 3))
        .await
        .unwrap()
        .is_none());
    assert!(client
        .get_tile(TileCoordinates::new(1, 1, 3))
        .await
        .unwrap()
        .is_none());

    assert_eq!(source.header_opens("mogs/2/0/0.tif").await, 1);
}

#[tokio::test]
async fn test_missing_level_returns_none() {
    let source = fixture_source().await;
    let client = client(&source);

    // mogs/2/2/1.tif only holds zoom 2
    assert!(client
        .get_tile(TileCoordinates::new(2, 1, 2))
        .await
        .unwrap()
        .is_some());
    assert!(client
        .get_tile(TileCoordinates::new(4, 2, 3))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_sparse_tile_returns_none() {
    let source = fixture_source().await;
    let client = client(&source);

    assert!(client
        .get_tile(TileCoordinates::new(2, 4, 3))
        .await
        .unwrap()
        .is_none());
    assert!(client
        .get_tile(TileCoordinates::new(3, 4, 3))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_zoom_without_source_is_an_error() {
    let source = fixture_source().await;
    let client = client(&source);

    let err = client
        .get_tile(TileCoordinates::new(0, 0, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, MogError::NoSource { zoom: 4 }));
    assert_eq!(source.open_count(), 0);
}

#[tokio::test]
async fn test_transport_error_propagates() {
    let source = fixture_source().await;
    source.set_broken(FULL, true).await;
    let client = client(&source);

    let err = client
        .get_tile(TileCoordinates::new(2, 2, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, MogError::Io(IoError::Connection(_))));
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_header_fetch() {
    let source = MemoryByteSource::new().with_delay(Duration::from_millis(50));
    populate(&source).await;
    let client = Arc::new(client(&source));

    let lookups = (2..4).flat_map(|x| (2..4).map(move |y| TileCoordinates::new(x, y, 3)));
    let handles: Vec<_> = lookups
        .map(|coords| {
            let client = client.clone();
            tokio::spawn(async move { client.get_tile(coords).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_some());
    }
    assert_eq!(source.header_opens(FULL).await, 1);
}

#[tokio::test]
async fn test_header_prefix_fetch() {
    let source = fixture_source().await;
    let config = MogClientConfig {
        header_fetch_bytes: Some(64 * 1024),
        ..MogClientConfig::default()
    };
    let client = client_with(&source, config);

    assert!(client
        .get_tile(TileCoordinates::new(2, 2, 3))
        .await
        .unwrap()
        .is_some());
    let opens = source.opens().await;
    assert_eq!(opens[0], (FULL.to_string(), Some(0..=64 * 1024 - 1)));
}

#[tokio::test]
async fn test_header_prefix_too_short_fails() {
    let source = fixture_source().await;
    let config = MogClientConfig {
        header_fetch_bytes: Some(16),
        ..MogClientConfig::default()
    };
    let client = client_with(&source, config);

    assert!(client.get_tile(TileCoordinates::new(2, 2, 3)).await.is_err());
}

// =============================================================================
// Regions
// =============================================================================

#[tokio::test]
async fn test_build_tiles_requests_merges_neighbours() {
    let source = fixture_source().await;
    let client = client(&source);
    let bounds = bounds_between(TileCoordinates::new(2, 2, 3), TileCoordinates::new(3, 3, 3));

    let requests = client
        .build_tiles_requests(&bounds, Some(3..=3))
        .await
        .unwrap();

    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].source_url, FULL);
    let tiles: Vec<_> = requests[0].tiles.iter().map(|t| t.tile_coordinates).collect();
    assert_eq!(
        sorted(tiles),
        vec![
            TileCoordinates::new(2, 2, 3),
            TileCoordinates::new(2, 3, 3),
            TileCoordinates::new(3, 2, 3),
            TileCoordinates::new(3, 3, 3),
        ]
    );
}

#[tokio::test]
async fn test_build_tiles_requests_all_zooms() {
    let source = fixture_source().await;
    let client = client(&source);
    let bounds = bounds_between(TileCoordinates::new(2, 2, 3), TileCoordinates::new(3, 3, 3));

    let requests = client.build_tiles_requests(&bounds, None).await.unwrap();

    let tiles: Vec<_> = requests
        .iter()
        .flat_map(|r| r.tiles.iter().map(|t| t.tile_coordinates))
        .collect();
    assert_eq!(tiles.len(), 7);
    assert!(tiles.contains(&TileCoordinates::WORLD));
    assert!(tiles.contains(&TileCoordinates::new(0, 0, 1)));
    assert!(tiles.contains(&TileCoordinates::new(1, 1, 2)));

    // Zoom 3 and zoom 2 tiles of one file are only separated by mask data
    let full: Vec<_> = requests.iter().filter(|r| r.source_url == FULL).collect();
    assert_eq!(full.len(), 1);
    assert_eq!(full[0].tiles.len(), 5);
}

#[tokio::test]
async fn test_build_tiles_requests_skips_missing_imagery() {
    let source = fixture_source().await;
    let client = client(&source);
    // Covers mogs/2/0/0.tif (missing) and mogs/2/1/1.tif
    let bounds = bounds_between(TileCoordinates::new(1, 1, 3), TileCoordinates::new(2, 2, 3));

    let requests = client
        .build_tiles_requests(&bounds, Some(3..=3))
        .await
        .unwrap();

    let tiles: Vec<_> = requests
        .iter()
        .flat_map(|r| r.tiles.iter().map(|t| t.tile_coordinates))
        .collect();
    assert_eq!(tiles, vec![TileCoordinates::new(2, 2, 3)]);
}

#[tokio::test]
async fn test_large_gaps_split_requests() {
    let source = MemoryByteSource::new();
    source
        .insert(
            FULL,
            full_mog(TileCoordinates::new(1, 1, 2), 2).tile_gap(2000).build(),
        )
        .await;
    let client = client(&source);
    let bounds = bounds_between(TileCoordinates::new(2, 2, 3), TileCoordinates::new(3, 3, 3));

    let requests = client
        .build_tiles_requests(&bounds, Some(3..=3))
        .await
        .unwrap();
    assert_eq!(requests.len(), 4);
    assert!(requests.iter().all(|r| r.tiles.len() == 1));
}

#[tokio::test]
async fn test_get_tiles_streams_every_tile() {
    let source = fixture_source().await;
    let client = client(&source);
    let bounds = bounds_between(TileCoordinates::new(2, 2, 3), TileCoordinates::new(3, 3, 3));
    let requests = client.build_tiles_requests(&bounds, None).await.unwrap();
    let request_count = requests.len();
    source.reset_tracking().await;

    let tiles: Vec<MogTile> = client
        .get_tiles(requests)
        .map(|tile| tile.unwrap())
        .collect()
        .await;

    assert_eq!(tiles.len(), 7);
    for tile in &tiles {
        let coords = tile.metadata.tile_coordinates;
        assert!(color_close(center_color(tile), tile_color(coords)), "{}", coords);
    }
    // One ranged fetch per request, no header refetch
    assert_eq!(source.open_count(), request_count);
}

#[tokio::test]
async fn test_get_tiles_keeps_offset_order_within_request() {
    let source = fixture_source().await;
    let client = client(&source);
    let bounds = bounds_between(TileCoordinates::new(2, 2, 3), TileCoordinates::new(3, 3, 3));
    let requests = client
        .build_tiles_requests(&bounds, Some(2..=3))
        .await
        .unwrap();
    assert_eq!(requests.len(), 1);

    let starts: Vec<u64> = client
        .get_tiles(requests)
        .map(|tile| *tile.unwrap().metadata.byte_range.start())
        .collect()
        .await;

    assert_eq!(starts.len(), 5);
    assert!(starts.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_get_tiles_reports_failed_request() {
    let source = fixture_source().await;
    let client = client(&source);
    let bounds = bounds_between(TileCoordinates::new(2, 2, 3), TileCoordinates::new(3, 3, 3));
    let requests = client
        .build_tiles_requests(&bounds, Some(3..=3))
        .await
        .unwrap();

    source.set_broken(FULL, true).await;
    let results: Vec<_> = client.get_tiles(requests).collect().await;

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(MogError::Io(IoError::Connection(_)))));
}

#[tokio::test]
async fn test_get_tiles_empty() {
    let source = fixture_source().await;
    let client = client(&source);

    let results: Vec<_> = client.get_tiles(Vec::new()).collect().await;
    assert!(results.is_empty());
}

/// Fixture whose zoom-3 tiles are too far apart to merge into one request.
async fn spread_out_source(delay: Duration) -> MemoryByteSource {
    let source = MemoryByteSource::new().with_delay(delay);
    source
        .insert(
            FULL,
            full_mog(TileCoordinates::new(1, 1, 2), 2).tile_gap(2000).build(),
        )
        .await;
    source
}

async fn spread_out_requests(client: &MogClient) -> Vec<MogTilesRequest> {
    let bounds = bounds_between(TileCoordinates::new(2, 2, 3), TileCoordinates::new(3, 3, 3));
    let requests = client
        .build_tiles_requests(&bounds, Some(3..=3))
        .await
        .unwrap();
    assert_eq!(requests.len(), 4);
    requests
}

#[tokio::test]
async fn test_get_tiles_respects_concurrency_limit() {
    let source = spread_out_source(Duration::from_millis(20)).await;
    let config = MogClientConfig {
        max_concurrent_requests: 1,
        ..MogClientConfig::default()
    };
    let client = client_with(&source, config);
    let requests = spread_out_requests(&client).await;
    source.reset_tracking().await;

    let tiles: Vec<_> = client.get_tiles(requests).collect().await;
    assert_eq!(tiles.len(), 4);
    assert!(tiles.iter().all(Result::is_ok));
    assert_eq!(source.tile_opens().await.len(), 4);
    assert_eq!(source.peak_streams(), 1);
    assert_eq!(source.live_streams(), 0);
}

#[tokio::test]
async fn test_get_tiles_fetches_in_parallel_by_default() {
    let source = spread_out_source(Duration::from_millis(20)).await;
    let client = client(&source);
    let requests = spread_out_requests(&client).await;
    source.reset_tracking().await;

    let tiles: Vec<_> = client.get_tiles(requests).collect().await;
    assert_eq!(tiles.len(), 4);
    assert!(source.peak_streams() > 1);
    assert!(source.peak_streams() <= 4);
}

#[tokio::test]
async fn test_dropping_tile_stream_stops_fetching() {
    let source = spread_out_source(Duration::from_millis(30)).await;
    let config = MogClientConfig {
        max_concurrent_requests: 1,
        ..MogClientConfig::default()
    };
    let client = client_with(&source, config);
    let requests = spread_out_requests(&client).await;
    source.reset_tracking().await;

    let mut tiles = client.get_tiles(requests);
    let first = tiles.next().await.unwrap();
    assert!(first.is_ok());
    drop(tiles);

    let opened = source.open_count();
    assert!(opened < 4);

    // Long enough for every remaining request to have run had it not been aborted
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(source.open_count(), opened);
    assert_eq!(source.live_streams(), 0);
}

// =============================================================================
// Estimates
// =============================================================================

#[tokio::test]
async fn test_estimate_size_counts_over_fetched_gaps() {
    let tile_bytes: u64 = (2..4)
        .flat_map(|x| (2..4).map(move |y| TileCoordinates::new(x, y, 3)))
        .map(|coords| fixture_tile(tile_color(coords)).len() as u64)
        .sum();
    let bounds = bounds_between(TileCoordinates::new(2, 2, 3), TileCoordinates::new(3, 3, 3));

    // Gaps below the tolerance are fetched along with the tiles
    let source = MemoryByteSource::new();
    source
        .insert(FULL, full_mog(TileCoordinates::new(1, 1, 2), 2).tile_gap(500).build())
        .await;
    let estimate = client(&source)
        .estimate_size(&bounds, Some(3..=3))
        .await
        .unwrap();
    assert_eq!(estimate, tile_bytes + 3 * 500);

    // Gaps above it are not
    let source = MemoryByteSource::new();
    source
        .insert(FULL, full_mog(TileCoordinates::new(1, 1, 2), 2).tile_gap(5000).build())
        .await;
    let estimate = client(&source)
        .estimate_size(&bounds, Some(3..=3))
        .await
        .unwrap();
    assert_eq!(estimate, tile_bytes);
}

#[tokio::test]
async fn test_has_imagery() {
    let source = fixture_source().await;
    let client = client(&source);

    let covered = bounds_between(TileCoordinates::new(2, 2, 3), TileCoordinates::new(3, 3, 3));
    assert!(client.has_imagery(&covered, 3).await.unwrap());

    let missing_file = bounds_between(TileCoordinates::new(0, 0, 3), TileCoordinates::new(1, 1, 3));
    assert!(!client.has_imagery(&missing_file, 3).await.unwrap());

    let missing_level = bounds_between(TileCoordinates::new(4, 2, 3), TileCoordinates::new(5, 3, 3));
    assert!(!client.has_imagery(&missing_level, 3).await.unwrap());
    assert!(client.has_imagery(&missing_level, 2).await.unwrap());
}
