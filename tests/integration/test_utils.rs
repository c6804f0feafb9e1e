//! Test utilities for integration tests.
//!
//! This module provides an in-memory byte source with request tracking and
//! helpers for building MOG files the way GDAL lays them out: every IFD and
//! its out-of-line values first, tile data after.

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::RwLock;

use mog_client::error::IoError;
use mog_client::io::{ByteRange, ByteSource, ByteStream};
use mog_client::tiles::{Bounds, LatLng, TileCoordinates};

// =============================================================================
// In-Memory Byte Source with Request Tracking
// =============================================================================

/// A byte source serving objects from memory and recording every open.
///
/// Missing paths fail with [`IoError::NotFound`]; paths marked as broken fail
/// with a connection error.
///
/// A stream counts as live from the moment `open` is called until the
/// returned stream (or the pending open) is dropped.
#[derive(Clone, Default)]
pub struct MemoryByteSource {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
    broken: Arc<RwLock<HashSet<String>>>,
    opens: Arc<RwLock<Vec<(String, Option<ByteRange>)>>>,
    open_count: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl MemoryByteSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every open, widening the window for concurrent callers.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn insert(&self, path: &str, data: Vec<u8>) {
        self.objects
            .write()
            .await
            .insert(path.to_string(), Bytes::from(data));
    }

    pub async fn set_broken(&self, path: &str, broken: bool) {
        let mut paths = self.broken.write().await;
        if broken {
            paths.insert(path.to_string());
        } else {
            paths.remove(path);
        }
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub async fn opens(&self) -> Vec<(String, Option<ByteRange>)> {
        self.opens.read().await.clone()
    }

    /// Opens of `path` without a range or starting at byte 0.
    pub async fn header_opens(&self, path: &str) -> usize {
        self.opens
            .read()
            .await
            .iter()
            .filter(|(p, range)| p == path && range.as_ref().map_or(true, |r| *r.start() == 0))
            .count()
    }

    /// Opens with a range not starting at byte 0, i.e. tile fetches.
    pub async fn tile_opens(&self) -> Vec<(String, ByteRange)> {
        self.opens
            .read()
            .await
            .iter()
            .filter_map(|(p, range)| match range {
                Some(r) if *r.start() > 0 => Some((p.clone(), r.clone())),
                _ => None,
            })
            .collect()
    }

    /// Streams currently open.
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Most streams open at once since the last reset.
    pub fn peak_streams(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub async fn reset_tracking(&self) {
        self.open_count.store(0, Ordering::SeqCst);
        self.peak.store(self.live_streams(), Ordering::SeqCst);
        self.opens.write().await.clear();
    }
}

/// Counts one live stream for as long as it exists.
struct LiveGuard {
    live: Arc<AtomicUsize>,
}

impl LiveGuard {
    fn new(live: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { live: live.clone() }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory stream that stays counted as live until dropped.
struct TrackedStream {
    inner: Cursor<Bytes>,
    _guard: LiveGuard,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

#[async_trait]
impl ByteSource for MemoryByteSource {
    async fn open(&self, path: &str, range: Option<ByteRange>) -> Result<ByteStream, IoError> {
        let guard = LiveGuard::new(&self.live, &self.peak);
        self.open_count.fetch_add(1, Ordering::SeqCst);
        self.opens
            .write()
            .await
            .push((path.to_string(), range.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.broken.read().await.contains(path) {
            return Err(IoError::Connection(format!("connection reset: {}", path)));
        }

        let data = self
            .objects
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| IoError::NotFound(path.to_string()))?;

        let slice = match range {
            None => data,
            Some(range) => {
                let start = (*range.start() as usize).min(data.len());
                let end = (*range.end() as usize + 1).min(data.len());
                data.slice(start..end)
            }
        };
        Ok(Box::pin(TrackedStream {
            inner: Cursor::new(slice),
            _guard: guard,
        }))
    }
}

// =============================================================================
// JPEG Fixtures
// =============================================================================

/// Quality used for every fixture tile, so all tiles share one set of tables.
const FIXTURE_QUALITY: u8 = 90;

/// Encode a solid-color RGB image as a baseline JPEG.
pub fn encode_jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let pixels: Vec<u8> = (0..width * height).flat_map(|_| color).collect();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, FIXTURE_QUALITY)
        .write_image(&pixels, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    jpeg
}

/// Split a full JPEG into `(tables, abbreviated tile)` as stored in a MOG.
///
/// The tables hold DQT/DHT segments wrapped in SOI/EOI. The tile keeps its
/// frame header and scan. APPn segments are dropped from both.
pub fn split_jpeg(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut tables = vec![0xFF, 0xD8];
    let mut tile = vec![0xFF, 0xD8];
    let mut pos = 2;
    while jpeg[pos + 1] != 0xDA {
        let marker = jpeg[pos + 1];
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let segment = &jpeg[pos..pos + 2 + len];
        match marker {
            0xE0..=0xEF => {}
            0xC0..=0xC2 => tile.extend_from_slice(segment),
            _ => tables.extend_from_slice(segment),
        }
        pos += 2 + len;
    }
    tables.extend_from_slice(&[0xFF, 0xD9]);
    tile.extend_from_slice(&jpeg[pos..]);
    (tables, tile)
}

/// JPEG tables shared by every fixture tile.
pub fn fixture_tables() -> Vec<u8> {
    split_jpeg(&encode_jpeg(256, 256, [0, 0, 0])).0
}

/// Abbreviated 256×256 tile of a solid color.
pub fn fixture_tile(color: [u8; 3]) -> Vec<u8> {
    split_jpeg(&encode_jpeg(256, 256, color)).1
}

/// Deterministic, distinguishable color for a tile.
pub fn tile_color(tile: TileCoordinates) -> [u8; 3] {
    [
        (40 + tile.x * 50 % 200) as u8,
        (40 + tile.y * 70 % 200) as u8,
        (40 + tile.zoom as u32 * 30 % 200) as u8,
    ]
}

/// Whether two colors are within JPEG rounding of each other.
pub fn color_close(actual: [u8; 3], expected: [u8; 3]) -> bool {
    actual
        .iter()
        .zip(expected.iter())
        .all(|(&a, &e)| (a as i16 - e as i16).abs() <= 8)
}

// =============================================================================
// MOG Builder
// =============================================================================

/// One IFD of a fixture MOG.
pub struct LevelSpec {
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub photometric: u16,
    pub compression: u16,
    /// Row-major tile payloads; `None` writes a sparse tile (byte count 0)
    pub tiles: Vec<Option<Vec<u8>>>,
}

/// Builds little-endian MOG files.
pub struct MogBuilder {
    levels: Vec<LevelSpec>,
    jpeg_tables: Option<Vec<u8>>,
    no_data: Option<String>,
    tile_gap: usize,
}

struct Entry {
    tag: u16,
    typ: u16,
    count: u32,
    data: Vec<u8>,
}

impl Entry {
    fn short(tag: u16, value: u16) -> Self {
        Self {
            tag,
            typ: 3,
            count: 1,
            data: value.to_le_bytes().to_vec(),
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self::longs(tag, &[value])
    }

    fn longs(tag: u16, values: &[u32]) -> Self {
        Self {
            tag,
            typ: 4,
            count: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    fn padded_value_len(&self) -> usize {
        if self.data.len() <= 4 {
            0
        } else {
            self.data.len() + self.data.len() % 2
        }
    }
}

impl Default for MogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MogBuilder {
    pub fn new() -> Self {
        Self {
            levels: Vec::new(),
            jpeg_tables: None,
            no_data: None,
            tile_gap: 0,
        }
    }

    pub fn jpeg_tables(mut self, tables: Vec<u8>) -> Self {
        self.jpeg_tables = Some(tables);
        self
    }

    pub fn no_data(mut self, value: &str) -> Self {
        self.no_data = Some(value.to_string());
        self
    }

    /// Filler bytes written before every tile.
    pub fn tile_gap(mut self, gap: usize) -> Self {
        self.tile_gap = gap;
        self
    }

    pub fn level(mut self, level: LevelSpec) -> Self {
        self.levels.push(level);
        self
    }

    /// RGB JPEG level whose tiles are produced by `tile(col, row)`.
    pub fn image_level(
        self,
        tiles_x: u32,
        tiles_y: u32,
        tile: impl Fn(u32, u32) -> Option<Vec<u8>>,
    ) -> Self {
        let tiles = (0..tiles_y)
            .flat_map(|row| (0..tiles_x).map(move |col| (col, row)))
            .map(|(col, row)| tile(col, row))
            .collect();
        self.level(LevelSpec {
            tiles_x,
            tiles_y,
            photometric: 2,
            compression: 7,
            tiles,
        })
    }

    /// Deflate-compressed transparency mask level.
    pub fn mask_level(self, tiles_x: u32, tiles_y: u32) -> Self {
        let tiles = (0..tiles_x * tiles_y).map(|_| Some(vec![0x78, 0x9C, 0x03, 0x00])).collect();
        self.level(LevelSpec {
            tiles_x,
            tiles_y,
            photometric: 4,
            compression: 8,
            tiles,
        })
    }

    fn entries(&self, level: &LevelSpec, offsets: &[u32], counts: &[u32]) -> Vec<Entry> {
        let mut entries = vec![
            Entry::long(256, level.tiles_x * 256),
            Entry::long(257, level.tiles_y * 256),
            Entry::short(259, level.compression),
            Entry::short(262, level.photometric),
            // SamplesPerPixel, not read by the client
            Entry::short(277, 3),
            Entry::short(322, 256),
            Entry::short(323, 256),
            Entry::longs(324, offsets),
            Entry::longs(325, counts),
        ];
        if level.photometric & 2 != 0 {
            if let Some(tables) = &self.jpeg_tables {
                entries.push(Entry {
                    tag: 347,
                    typ: 7,
                    count: tables.len() as u32,
                    data: tables.clone(),
                });
            }
            if let Some(no_data) = &self.no_data {
                let mut text = no_data.as_bytes().to_vec();
                text.push(0);
                entries.push(Entry {
                    tag: 42113,
                    typ: 2,
                    count: text.len() as u32,
                    data: text,
                });
            }
        }
        entries
    }

    fn ifd_len(entries: &[Entry]) -> usize {
        2 + entries.len() * 12 + 4 + entries.iter().map(Entry::padded_value_len).sum::<usize>()
    }

    /// Serialize the file.
    pub fn build(&self) -> Vec<u8> {
        let header_len = 8 + self
            .levels
            .iter()
            .map(|level| {
                let zeros = vec![0u32; level.tiles.len()];
                Self::ifd_len(&self.entries(level, &zeros, &zeros))
            })
            .sum::<usize>();

        let mut data = Vec::new();
        let mut placements = Vec::new();
        for level in &self.levels {
            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for tile in &level.tiles {
                match tile {
                    Some(bytes) => {
                        data.extend(std::iter::repeat(0xEE).take(self.tile_gap));
                        offsets.push((header_len + data.len()) as u32);
                        counts.push(bytes.len() as u32);
                        data.extend_from_slice(bytes);
                    }
                    None => {
                        offsets.push(0);
                        counts.push(0);
                    }
                }
            }
            placements.push((offsets, counts));
        }

        let mut buf = vec![0x49, 0x49, 0x2A, 0x00];
        buf.extend_from_slice(&8u32.to_le_bytes());
        for (i, (level, (offsets, counts))) in self.levels.iter().zip(&placements).enumerate() {
            let entries = self.entries(level, offsets, counts);
            let values_start = buf.len() + 2 + entries.len() * 12 + 4;
            let mut values = Vec::new();

            buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for entry in &entries {
                buf.extend_from_slice(&entry.tag.to_le_bytes());
                buf.extend_from_slice(&entry.typ.to_le_bytes());
                buf.extend_from_slice(&entry.count.to_le_bytes());
                if entry.data.len() <= 4 {
                    let mut inline = entry.data.clone();
                    inline.resize(4, 0);
                    buf.extend_from_slice(&inline);
                } else {
                    let offset = (values_start + values.len()) as u32;
                    buf.extend_from_slice(&offset.to_le_bytes());
                    values.extend_from_slice(&entry.data);
                    if values.len() % 2 == 1 {
                        values.push(0);
                    }
                }
            }
            let next = if i + 1 == self.levels.len() {
                0
            } else {
                (values_start + values.len()) as u32
            };
            buf.extend_from_slice(&next.to_le_bytes());
            buf.extend_from_slice(&values);
        }

        assert_eq!(buf.len(), header_len);
        buf.extend_from_slice(&data);
        buf
    }
}

/// A MOG anchored at `anchor` with `depth` levels, every tile present and
/// colored by [`tile_color`], plus a mask after each image level.
pub fn full_mog(anchor: TileCoordinates, depth: u8) -> MogBuilder {
    let mut builder = MogBuilder::new().jpeg_tables(fixture_tables());
    for zoom in (anchor.zoom..anchor.zoom + depth).rev() {
        let origin = anchor.origin_at_zoom(zoom).unwrap();
        let side = 1u32 << (zoom - anchor.zoom);
        builder = builder
            .image_level(side, side, |col, row| {
                Some(fixture_tile(tile_color(TileCoordinates::new(
                    origin.x + col,
                    origin.y + row,
                    zoom,
                ))))
            })
            .mask_level(side, side);
    }
    builder
}

// =============================================================================
// Geography Helpers
// =============================================================================

/// Geographic center of a tile.
pub fn tile_center(tile: TileCoordinates) -> LatLng {
    let n = (1u64 << tile.zoom) as f64;
    let lng = (tile.x as f64 + 0.5) / n * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * (tile.y as f64 + 0.5) / n)).sinh().atan();
    LatLng::new(lat_rad.to_degrees(), lng)
}

/// Bounds spanning the centers of two tiles (north-west and south-east).
pub fn bounds_between(nw: TileCoordinates, se: TileCoordinates) -> Bounds {
    let nw = tile_center(nw);
    let se = tile_center(se);
    Bounds::new(LatLng::new(se.lat, nw.lng), LatLng::new(nw.lat, se.lng))
}

/// Sort tiles for order-independent comparison.
pub fn sorted(mut tiles: Vec<TileCoordinates>) -> Vec<TileCoordinates> {
    tiles.sort();
    tiles
}
