//! MOG Client - fetch and prefetch map tiles out of MOG files.
//!
//! This binary wires the configured byte source into a [`MogClient`] and runs
//! one command.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use futures::StreamExt;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mog_client::{
    config::{Cli, Command, InspectConfig, PrefetchConfig, SourceConfig, Storage, TileConfig},
    create_s3_client, ByteSource, FileByteSource, MogClient, MogMetadata, MogTileDownloader,
    S3ByteSource, TileCoordinates,
};

/// Log a progress line every this many downloaded tiles.
const PROGRESS_INTERVAL: u64 = 100;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Tile(config) => run_tile(config).await,
        Command::Prefetch(config) => run_prefetch(config).await,
        Command::Inspect(config) => run_inspect(config).await,
    }
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(config: TileConfig) -> ExitCode {
    init_logging(config.source.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let client = build_client(&config.source).await;
    let coordinates = config.coordinates();

    let tile = match client.get_tile(coordinates).await {
        Ok(Some(tile)) => tile,
        Ok(None) => {
            warn!("No imagery for tile {}", coordinates);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Failed to fetch tile {}: {}", coordinates, e);
            return ExitCode::FAILURE;
        }
    };

    let output = config.output_path();
    if let Err(e) = tokio::fs::write(&output, &tile.data).await {
        error!("Failed to write {}: {}", output.display(), e);
        return ExitCode::FAILURE;
    }

    println!(
        "✓ {} -> {} ({} bytes, {}x{})",
        coordinates,
        output.display(),
        tile.data.len(),
        tile.metadata.width,
        tile.metadata.height
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Prefetch Command
// =============================================================================

async fn run_prefetch(config: PrefetchConfig) -> ExitCode {
    init_logging(config.source.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let client = Arc::new(build_client(&config.source).await);
    let bounds = config.bounds();
    let zooms = config.zoom_range();

    info!(
        "Planning z{}-z{} for ({}, {}) .. ({}, {})",
        zooms.start(),
        zooms.end(),
        config.south,
        config.west,
        config.north,
        config.east
    );

    let requests = match client.build_tiles_requests(&bounds, Some(zooms)).await {
        Ok(requests) => requests,
        Err(e) => {
            error!("Failed to plan requests: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let tile_count: usize = requests.iter().map(|r| r.tiles.len()).sum();
    let total_bytes: u64 = requests.iter().map(|r| r.total_bytes()).sum();
    info!(
        "  {} tile(s) in {} request(s), {:.2} MB",
        tile_count,
        requests.len(),
        total_bytes as f64 / (1024.0 * 1024.0)
    );

    if config.estimate_only {
        println!("{}", total_bytes);
        return ExitCode::SUCCESS;
    }
    if tile_count == 0 {
        warn!("No imagery in the requested region");
        return ExitCode::SUCCESS;
    }

    let started = Instant::now();
    let downloader = MogTileDownloader::new(client, config.output.clone());
    let mut tiles = Box::pin(downloader.download_tiles(requests));
    let mut written = 0u64;
    let mut written_bytes = 0u64;
    let mut failed = 0u64;

    while let Some(result) = tiles.next().await {
        match result {
            Ok(tile) => {
                written += 1;
                written_bytes += tile.bytes;
                if written % PROGRESS_INTERVAL == 0 {
                    info!("  {}/{} tiles", written, tile_count);
                }
            }
            Err(e) => {
                failed += 1;
                error!("  {}", e);
            }
        }
    }

    info!(
        "Wrote {} tile(s), {} bytes, to {} in {:.1}s",
        written,
        written_bytes,
        config.output.display(),
        started.elapsed().as_secs_f64()
    );

    if failed > 0 {
        error!("{} error(s) during download", failed);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

// =============================================================================
// Inspect Command
// =============================================================================

/// JSON view of a parsed MOG header.
#[derive(Serialize)]
struct MogSummary {
    source_url: String,
    anchor: TileCoordinates,
    levels: Vec<LevelSummary>,
}

#[derive(Serialize)]
struct LevelSummary {
    zoom: u8,
    origin_tile: TileCoordinates,
    tile_width: u32,
    tile_length: u32,
    image_width: u32,
    image_length: u32,
    tiles_x: u32,
    tiles_y: u32,
    present_tiles: usize,
    data_bytes: u64,
    jpeg_tables_bytes: usize,
    no_data_value: Option<f64>,
}

fn summarize(metadata: &MogMetadata) -> MogSummary {
    let levels = metadata
        .images_by_zoom
        .iter()
        .map(|(&zoom, image)| LevelSummary {
            zoom,
            origin_tile: image.origin_tile,
            tile_width: image.tile_width,
            tile_length: image.tile_length,
            image_width: image.image_width,
            image_length: image.image_length,
            tiles_x: image.tile_count_x(),
            tiles_y: image.tile_count_y(),
            present_tiles: image.byte_counts.iter().filter(|&&count| count > 0).count(),
            data_bytes: image.byte_counts.iter().sum(),
            jpeg_tables_bytes: image.jpeg_tables.len(),
            no_data_value: image.no_data_value,
        })
        .collect();

    MogSummary {
        source_url: metadata.source_url.clone(),
        anchor: metadata.bounds,
        levels,
    }
}

async fn run_inspect(config: InspectConfig) -> ExitCode {
    init_logging(config.source.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let client = build_client(&config.source).await;
    let coordinates = config.coordinates();

    let metadata = match client.metadata_for_tile(coordinates).await {
        Ok(Some(metadata)) => metadata,
        Ok(None) => {
            eprintln!("✗ No MOG holds tile {}", coordinates);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("✗ Failed to read header for {}: {}", coordinates, e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&summarize(&metadata)) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Initialize the tracing subscriber for logging.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mog_client=debug"
    } else {
        "mog_client=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Build a client over the configured storage (call validate() first).
async fn build_client(config: &SourceConfig) -> MogClient {
    let source: Arc<dyn ByteSource> = match config.storage() {
        Some(Storage::S3 {
            bucket,
            endpoint,
            region,
        }) => {
            info!("Reading from s3://{} ({})", bucket, region);
            let s3 = create_s3_client(endpoint.as_deref(), &region).await;
            Arc::new(S3ByteSource::new(s3, bucket))
        }
        Some(Storage::Local(root)) => {
            info!("Reading from {}", root.display());
            Arc::new(FileByteSource::new(root))
        }
        None => Arc::new(FileByteSource::new(Path::new("."))),
    };

    MogClient::with_config(config.collection(), source, config.client_config())
}
