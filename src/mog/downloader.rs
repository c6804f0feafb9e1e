//! Offline tile download into a `{z}/{x}/{y}.jpg` tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::debug;

use super::client::MogClient;
use super::request::MogTilesRequest;
use super::tile::MogTile;
use crate::error::{IoError, MogError};
use crate::tiles::TileCoordinates;

/// One tile written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedTile {
    pub coordinates: TileCoordinates,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Writes fetched tiles below a root directory.
pub struct MogTileDownloader {
    client: Arc<MogClient>,
    root: PathBuf,
}

impl MogTileDownloader {
    pub fn new(client: Arc<MogClient>, root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch and store the tiles of `requests`, yielding one item per tile.
    ///
    /// Each tile is written to a temporary file and renamed into place, so an
    /// interrupted download never leaves a truncated `.jpg` behind. A failed
    /// tile is yielded as an error and the stream carries on with the rest.
    pub fn download_tiles(
        &self,
        requests: Vec<MogTilesRequest>,
    ) -> impl Stream<Item = Result<DownloadedTile, MogError>> + Send + 'static {
        let root = self.root.clone();
        self.client.get_tiles(requests).then(move |result| {
            let root = root.clone();
            async move {
                match result {
                    Ok(tile) => write_tile(&root, tile).await,
                    Err(e) => Err(e),
                }
            }
        })
    }

    /// Download everything and return the total bytes written.
    ///
    /// Stops at the first error.
    pub async fn download_all(&self, requests: Vec<MogTilesRequest>) -> Result<u64, MogError> {
        let mut total = 0;
        let mut tiles = Box::pin(self.download_tiles(requests));
        while let Some(tile) = tiles.next().await {
            total += tile?.bytes;
        }
        Ok(total)
    }
}

async fn write_tile(root: &Path, tile: MogTile) -> Result<DownloadedTile, MogError> {
    let coordinates = tile.metadata.tile_coordinates;
    let path = root.join(coordinates.tile_path());
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| local_error(parent, e))?;
    }

    let partial = path.with_extension("jpg.part");
    tokio::fs::write(&partial, &tile.data)
        .await
        .map_err(|e| local_error(&partial, e))?;
    tokio::fs::rename(&partial, &path)
        .await
        .map_err(|e| local_error(&path, e))?;

    debug!(tile = %coordinates, bytes = tile.data.len(), "Wrote tile");
    Ok(DownloadedTile {
        coordinates,
        path,
        bytes: tile.data.len() as u64,
    })
}

fn local_error(path: &Path, e: std::io::Error) -> MogError {
    MogError::Io(IoError::Local(format!("{}: {}", path.display(), e)))
}
