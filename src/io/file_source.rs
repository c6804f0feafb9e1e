use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use super::source::{range_len, ByteRange, ByteSource, ByteStream};
use crate::error::IoError;

/// Local filesystem implementation of [`ByteSource`].
///
/// Object paths are resolved relative to a root directory, so the same
/// `{base}/{z}/{x}/{y}.tif` templates work against a mirrored bucket on disk.
#[derive(Debug, Clone)]
pub struct FileByteSource {
    root: PathBuf,
}

impl FileByteSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory that object paths are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ByteSource for FileByteSource {
    async fn open(&self, path: &str, range: Option<ByteRange>) -> Result<ByteStream, IoError> {
        let full_path = self.resolve(path);
        let mut file = File::open(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IoError::NotFound(full_path.display().to_string())
            } else {
                IoError::Local(format!("{}: {}", full_path.display(), e))
            }
        })?;

        match range {
            None => Ok(Box::pin(file)),
            Some(range) => {
                debug!(path = %full_path.display(), start = range.start(), end = range.end(), "Opening file range");
                file.seek(SeekFrom::Start(*range.start()))
                    .await
                    .map_err(|e| IoError::Local(e.to_string()))?;
                Ok(Box::pin(file.take(range_len(&range))))
            }
        }
    }
}
