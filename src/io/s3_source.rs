use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::debug;

use super::source::{range_header, ByteRange, ByteSource, ByteStream};
use crate::error::IoError;

/// S3-backed implementation of [`ByteSource`].
///
/// Streams objects from S3 or S3-compatible storage (MinIO, GCS, etc.) with
/// `GetObject`, adding an HTTP `Range` header for ranged opens. The response
/// body is handed out as it arrives; nothing is collected in memory.
#[derive(Clone)]
pub struct S3ByteSource {
    client: Client,
    bucket: String,
}

impl S3ByteSource {
    /// Create a source for objects in `bucket`.
    ///
    /// Object paths passed to [`ByteSource::open`] are used as keys.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl ByteSource for S3ByteSource {
    async fn open(&self, path: &str, range: Option<ByteRange>) -> Result<ByteStream, IoError> {
        let key = path.trim_start_matches('/');
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(range) = &range {
            request = request.range(range_header(range));
        }
        debug!(url = %self.object_url(key), ?range, "GetObject");

        let response = request.send().await.map_err(|e| {
            let is_no_such_key = e
                .as_service_error()
                .map(|se| se.is_no_such_key())
                .unwrap_or(false);

            // Some S3-compatible stores answer with a bare 404 instead of NoSuchKey
            let status_is_404 = e
                .raw_response()
                .map(|r| r.status().as_u16() == 404)
                .unwrap_or(false);

            if is_no_such_key || status_is_404 {
                return IoError::NotFound(self.object_url(key));
            }

            let err_str = e.to_string();
            if err_str.contains("NoSuchKey") || err_str.contains("NotFound") {
                return IoError::NotFound(self.object_url(key));
            }

            IoError::S3(err_str)
        })?;

        Ok(Box::pin(response.body.into_async_read()))
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint.
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(endpoint_url.is_some())
        .build();

    Client::from_conf(s3_config)
}
