// Path: crates/blob/src/s3.rs

//! S3-backed blob store.

use alertarc_schema::Alert;
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::iterator::{read_concurrently, AlertIterator};
use crate::pool::{WorkerPool, PARALLELISM};
use crate::{key_for, parse_url, BlobError, Blobstore};

/// Stores alert payloads as S3 objects under `alerts/v1/{object_id}/{candid}`.
///
/// All reads, single or bulk, go through one fixed pool of
/// [`PARALLELISM`] workers, bounding the number of in-flight GETs per store.
#[derive(Clone)]
pub struct S3Blobstore {
    client: Client,
    bucket: String,
    pool: WorkerPool,
}

impl S3Blobstore {
    /// A store writing into `bucket` through the given client.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            pool: WorkerPool::new(PARALLELISM),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// GET + decode without claiming a pool permit; callers hold one already.
    async fn fetch(&self, url: &str) -> Result<Alert, BlobError> {
        let (bucket, key) = parse_url(url)?;
        tracing::debug!(bucket = %bucket, key = %key, "retrieving alert object");
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| BlobError::remote(url, DisplayErrorContext(e)))?;
        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| BlobError::remote(url, e))?
            .into_bytes();
        Ok(Alert::deserialize(&data)?)
    }
}

#[async_trait]
impl Blobstore for S3Blobstore {
    async fn write(&self, alert: &Alert) -> Result<(usize, String), BlobError> {
        let bytes = alert.serialize()?;
        let size = bytes.len();
        let key = key_for(alert);
        let url = self.url_for(&key);
        tracing::debug!(size, key = %key, "storing alert");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| BlobError::remote(&url, DisplayErrorContext(e)))?;
        Ok((size, url))
    }

    async fn read(&self, url: &str) -> Result<Alert, BlobError> {
        let _permit = self.pool.acquire().await;
        self.fetch(url).await
    }

    async fn read_many(&self, urls: Vec<String>) -> AlertIterator {
        let store = self.clone();
        read_concurrently(self.pool.clone(), urls, move |url| {
            let store = store.clone();
            async move { store.fetch(&url).await }
        })
    }
}
