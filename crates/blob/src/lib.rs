// Path: crates/blob/src/lib.rs

//! Alert payload storage.
//!
//! The index layer stores URLs; this crate turns URLs back into alerts. The
//! [`Blobstore`] trait abstracts the remote object store; [`S3Blobstore`] is
//! the production implementation and [`MemoryBlobstore`] the in-process test
//! double. Bulk reads fan out through a fixed-capacity [`WorkerPool`] and are
//! consumed through an [`AlertIterator`].

use alertarc_schema::{Alert, SchemaError};
use async_trait::async_trait;
use thiserror::Error;

pub mod iterator;
pub mod mem;
pub mod pool;
pub mod s3;

pub use iterator::AlertIterator;
pub use mem::MemoryBlobstore;
pub use pool::{WorkerPool, PARALLELISM};
pub use s3::S3Blobstore;

/// Errors from the blob storage layer.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The URL does not use a recognized scheme or lacks an object key.
    #[error("malformed blob URL {url:?}: {reason}")]
    MalformedUrl {
        /// The offending URL.
        url: String,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// The remote object store rejected or failed the request.
    #[error("remote object store error for {url}: {message}")]
    Remote {
        /// URL of the object involved.
        url: String,
        /// Remote failure rendered as text.
        message: String,
    },
    /// No blob is stored under the URL.
    #[error("no blob stored at {url}")]
    NotFound {
        /// URL of the missing object.
        url: String,
    },
    /// The payload failed to encode or decode.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl BlobError {
    pub(crate) fn remote(url: &str, err: impl std::fmt::Display) -> Self {
        BlobError::Remote {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Where alert payloads live.
///
/// `write` returns the payload size in bytes together with the URL the alert
/// is now retrievable from; the URL is opaque to everything above this crate.
#[async_trait]
pub trait Blobstore: Send + Sync {
    /// Serializes and stores one alert, returning `(size, url)`.
    async fn write(&self, alert: &Alert) -> Result<(usize, String), BlobError>;

    /// Fetches and decodes the alert stored at `url`.
    async fn read(&self, url: &str) -> Result<Alert, BlobError>;

    /// Fetches many alerts concurrently; arrival order, not input order.
    async fn read_many(&self, urls: Vec<String>) -> AlertIterator;
}

const S3_SCHEME: &str = "s3://";
const GCS_PREFIX: &str = "https://storage.googleapis.com/";

/// Splits a blob URL into `(bucket, key)`.
///
/// Both the `s3://bucket/key` form and the Google Cloud Storage
/// `https://storage.googleapis.com/bucket/key` form are accepted; anything
/// else is malformed.
pub fn parse_url(url: &str) -> Result<(String, String), BlobError> {
    let rest = if let Some(rest) = url.strip_prefix(S3_SCHEME) {
        rest
    } else if let Some(rest) = url.strip_prefix(GCS_PREFIX) {
        rest
    } else {
        return Err(BlobError::MalformedUrl {
            url: url.to_string(),
            reason: "unrecognized scheme",
        });
    };
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(BlobError::MalformedUrl {
            url: url.to_string(),
            reason: "missing key",
        }),
    }
}

/// The object key an alert is stored under, shared by every store
/// implementation.
pub(crate) fn key_for(alert: &Alert) -> String {
    format!("alerts/v1/{}/{}", alert.object_id, alert.candid)
}
