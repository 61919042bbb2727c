// Path: crates/db/src/lib.rs

//! The alert database: secondary indexes over blob-stored payloads.
//!
//! Ingest writes the payload to the blob store first and indexes the
//! returned URL second; queries run the other way around, resolving index
//! hits back into alerts through the blob layer. Database-level statistics
//! live in a JSON sidecar that is rewritten on close.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alertarc_blob::{BlobError, Blobstore};
use alertarc_index::{IndexEngine, IndexError};
use alertarc_schema::Alert;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod meta;

pub use meta::{DaySet, DbMeta};

/// File name of the metadata sidecar inside the database directory.
pub const META_FILE: &str = "meta.json";

/// Errors from the database facade.
#[derive(Debug, Error)]
pub enum DbError {
    /// An index operation failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// A blob operation failed.
    #[error(transparent)]
    Blob(#[from] BlobError),
    /// The metadata sidecar could not be read or written.
    #[error("metadata io error: {0}")]
    MetaIo(#[from] std::io::Error),
    /// The metadata sidecar held invalid JSON.
    #[error("metadata encoding error: {0}")]
    MetaJson(#[from] serde_json::Error),
    /// The pixel index was built at a different HEALPix order than requested.
    ///
    /// Opening anyway would silently reinterpret every pixel key as a
    /// different sky region.
    #[error("pixel index was built at HEALPix order {stored}, refusing to open at order {requested}")]
    OrderMismatch {
        /// Order recorded in the metadata sidecar.
        stored: u8,
        /// Order the caller asked for.
        requested: u8,
    },
}

/// An alert archive rooted at one directory, backed by one blob store.
///
/// Ingest is single-writer (`add` takes `&mut self`); queries may run
/// concurrently from clones of the underlying stores via separate handles,
/// but one `Database` value is the expected access path.
pub struct Database {
    dir: PathBuf,
    index: IndexEngine,
    blobs: Arc<dyn Blobstore>,
    meta: DbMeta,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dir", &self.dir)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (creating as needed) the database under `dir` with the pixel
    /// index at `order`.
    ///
    /// When a metadata sidecar exists its recorded order must match `order`,
    /// otherwise [`DbError::OrderMismatch`] is returned and nothing is
    /// touched.
    pub fn open(
        dir: impl AsRef<Path>,
        order: u8,
        blobs: Arc<dyn Blobstore>,
    ) -> Result<Self, DbError> {
        let dir = dir.as_ref().to_path_buf();
        let index = IndexEngine::open(&dir, order)?;
        let meta_path = dir.join(META_FILE);
        let meta = if meta_path.exists() {
            let stored = DbMeta::read_from(File::open(&meta_path)?)?;
            if stored.healpix_order != order {
                return Err(DbError::OrderMismatch {
                    stored: stored.healpix_order,
                    requested: order,
                });
            }
            stored
        } else {
            DbMeta::new(order)
        };
        Ok(Self {
            dir,
            index,
            blobs,
            meta,
        })
    }

    /// The current database statistics.
    pub fn meta(&self) -> &DbMeta {
        &self.meta
    }

    /// Stores and indexes one alert.
    ///
    /// The payload is written to the blob store first; if indexing fails
    /// afterwards the blob stays behind as an orphan (there is no rollback).
    pub async fn add(&mut self, alert: &Alert) -> Result<(), DbError> {
        tracing::debug!(candid = alert.candid, object_id = %alert.object_id, "adding alert");
        let (size, url) = self.blobs.write(alert).await?;
        self.meta.n_bytes += size as u64;
        self.index.add(alert, &url)?;
        self.meta.n_alerts += 1;
        self.meta.mark_timestamps(alert);
        tracing::debug!(candid = alert.candid, url = %url, "added alert");
        Ok(())
    }

    /// The alert with this candid. Index `NotFound` propagates as an error:
    /// a single-record lookup has no empty result to fall back on.
    pub async fn get_by_candidate_id(&self, id: u64) -> Result<Alert, DbError> {
        let url = self.index.get_by_candidate(id)?;
        Ok(self.blobs.read(&url).await?)
    }

    /// Every alert of one object, in insertion order. Unknown objects yield
    /// an empty list.
    ///
    /// Objects accumulate tens of alerts, not thousands; the payloads are
    /// fetched serially.
    pub async fn get_by_object_id(&self, id: &str) -> Result<Vec<Alert>, DbError> {
        let urls = match self.index.get_by_object(id) {
            Err(IndexError::NotFound) => return Ok(Vec::new()),
            other => other?,
        };
        let mut alerts = Vec::with_capacity(urls.len());
        for url in &urls {
            alerts.push(self.blobs.read(url).await?);
        }
        Ok(alerts)
    }

    /// Every alert observed in `[start, end)` Julian Dates, fully
    /// materialized. Payload fetches fan out; the returned order is arrival
    /// order, not time order.
    pub async fn get_by_timerange(&self, start: f64, end: f64) -> Result<Vec<Alert>, DbError> {
        let urls = self.index.get_by_timerange(start, end)?;
        self.collect_many(urls).await
    }

    /// Every alert within (or near — pixel coverage is inclusive) a disc of
    /// `radius_rad` radians around (`ra`, `dec`) degrees. Arrival order.
    pub async fn get_by_cone(
        &self,
        ra: f64,
        dec: f64,
        radius_rad: f64,
    ) -> Result<Vec<Alert>, DbError> {
        let urls = self.index.get_by_cone(ra, dec, radius_rad)?;
        self.collect_many(urls).await
    }

    /// Streams every alert observed in `[start, end)` into `sink` as fetches
    /// complete. The sink is closed once the stream is exhausted; a fetch
    /// error is returned after the sink has been closed.
    pub async fn stream_by_timerange(
        &self,
        start: f64,
        end: f64,
        sink: mpsc::Sender<Alert>,
    ) -> Result<(), DbError> {
        let urls = self.index.get_by_timerange(start, end)?;
        let mut iter = self.blobs.read_many(urls).await;
        while iter.next().await {
            if let Some(alert) = iter.take_value() {
                if sink.send(alert).await.is_err() {
                    // The consumer hung up; stop forwarding.
                    break;
                }
            }
        }
        drop(sink);
        match iter.into_error() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    async fn collect_many(&self, urls: Vec<String>) -> Result<Vec<Alert>, DbError> {
        let mut iter = self.blobs.read_many(urls).await;
        let mut alerts = Vec::new();
        while iter.next().await {
            if let Some(alert) = iter.take_value() {
                alerts.push(alert);
            }
        }
        match iter.into_error() {
            Some(err) => Err(err.into()),
            None => Ok(alerts),
        }
    }

    /// Flushes the metadata sidecar, then closes the index engine.
    pub fn close(self) -> Result<(), DbError> {
        let meta_path = self.dir.join(META_FILE);
        let file = File::create(&meta_path)?;
        self.meta.write_to(file)?;
        self.index.close()?;
        Ok(())
    }
}
