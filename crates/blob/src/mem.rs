// Path: crates/blob/src/mem.rs

//! In-process blob store used by tests and local tooling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use alertarc_schema::Alert;
use async_trait::async_trait;

use crate::iterator::{read_concurrently, AlertIterator};
use crate::pool::{WorkerPool, PARALLELISM};
use crate::{key_for, parse_url, BlobError, Blobstore};

const MEM_BUCKET: &str = "mem";

/// A [`Blobstore`] holding payloads in a map.
///
/// URLs take the same `s3://mem/alerts/v1/...` shape as the real store so
/// the layers above stay oblivious. An optional per-read latency and an
/// in-flight high-water mark make the worker-pool behavior observable.
#[derive(Clone)]
pub struct MemoryBlobstore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    pool: WorkerPool,
    latency: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MemoryBlobstore {
    /// An empty store with no injected latency.
    pub fn new() -> Self {
        Self::with_latency(None)
    }

    /// An empty store whose every read sleeps for `latency` first.
    pub fn with_latency(latency: Option<Duration>) -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
            pool: WorkerPool::new(PARALLELISM),
            latency,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of payloads stored.
    pub fn len(&self) -> usize {
        match self.blobs.read() {
            Ok(map) => map.len(),
            Err(_) => 0,
        }
    }

    /// True when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The highest number of reads that were ever in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Lookup + decode without claiming a pool permit; callers hold one
    /// already.
    async fn fetch(&self, url: &str) -> Result<Alert, BlobError> {
        parse_url(url)?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let bytes = self
            .blobs
            .read()
            .ok()
            .and_then(|map| map.get(url).cloned());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let bytes = bytes.ok_or_else(|| BlobError::NotFound {
            url: url.to_string(),
        })?;
        Ok(Alert::deserialize(&bytes)?)
    }
}

impl Default for MemoryBlobstore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Blobstore for MemoryBlobstore {
    async fn write(&self, alert: &Alert) -> Result<(usize, String), BlobError> {
        let bytes = alert.serialize()?;
        let size = bytes.len();
        let url = format!("s3://{}/{}", MEM_BUCKET, key_for(alert));
        if let Ok(mut map) = self.blobs.write() {
            map.insert(url.clone(), bytes);
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use alertarc_schema::Candidate;
    use tokio::time::Instant;

    fn alert(candid: i64, object_id: &str) -> Alert {
        Alert {
            candid,
            object_id: object_id.to_string(),
            candidate: Candidate {
                jd: 2_459_000.5,
                ra: 120.5,
                dec: -33.25,
                fid: 1,
                magpsf: Some(18.5),
                sigmapsf: None,
                diffmaglim: None,
                isdiffpos: None,
            },
            cutout_science: None,
            cutout_template: None,
            cutout_difference: None,
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = MemoryBlobstore::new();
        let a = alert(12345, "ZTF18abc");
        let (size, url) = store.write(&a).await.unwrap();
        assert!(size > 0);
        assert_eq!(url, "s3://mem/alerts/v1/ZTF18abc/12345");
        assert_eq!(store.read(&url).await.unwrap(), a);
    }

    #[tokio::test]
    async fn read_of_unknown_url_is_not_found() {
        let store = MemoryBlobstore::new();
        let err = store.read("s3://mem/alerts/v1/none/1").await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound { .. }));
    }

    #[tokio::test]
    async fn read_many_returns_every_alert() {
        let store = MemoryBlobstore::new();
        let mut urls = Vec::new();
        for candid in 0..20 {
            let (_, url) = store.write(&alert(candid, "OBJ")).await.unwrap();
            urls.push(url);
        }

        let mut iter = store.read_many(urls).await;
        let mut candids = Vec::new();
        while iter.next().await {
            candids.push(iter.take_value().unwrap().candid);
        }
        assert!(iter.error().is_none());
        candids.sort_unstable();
        assert_eq!(candids, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn read_many_with_no_urls_terminates_cleanly() {
        let store = MemoryBlobstore::new();
        let mut iter = store.read_many(Vec::new()).await;
        assert!(!iter.next().await);
        assert!(iter.error().is_none());
        assert!(iter.value().is_none());
    }

    #[tokio::test]
    async fn read_many_reports_worker_errors() {
        let store = MemoryBlobstore::new();
        let (_, good) = store.write(&alert(1, "OBJ")).await.unwrap();

        let mut iter = store
            .read_many(vec![good, "bogus://nope".to_string()])
            .await;
        let mut seen = 0;
        while iter.next().await {
            seen += 1;
        }
        assert!(iter.error().is_some());
        assert!(seen <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_many_is_bounded_by_the_worker_pool() {
        let store = MemoryBlobstore::with_latency(Some(Duration::from_millis(10)));
        let mut urls = Vec::new();
        for candid in 0..1000 {
            let (_, url) = store.write(&alert(candid, "OBJ")).await.unwrap();
            urls.push(url);
        }

        let start = Instant::now();
        let mut iter = store.read_many(urls).await;
        let mut n = 0;
        while iter.next().await {
            n += 1;
        }
        let elapsed = start.elapsed();

        assert_eq!(n, 1000);
        assert!(iter.error().is_none());
        assert!(store.peak_in_flight() <= PARALLELISM);
        // ceil(1000 / 64) rounds of 10 ms each.
        assert!(
            elapsed >= Duration::from_millis(150) && elapsed <= Duration::from_millis(250),
            "elapsed {elapsed:?}"
        );
    }
}
