// Path: crates/blob/src/iterator.rs

//! Streaming access to a batch of concurrently fetched alerts.

use std::future::Future;

use alertarc_schema::Alert;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::pool::WorkerPool;
use crate::BlobError;

/// A stream of alert messages produced by a fan-out fetch.
///
/// ```no_run
/// # async fn demo(mut iter: alertarc_blob::AlertIterator) {
/// while iter.next().await {
///     if let Some(alert) = iter.value() {
///         println!("{}", alert.candid);
///     }
/// }
/// if let Some(err) = iter.error() {
///     eprintln!("fetch failed: {err}");
/// }
/// # }
/// ```
pub struct AlertIterator {
    alerts: mpsc::Receiver<Alert>,
    errors: mpsc::Receiver<BlobError>,
    current: Option<Alert>,
    error: Option<BlobError>,
}

impl AlertIterator {
    /// Advances to the next alert. Returns `true` when [`value`] will yield
    /// an alert; `false` on end-of-stream or on a terminal error, in which
    /// case [`error`] tells the two apart.
    ///
    /// [`value`]: AlertIterator::value
    /// [`error`]: AlertIterator::error
    pub async fn next(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        tokio::select! {
            maybe_alert = self.alerts.recv() => match maybe_alert {
                Some(alert) => {
                    self.current = Some(alert);
                    true
                }
                None => {
                    self.current = None;
                    // Workers publish failures right before exiting; pick up
                    // a pending one so end-of-stream and failure are not
                    // conflated.
                    if let Ok(err) = self.errors.try_recv() {
                        self.error = Some(err);
                    }
                    false
                }
            },
            Some(err) = self.errors.recv() => {
                self.current = None;
                self.error = Some(err);
                false
            }
        }
    }

    /// The alert at the current position; can be read repeatedly without
    /// advancing.
    pub fn value(&self) -> Option<&Alert> {
        self.current.as_ref()
    }

    /// Takes ownership of the alert at the current position.
    pub fn take_value(&mut self) -> Option<Alert> {
        self.current.take()
    }

    /// The first error the stream hit, if any.
    pub fn error(&self) -> Option<&BlobError> {
        self.error.as_ref()
    }

    /// Consumes the iterator, yielding the first error if there was one.
    pub fn into_error(self) -> Option<BlobError> {
        self.error
    }
}

/// Fetches every URL with `fetch`, one spawned task per URL gated by the
/// pool.
///
/// Workers take the pool permit themselves, so `fetch` must not claim one of
/// its own. The permit is held until the result has been published; both
/// result channels are buffered to exactly the pool capacity, so a slow
/// consumer stalls workers mid-send and throttles the fan-out.
pub(crate) fn read_concurrently<F, Fut>(
    pool: WorkerPool,
    urls: Vec<String>,
    fetch: F,
) -> AlertIterator
where
    F: Fn(String) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<Alert, BlobError>> + Send + 'static,
{
    let (alert_tx, alert_rx) = mpsc::channel(pool.capacity());
    let (error_tx, error_rx) = mpsc::channel(pool.capacity());

    let mut workers = JoinSet::new();
    for url in urls {
        let fetch = fetch.clone();
        let pool = pool.clone();
        let alert_tx = alert_tx.clone();
        let error_tx = error_tx.clone();
        workers.spawn(async move {
            let _permit = pool.acquire().await;
            match fetch(url).await {
                // A send fails only when the consumer has gone away; there
                // is nobody left to report to, so the result is dropped.
                Ok(alert) => {
                    let _ = alert_tx.send(alert).await;
                }
                // Only the first error is ever surfaced, so once the buffer
                // is full further errors are dropped rather than parking the
                // worker on a channel nobody is reading.
                Err(err) => {
                    let _ = error_tx.try_send(err);
                }
            }
        });
    }
    drop(alert_tx);
    drop(error_tx);

    // Supervisor: keeps the workers alive until every one has finished. The
    // alerts channel closes when the last worker drops its sender.
    tokio::spawn(async move { while workers.join_next().await.is_some() {} });

    AlertIterator {
        alerts: alert_rx,
        errors: error_rx,
        current: None,
        error: None,
    }
}
