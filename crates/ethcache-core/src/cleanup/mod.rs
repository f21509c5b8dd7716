//! Size-bounded cache eviction.
//!
//! The cleanup manager owns a long-lived worker that keeps the store's size
//! estimate under the configured cap. The worker is notify-driven rather than
//! periodic: cache growth is strictly tied to writes, so writes are the only
//! event that can push the size above the cap (read hits bump timestamps but
//! do not grow the cache).
//!
//! # Coalescing trigger
//!
//! [`CleanupNotifier::notify`] is non-blocking and coalescing: any number of
//! notifications arriving while the worker is busy collapse into a single
//! stored permit, consumed on the next loop iteration. `tokio::sync::Notify`
//! provides exactly this capacity-one semantics.
//!
//! # Eviction pass
//!
//! On each signal the worker reads the current size; when it exceeds the cap
//! it asks the store to free `size − cap × (1 − slack_ratio)` bytes in one
//! prune round trip. The slack keeps successive writes from thrashing right
//! at the boundary. Store errors are logged and retried on the next notify,
//! never fatal.

use crate::store::CacheStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default fraction of the cap released below the cap on each pass.
const DEFAULT_SLACK_RATIO: f64 = 0.2;

/// Cloneable write-notification handle handed to the proxy pipeline.
#[derive(Clone)]
pub struct CleanupNotifier {
    trigger: Arc<Notify>,
}

impl CleanupNotifier {
    /// Signals the worker that a write happened. Never blocks; a pending
    /// signal makes this a no-op.
    pub fn notify(&self) {
        self.trigger.notify_one();
    }
}

/// Owner of the eviction worker. Construct only when the cap is positive;
/// a cap of zero means eviction is disabled and no manager should exist.
pub struct CleanupManager {
    store: Arc<dyn CacheStore>,
    max_size_bytes: i64,
    slack_ratio: f64,
    trigger: Arc<Notify>,
    shutdown: broadcast::Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupManager {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, max_size_bytes: i64, slack_ratio: f64) -> Self {
        let slack_ratio = if slack_ratio <= 0.0 { DEFAULT_SLACK_RATIO } else { slack_ratio };
        let (shutdown, _) = broadcast::channel(1);

        Self {
            store,
            max_size_bytes,
            slack_ratio,
            trigger: Arc::new(Notify::new()),
            shutdown,
            worker: Mutex::new(None),
        }
    }

    /// Returns a handle the write path uses to signal the worker.
    #[must_use]
    pub fn notifier(&self) -> CleanupNotifier {
        CleanupNotifier { trigger: Arc::clone(&self.trigger) }
    }

    /// Spawns the worker. Calling `start` twice replaces the stored handle
    /// but the old worker keeps running until shutdown; don't.
    pub fn start(&self) {
        let store = Arc::clone(&self.store);
        let trigger = Arc::clone(&self.trigger);
        let shutdown_rx = self.shutdown.subscribe();
        let max = self.max_size_bytes;
        let slack = self.slack_ratio;

        let handle = tokio::spawn(run_worker(store, max, slack, trigger, shutdown_rx));
        *self.worker.lock() = Some(handle);
        info!(max_size_bytes = max, slack_ratio = slack, "cleanup worker started");
    }

    /// Signals shutdown and joins the worker.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(());
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        debug!("cleanup worker stopped");
    }
}

async fn run_worker(
    store: Arc<dyn CacheStore>,
    max_size_bytes: i64,
    slack_ratio: f64,
    trigger: Arc<Notify>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                debug!("cleanup worker received shutdown signal");
                break;
            }

            () = trigger.notified() => {
                run_cleanup_pass(store.as_ref(), max_size_bytes, slack_ratio).await;
            }
        }
    }
}

/// One eviction pass: size check, then a single size-targeted prune.
async fn run_cleanup_pass(store: &dyn CacheStore, max_size_bytes: i64, slack_ratio: f64) {
    let size = match store.size().await {
        Ok(size) => size,
        Err(e) => {
            warn!(error = %e, "failed to read cache size");
            return;
        }
    };

    if size <= max_size_bytes {
        return;
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let target = (max_size_bytes as f64 * (1.0 - slack_ratio)) as i64;
    let bytes_to_free = size - target;
    if bytes_to_free <= 0 {
        return;
    }

    match store.prune(bytes_to_free).await {
        Ok(freed) => info!(
            size_before = size,
            target_bytes = target,
            freed_bytes = freed,
            "cache pruned"
        ),
        Err(e) => warn!(error = %e, "cache prune failed"),
    }
}
