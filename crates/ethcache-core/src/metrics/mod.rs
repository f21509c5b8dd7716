//! Prometheus metrics collection.
//!
//! Counters are recorded inline on the request path (lock-free atomic
//! increments via the `metrics` facade); the two cache gauges are refreshed
//! by [`run_sampler`], a periodic probe of the store, because computing them
//! inline would add a database round trip to every request.
//!
//! Exported series:
//!
//! | name | type | labels |
//! |------|------|--------|
//! | `ethereum_cache_hits_total` | counter | `method` |
//! | `ethereum_cache_misses_total` | counter | `method` |
//! | `ethereum_cache_size_bytes` | gauge | |
//! | `ethereum_cache_items_count` | gauge | |

use crate::store::CacheStore;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// How often the sampler refreshes the size and item-count gauges.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(15);

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                // A recorder is already installed (another component or a
                // second collector in tests); fall back to a local recorder
                // so rendering still works.
                warn!(error = %e, "failed to install Prometheus recorder, using fallback");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Records the cache counters and renders the Prometheus exposition text.
pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { prometheus_handle: init_prometheus_recorder() }
    }

    /// Record a cache hit for `method`.
    pub fn record_cache_hit(&self, method: &str) {
        counter!("ethereum_cache_hits_total", "method" => method.to_string()).increment(1);
    }

    /// Record a cache miss for `method`.
    pub fn record_cache_miss(&self, method: &str) {
        counter!("ethereum_cache_misses_total", "method" => method.to_string()).increment(1);
    }

    /// Set the sampled cache size gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_cache_size(&self, bytes: i64) {
        gauge!("ethereum_cache_size_bytes").set(bytes as f64);
    }

    /// Set the sampled item-count gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_cache_item_count(&self, count: i64) {
        gauge!("ethereum_cache_items_count").set(count as f64);
    }

    /// Renders the current metrics in Prometheus text exposition format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus_handle.render()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic size/count probe. Samples once immediately, then every
/// `interval` until shutdown.
pub async fn run_sampler(
    store: Arc<dyn CacheStore>,
    collector: Arc<MetricsCollector>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sample(store.as_ref(), &collector).await;
            }
            _ = shutdown_rx.recv() => {
                debug!("metrics sampler shutting down");
                break;
            }
        }
    }
}

async fn sample(store: &dyn CacheStore, collector: &MetricsCollector) {
    match store.size().await {
        Ok(size) => collector.record_cache_size(size),
        Err(e) => warn!(error = %e, "failed to sample cache size"),
    }

    match store.item_count().await {
        Ok(count) => collector.record_cache_item_count(count),
        Err(e) => warn!(error = %e, "failed to sample cache item count"),
    }
}
