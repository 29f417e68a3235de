//! Store operational metrics.
//!
//! Everything is registered in a per-store Prometheus [`Registry`] so the
//! embedding process can expose it with [`StoreMetrics::export_text`].
//! Operation outcomes are counted in `beacon_operations_total`, labelled by
//! `component`, `action` and `outcome`.

use std::fmt;
use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::{Deserialize, Serialize};

const COMPONENT: &str = "store";
const SUCCESS: &str = "success";
const FAILURE: &str = "failure";

/// Counters and gauges updated by the store and its reconciler.
pub struct StoreMetrics {
    registry: Registry,
    snapshot_size_bytes: IntGauge,
    snapshot_last_duration_micros: IntGauge,
    snapshot_duration_seconds: Histogram,
    operations_total: IntCounterVec,
    gc_removed_total: IntCounter,
}

/// Point-in-time copy of [`StoreMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetricsSnapshot {
    /// Size of the last successful snapshot in bytes.
    pub last_snapshot_bytes: u64,
    /// Duration of the last successful snapshot in microseconds.
    pub last_snapshot_micros: u64,
    /// Number of successful snapshots.
    pub snapshots_succeeded: u64,
    /// Number of failed snapshots.
    pub snapshots_failed: u64,
    /// Number of successful reconciliation cycles.
    pub reconciles_succeeded: u64,
    /// Number of failed reconciliation cycles.
    pub reconciles_failed: u64,
    /// Overlay entries removed by garbage collection.
    pub gc_removed: u64,
}

impl StoreMetrics {
    /// Creates the metrics and registers them in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric cannot be created or registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let snapshot_size_bytes = IntGauge::new(
            "beacon_store_snapshot_size_bytes",
            "Size of the last successful snapshot in bytes",
        )?;
        registry.register(Box::new(snapshot_size_bytes.clone()))?;

        let snapshot_last_duration_micros = IntGauge::new(
            "beacon_store_snapshot_last_duration_microseconds",
            "Duration of the last successful snapshot in microseconds",
        )?;
        registry.register(Box::new(snapshot_last_duration_micros.clone()))?;

        let snapshot_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "beacon_store_snapshot_duration_seconds",
                "Time taken to write a snapshot",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        )?;
        registry.register(Box::new(snapshot_duration_seconds.clone()))?;

        let operations_total = IntCounterVec::new(
            Opts::new("beacon_operations_total", "Operations by outcome"),
            &["component", "action", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let gc_removed_total = IntCounter::new(
            "beacon_store_gc_removed_total",
            "Overlay entries removed by garbage collection",
        )?;
        registry.register(Box::new(gc_removed_total.clone()))?;

        Ok(Self {
            registry,
            snapshot_size_bytes,
            snapshot_last_duration_micros,
            snapshot_duration_seconds,
            operations_total,
            gc_removed_total,
        })
    }

    pub(crate) fn record_snapshot(&self, bytes: u64, elapsed: Duration) {
        let micros = i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX);
        self.snapshot_size_bytes
            .set(i64::try_from(bytes).unwrap_or(i64::MAX));
        self.snapshot_last_duration_micros.set(micros);
        self.snapshot_duration_seconds.observe(elapsed.as_secs_f64());
        self.outcome("snapshot", SUCCESS).inc();
    }

    pub(crate) fn record_snapshot_failure(&self) {
        self.outcome("snapshot", FAILURE).inc();
    }

    pub(crate) fn record_reconcile(&self, removed: usize) {
        self.outcome("reconcile", SUCCESS).inc();
        self.gc_removed_total.inc_by(removed as u64);
    }

    pub(crate) fn record_reconcile_failure(&self) {
        self.outcome("reconcile", FAILURE).inc();
    }

    fn outcome(&self, action: &str, outcome: &str) -> IntCounter {
        self.operations_total
            .with_label_values(&[COMPONENT, action, outcome])
    }

    /// Returns the registry holding the store's metrics.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders all metrics in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn export_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Returns the current values.
    #[must_use]
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        let gauge = |g: &IntGauge| u64::try_from(g.get()).unwrap_or(0);
        StoreMetricsSnapshot {
            last_snapshot_bytes: gauge(&self.snapshot_size_bytes),
            last_snapshot_micros: gauge(&self.snapshot_last_duration_micros),
            snapshots_succeeded: self.outcome("snapshot", SUCCESS).get(),
            snapshots_failed: self.outcome("snapshot", FAILURE).get(),
            reconciles_succeeded: self.outcome("reconcile", SUCCESS).get(),
            reconciles_failed: self.outcome("reconcile", FAILURE).get(),
            gc_removed: self.gc_removed_total.get(),
        }
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        // Metric names and labels are fixed and valid.
        Self::new().unwrap_or_else(|_| unreachable!())
    }
}

impl fmt::Debug for StoreMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreMetrics")
            .field("values", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(StoreMetrics::default().snapshot(), StoreMetricsSnapshot::default());
    }

    #[test]
    fn records_snapshot_and_reconcile() {
        let metrics = StoreMetrics::default();
        metrics.record_snapshot(128, Duration::from_millis(3));
        metrics.record_snapshot(256, Duration::from_micros(40));
        metrics.record_snapshot_failure();
        metrics.record_reconcile(2);
        metrics.record_reconcile(1);
        metrics.record_reconcile_failure();

        let snap = metrics.snapshot();
        assert_eq!(snap.last_snapshot_bytes, 256);
        assert_eq!(snap.last_snapshot_micros, 40);
        assert_eq!(snap.snapshots_succeeded, 2);
        assert_eq!(snap.snapshots_failed, 1);
        assert_eq!(snap.reconciles_succeeded, 2);
        assert_eq!(snap.reconciles_failed, 1);
        assert_eq!(snap.gc_removed, 3);
        assert_eq!(metrics.snapshot_duration_seconds.get_sample_count(), 2);
    }

    #[test]
    fn stores_do_not_share_registries() {
        let first = StoreMetrics::default();
        let second = StoreMetrics::default();
        first.record_reconcile(1);

        assert_eq!(first.snapshot().reconciles_succeeded, 1);
        assert_eq!(second.snapshot().reconciles_succeeded, 0);
    }

    #[test]
    fn exports_prometheus_text() {
        let metrics = StoreMetrics::default();
        metrics.record_snapshot(512, Duration::from_millis(2));
        metrics.record_reconcile_failure();

        let text = metrics.export_text().unwrap();
        assert!(text.contains("beacon_store_snapshot_size_bytes 512"));
        assert!(text.contains("beacon_store_snapshot_duration_seconds_count 1"));
        assert!(text.contains("beacon_store_gc_removed_total 0"));
        assert!(text.lines().any(|line| line.starts_with("beacon_operations_total")
            && line.contains(r#"action="reconcile""#)
            && line.contains(r#"outcome="failure""#)
            && line.ends_with(" 1")));
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn serializes_to_json() {
        let snap = StoreMetricsSnapshot {
            gc_removed: 4,
            ..StoreMetricsSnapshot::default()
        };
        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["gc_removed"], 4);
    }
}
