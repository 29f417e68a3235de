//! The alert overlay store.
//!
//! [`AlertStore`] keeps two maps behind one lock:
//!
//! - the **overlay**, user-visible alerts carrying local annotations such as
//!   `acknowledgedBy`, which is what gets persisted;
//! - the **mirror**, the last alert list fetched from upstream, replaced on
//!   every reconciliation and used for liveness and label lookups.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::metrics::{StoreMetrics, StoreMetricsSnapshot};
use crate::persist::FilePersister;
use crate::types::{format_labels, Alert, Fingerprint, LabelSet};
use crate::upstream::{UpstreamAlert, UpstreamClient};

/// Configuration for the alert store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Period of the background reconciliation.
    pub recheck_interval: Duration,
    /// Minimum time after a successful refresh before a lookup miss may
    /// force another upstream query. Zero always re-queries.
    pub min_requery_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            recheck_interval: Duration::from_secs(60),
            min_requery_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) overlay: HashMap<Fingerprint, Alert>,
    pub(crate) mirror: HashMap<Fingerprint, Alert>,
    pub(crate) last_refresh: Option<Instant>,
}

/// Process-local, persisted overlay over the upstream alert list.
///
/// Cloning is cheap and yields a handle to the same store.
#[derive(Debug)]
pub struct AlertStore {
    config: StoreConfig,
    pub(crate) state: Arc<RwLock<StoreState>>,
    pub(crate) upstream: Arc<dyn UpstreamClient>,
    persister: Option<Arc<FilePersister>>,
    pub(crate) metrics: Arc<StoreMetrics>,
    /// Serializes reconciliation cycles. Never held together with `state`
    /// across an await.
    pub(crate) cycle_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Clone for AlertStore {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            upstream: Arc::clone(&self.upstream),
            persister: self.persister.clone(),
            metrics: Arc::clone(&self.metrics),
            cycle_lock: Arc::clone(&self.cycle_lock),
        }
    }
}

impl AlertStore {
    /// Creates a store.
    ///
    /// With a persister the last snapshot is loaded; if that fails the store
    /// starts empty. Without one the store is stateless and
    /// [`AlertStore::snapshot`] returns `StoreError::PersistenceDisabled`.
    #[must_use]
    pub fn new(
        config: StoreConfig,
        upstream: Arc<dyn UpstreamClient>,
        persister: Option<FilePersister>,
    ) -> Self {
        let overlay = match persister.as_ref().map(FilePersister::load) {
            Some(Ok(alerts)) => alerts,
            Some(Err(e)) => {
                warn!(error = %e, "cannot load alert snapshot, starting with an empty store");
                HashMap::new()
            }
            None => {
                info!("persistence disabled, running stateless");
                HashMap::new()
            }
        };

        Self {
            config,
            state: Arc::new(RwLock::new(StoreState {
                overlay,
                ..StoreState::default()
            })),
            upstream,
            persister: persister.map(Arc::new),
            metrics: Arc::new(StoreMetrics::default()),
            cycle_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the upstream client the store reconciles against.
    #[must_use]
    pub fn upstream(&self) -> &Arc<dyn UpstreamClient> {
        &self.upstream
    }

    /// Returns the snapshot path, if persistence is enabled.
    #[must_use]
    pub fn persistence_path(&self) -> Option<&Path> {
        self.persister.as_deref().map(FilePersister::path)
    }

    // ============ Overlay Access ============

    /// Gets an alert by fingerprint.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the overlay holds no such alert.
    pub fn get(&self, fingerprint: Fingerprint) -> Result<Alert> {
        self.state
            .read()
            .overlay
            .get(&fingerprint)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                fingerprint: fingerprint.to_string(),
            })
    }

    /// Gets an alert by the textual form of its fingerprint.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidFingerprint` if `value` does not parse and
    /// `StoreError::NotFound` if it parses but is unknown.
    pub fn get_by_fingerprint_str(&self, value: &str) -> Result<Alert> {
        let fingerprint: Fingerprint = value.parse()?;
        self.get(fingerprint)
    }

    /// Inserts or replaces an alert.
    pub fn set(&self, alert: Alert) {
        debug!(fingerprint = %alert.fingerprint, alertname = %alert.name(), "set alert");
        self.state.write().overlay.insert(alert.fingerprint, alert);
    }

    /// Returns copies of all overlay alerts.
    #[must_use]
    pub fn list(&self) -> Vec<Alert> {
        self.state.read().overlay.values().cloned().collect()
    }

    /// Removes an alert. Removing an unknown fingerprint is a no-op.
    pub fn delete(&self, fingerprint: Fingerprint) {
        if self.state.write().overlay.remove(&fingerprint).is_some() {
            debug!(fingerprint = %fingerprint, "deleted alert");
        }
    }

    /// Returns the number of overlay alerts.
    #[must_use]
    pub fn count(&self) -> usize {
        self.state.read().overlay.len()
    }

    /// Returns the number of alerts seen upstream in the last refresh.
    #[must_use]
    pub fn mirror_count(&self) -> usize {
        self.state.read().mirror.len()
    }

    // ============ Acknowledgement ============

    /// Records `acknowledged_by` on every alert and upserts them.
    ///
    /// The resulting `acknowledgedBy` lists the names already stored for the
    /// alert, then those carried by the input, then `acknowledged_by`, each
    /// once. All alerts are written under a single lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidAcknowledger` if the name is blank.
    pub fn acknowledge_and_set(&self, alerts: &[Alert], acknowledged_by: &str) -> Result<()> {
        let name = acknowledged_by.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidAcknowledger);
        }

        let mut state = self.state.write();
        for alert in alerts {
            let mut updated = alert.clone();
            updated.merge_acknowledgers(state.overlay.get(&alert.fingerprint), name);
            info!(
                fingerprint = %updated.fingerprint,
                alertname = %updated.name(),
                acknowledged_by = %updated.acknowledged_by().unwrap_or_default(),
                "acknowledged alert"
            );
            state.overlay.insert(updated.fingerprint, updated);
        }
        Ok(())
    }

    /// Applies locally held annotations to freshly fetched upstream alerts.
    ///
    /// Local annotations override upstream ones. Records with malformed
    /// fingerprints are skipped.
    #[must_use]
    pub fn annotate(&self, upstream_alerts: &[UpstreamAlert]) -> Vec<Alert> {
        let state = self.state.read();
        upstream_alerts
            .iter()
            .filter_map(|record| match record.to_alert() {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!(error = %e, "skipping upstream alert");
                    None
                }
            })
            .map(|mut alert| {
                if let Some(local) = state.overlay.get(&alert.fingerprint) {
                    alert.annotations.extend(
                        local
                            .annotations
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone())),
                    );
                }
                alert
            })
            .collect()
    }

    // ============ Label Lookup ============

    /// Finds the upstream alert whose labels contain `labels`.
    ///
    /// On a miss the mirror is refreshed once and the search retried, unless
    /// the last refresh is younger than the configured minimum re-query
    /// interval. Among several matches the earliest `startsAt` wins, then the
    /// lowest fingerprint.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::EmptyLabelSet` for an empty `labels`,
    /// `StoreError::Upstream` if the forced refresh fails and
    /// `StoreError::NoMatch` if nothing matches.
    pub async fn find_by_label_subset(&self, labels: &LabelSet) -> Result<Alert> {
        if labels.is_empty() {
            return Err(StoreError::EmptyLabelSet);
        }

        if let Some(alert) = self.lookup_mirror(labels) {
            return Ok(alert);
        }

        if self.refreshed_recently() {
            debug!(labels = %format_labels(labels), "label lookup missed, refresh is recent");
            return Err(no_match(labels));
        }

        debug!(labels = %format_labels(labels), "label lookup missed, forcing reconciliation");
        self.reconcile().await?;

        self.lookup_mirror(labels).ok_or_else(|| no_match(labels))
    }

    fn lookup_mirror(&self, labels: &LabelSet) -> Option<Alert> {
        let state = self.state.read();
        state
            .mirror
            .values()
            .filter(|alert| alert.has_labels(labels))
            .min_by(|a, b| {
                a.starts_at
                    .cmp(&b.starts_at)
                    .then_with(|| a.fingerprint.cmp(&b.fingerprint))
            })
            .cloned()
    }

    fn refreshed_recently(&self) -> bool {
        let window = self.config.min_requery_interval;
        if window.is_zero() {
            return false;
        }
        self.state
            .read()
            .last_refresh
            .is_some_and(|at| at.elapsed() < window)
    }

    // ============ Persistence ============

    /// Writes the overlay to the snapshot file and returns its size.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PersistenceDisabled` for a stateless store, or the
    /// persister's error. On failure the in-memory state stays authoritative.
    pub fn snapshot(&self) -> Result<u64> {
        let persister = self
            .persister
            .as_ref()
            .ok_or(StoreError::PersistenceDisabled)?;

        let start = Instant::now();
        let overlay = self.state.read().overlay.clone();

        match persister.store(&overlay) {
            Ok(bytes) => {
                let elapsed = start.elapsed();
                self.metrics.record_snapshot(bytes, elapsed);
                info!(
                    path = %persister.path().display(),
                    alerts = overlay.len(),
                    size = bytes,
                    duration_ms = elapsed.as_secs_f64() * 1000.0,
                    "persisted alert snapshot"
                );
                Ok(bytes)
            }
            Err(e) => {
                self.metrics.record_snapshot_failure();
                warn!(path = %persister.path().display(), error = %e, "snapshot failed");
                Err(e)
            }
        }
    }

    /// Returns the current store metrics.
    #[must_use]
    pub fn metrics(&self) -> StoreMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns the Prometheus registry behind [`AlertStore::metrics`].
    #[must_use]
    pub fn metrics_registry(&self) -> &prometheus::Registry {
        self.metrics.registry()
    }
}

fn no_match(labels: &LabelSet) -> StoreError {
    StoreError::NoMatch {
        labels: format_labels(labels),
    }
}
