//! Reconciliation against the upstream engine.
//!
//! A cycle fetches the upstream alert list, replaces the mirror with it and
//! garbage-collects the overlay:
//!
//! | overlay entry | upstream `endsAt` | action |
//! |---|---|---|
//! | in mirror | past | delete |
//! | in mirror | future | refresh `endsAt` |
//! | not in mirror, own `endsAt` past | - | delete |
//! | not in mirror, own `endsAt` future | - | keep |

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::AlertStore;
use crate::types::{Alert, Fingerprint};
use crate::upstream::{convert_alerts, AlertFilter};

const MIN_RECHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Alerts returned by upstream.
    pub fetched: usize,
    /// Upstream alerts dropped for malformed fingerprints.
    pub dropped: usize,
    /// Overlay entries deleted.
    pub removed: usize,
    /// Overlay entries whose `endsAt` was refreshed from upstream.
    pub refreshed: usize,
    /// Overlay entries absent upstream but kept until their own expiry.
    pub retained: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct GcStats {
    pub(crate) removed: usize,
    pub(crate) refreshed: usize,
    pub(crate) retained: usize,
}

/// Applies the liveness rules to `overlay` given the fresh `mirror`.
pub(crate) fn collect_garbage(
    overlay: &mut HashMap<Fingerprint, Alert>,
    mirror: &HashMap<Fingerprint, Alert>,
    now: DateTime<Utc>,
) -> GcStats {
    let mut stats = GcStats::default();
    overlay.retain(|fingerprint, alert| match mirror.get(fingerprint) {
        Some(upstream) if upstream.is_resolved_at(now) => {
            debug!(fingerprint = %fingerprint, "resolved upstream, removing");
            stats.removed += 1;
            false
        }
        Some(upstream) => {
            alert.ends_at = upstream.ends_at;
            stats.refreshed += 1;
            true
        }
        None if alert.is_resolved_at(now) => {
            debug!(fingerprint = %fingerprint, "gone upstream and expired, removing");
            stats.removed += 1;
            false
        }
        None => {
            stats.retained += 1;
            true
        }
    });
    stats
}

impl AlertStore {
    /// Runs one reconciliation cycle.
    ///
    /// The upstream fetch happens without holding the store lock. If it fails
    /// neither map is touched. Concurrent cycles run one at a time, so a slow
    /// fetch never installs its result over a newer one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Upstream` if the alert list cannot be fetched.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let _cycle = self.cycle_lock.lock().await;
        let records = match self
            .upstream
            .list_alerts(&AlertFilter::reconciliation())
            .await
        {
            Ok(records) => records,
            Err(e) => {
                self.metrics.record_reconcile_failure();
                warn!(error = %e, "reconciliation skipped, upstream fetch failed");
                return Err(e.into());
            }
        };

        let (mirror, dropped) = convert_alerts(&records);
        let now = Utc::now();

        let stats = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            state.mirror = mirror;
            state.last_refresh = Some(Instant::now());
            collect_garbage(&mut state.overlay, &state.mirror, now)
        };

        self.metrics.record_reconcile(stats.removed);
        let report = ReconcileReport {
            fetched: records.len(),
            dropped,
            removed: stats.removed,
            refreshed: stats.refreshed,
            retained: stats.retained,
        };
        debug!(
            fetched = report.fetched,
            dropped = report.dropped,
            removed = report.removed,
            refreshed = report.refreshed,
            retained = report.retained,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Reconciles every `recheck_interval` until `token` is cancelled.
    ///
    /// The first cycle runs immediately. Failed cycles are logged and retried
    /// on the next tick. A cycle in flight when `token` fires is finished
    /// before the loop exits; the upstream client's timeout bounds the wait.
    pub async fn run_reconciler(self, token: CancellationToken) {
        let period = self.config().recheck_interval.max(MIN_RECHECK_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = period.as_millis() as u64, "reconciler started");

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => break,

                _ = ticker.tick() => {
                    // Errors are logged and counted by `reconcile`.
                    let _ = self.reconcile().await;
                }
            }
        }
        info!("reconciler stopped");
    }

    /// Spawns [`AlertStore::run_reconciler`] on the current runtime.
    #[must_use]
    pub fn spawn_reconciler(&self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.clone().run_reconciler(token))
    }
}
