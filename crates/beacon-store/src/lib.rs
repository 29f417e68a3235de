//! Local alert overlay store for Beacon.
//!
//! `beacon-store` keeps a process-local, annotated view of the alerts whose
//! canonical state lives in an upstream alerting engine. Acknowledgements are
//! recorded locally, survive restarts through snapshots, and are dropped once
//! the upstream engine reports the alert as resolved.
//!
//! # Features
//!
//! - **Overlay store**: get, set, list, delete and acknowledge alerts by fingerprint
//! - **Label lookup**: find the upstream alert matching a label subset
//! - **Reconciliation**: periodic refresh and garbage collection, cancellable
//! - **Snapshots**: atomic file persistence with a length-prefixed codec
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use beacon_store::{Alert, AlertStore, InMemoryUpstream, LabelSet, StoreConfig};
//! use chrono::{Duration, Utc};
//!
//! let store = AlertStore::new(StoreConfig::default(), Arc::new(InMemoryUpstream::new()), None);
//!
//! let mut labels = LabelSet::new();
//! labels.insert("alertname".to_string(), "HighCPU".to_string());
//! let now = Utc::now();
//! let alert = Alert::from_labels(labels, now, now + Duration::hours(1));
//!
//! store.acknowledge_and_set(&[alert.clone()], "Max").unwrap();
//! assert_eq!(store.get(alert.fingerprint).unwrap().acknowledged_by(), Some("Max"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod codec;
pub mod error;
pub mod metrics;
pub mod persist;
pub mod reconcile;
pub mod store;
pub mod types;
pub mod upstream;

pub use error::{Result, StoreError, UpstreamError};
pub use metrics::{StoreMetrics, StoreMetricsSnapshot};
pub use persist::FilePersister;
pub use reconcile::ReconcileReport;
pub use store::{AlertStore, StoreConfig};
pub use types::{
    format_labels, Alert, AlertSeverity, Fingerprint, LabelSet, ACKNOWLEDGED_BY_ANNOTATION,
    ALERTNAME_LABEL, REGION_LABEL, SEVERITY_LABEL,
};
pub use upstream::{
    matchers_from_labels, same_matchers, validate_silence_request, AlertFilter, InMemoryUpstream,
    Matcher, SilenceState, SilencedFilter, Silence, UpstreamAlert, UpstreamAlertState,
    UpstreamClient,
};
