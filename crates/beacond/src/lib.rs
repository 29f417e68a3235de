//! Beacon daemon library.
//!
//! Configuration loading and the daemon lifecycle behind the `beacond`
//! binary: an [`beacon_store::AlertStore`] reconciled against Alertmanager in
//! the background, snapshotted periodically and once more on shutdown.
//!
//! Chat integrations attach through [`Daemon::relay`], which hands a
//! [`beacon_relay::Relay`] the daemon's store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod daemon;
pub mod error;

pub use config::{BeaconConfig, ConfigOverrides, DEFAULT_CONFIG_PATH, DEFAULT_PERSISTENCE_PATH};
pub use daemon::{inspect_snapshot, shutdown_signal, Daemon};
pub use error::{DaemonError, Result};
