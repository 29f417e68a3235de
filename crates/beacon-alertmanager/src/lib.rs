//! Prometheus Alertmanager client for Beacon.
//!
//! [`AlertmanagerClient`] implements [`beacon_store::UpstreamClient`] on top of
//! the Alertmanager v2 HTTP API:
//!
//! - `GET /api/v2/alerts` with the flags and matchers of an [`beacon_store::AlertFilter`]
//! - `POST /api/v2/silences`, reusing an existing silence with the same matchers
//! - `GET /api/v2/silences` and `GET /api/v2/silence/{id}`

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod error;
mod wire;

pub use client::{AlertmanagerClient, AlertmanagerConfig};
pub use error::{AlertmanagerError, Result};
