//! Chat action relay for Beacon.
//!
//! `beacon-relay` takes the buttons people press on alert messages in chat
//! and carries them out: acknowledgements are recorded in the
//! [`beacon_store::AlertStore`] and forwarded to the paging engine, silences
//! are created upstream. Chat and paging platforms plug in through the
//! [`ChatClient`] and [`PagingClient`] traits.
//!
//! This crate is a library with no network surface of its own. The process
//! that receives chat callbacks owns the HTTP side and passes each decoded
//! [`ActionEvent`] to [`Relay::handle`]; `beacond` builds a relay over its
//! store with `Daemon::relay`.
//!
//! # Actions
//!
//! | action | effect |
//! |--------|--------|
//! | `acknowledge` | acknowledge locally and at the pager |
//! | `silenceUntilMonday` | silence until the next Monday |
//! | `silence1Day` | silence for one day |
//! | `silence1Month` | silence for 31 days |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod chat;
pub mod duration;
pub mod error;
pub mod paging;
pub mod relay;
pub mod summary;

pub use chat::{
    Action, ActionEvent, ChatClient, ChatUser, ACKNOWLEDGE_REACTION, SILENCE_COMMENT,
    SILENCE_REACTION,
};
pub use duration::{days_to_duration, days_until_next_monday, humanize_duration};
pub use error::{RelayError, Result};
pub use paging::{parse_incident_summary, IncidentIdentity, PagingClient};
pub use relay::{silence_duration, ActionOutcome, Relay, RelayMetrics, RelayMetricsSnapshot};
pub use summary::{alert_details, alert_summary, group_by_severity, is_quiet, AlertsBySeverity};
