//! Error types for the Alertmanager client.

use beacon_store::UpstreamError;
use thiserror::Error;

/// Errors raised while setting up an [`crate::AlertmanagerClient`].
///
/// Request-time failures are reported as [`UpstreamError`] so the client can
/// stand in for any upstream.
#[derive(Debug, Error)]
pub enum AlertmanagerError {
    /// The base URL cannot be used.
    #[error("invalid alertmanager url '{url}': {reason}")]
    InvalidUrl {
        /// The configured URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Result type for client construction.
pub type Result<T> = std::result::Result<T, AlertmanagerError>;

const MAX_BODY_IN_ERROR: usize = 512;

/// Maps a transport error onto the upstream error kinds.
pub(crate) fn transport_error(err: &reqwest::Error) -> UpstreamError {
    if err.is_decode() {
        UpstreamError::Decode(err.to_string())
    } else {
        UpstreamError::Unavailable(err.to_string())
    }
}

/// Builds a status error, truncating long bodies.
pub(crate) fn status_error(status: u16, mut body: String) -> UpstreamError {
    if body.len() > MAX_BODY_IN_ERROR {
        let mut cut = MAX_BODY_IN_ERROR;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    UpstreamError::Status { status, body }
}
