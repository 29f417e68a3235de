//! Error types for the relay.

use beacon_store::{StoreError, UpstreamError};
use thiserror::Error;

/// Errors raised while relaying an action.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The user is not allowed to act on alerts.
    #[error("user '{user_id}' is not authorized")]
    Unauthorized {
        /// Chat user ID.
        user_id: String,
    },

    /// The chat platform failed.
    #[error("chat error: {0}")]
    Chat(String),

    /// The paging engine failed.
    #[error("paging error: {0}")]
    Paging(String),

    /// The overlay store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The upstream alerting engine failed.
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// A paging incident summary does not name an alert.
    #[error("incident summary does not contain region and alertname: '{summary}'")]
    InvalidSummary {
        /// The offending summary.
        summary: String,
    },

    /// An action name is unknown.
    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unauthorized() {
        let err = RelayError::Unauthorized {
            user_id: "U123".to_string(),
        };
        assert_eq!(err.to_string(), "user 'U123' is not authorized");
    }

    #[test]
    fn from_store_error() {
        let err: RelayError = StoreError::EmptyLabelSet.into();
        assert!(matches!(err, RelayError::Store(StoreError::EmptyLabelSet)));
    }

    #[test]
    fn from_upstream_error() {
        let err: RelayError = UpstreamError::Unavailable("down".to_string()).into();
        assert_eq!(err.to_string(), "upstream error: upstream unavailable: down");
    }
}
