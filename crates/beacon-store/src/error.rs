//! Error types for the beacon-store crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by an upstream alerting engine client.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The upstream engine could not be reached.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// The upstream engine answered with a non-success status.
    #[error("upstream returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The upstream response could not be decoded.
    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    /// The request was rejected before it was sent.
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    /// Silence with the given ID does not exist upstream.
    #[error("silence not found: {id}")]
    SilenceNotFound {
        /// The silence ID that was not found.
        id: String,
    },
}

/// Errors that can occur in the alert overlay store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No alert with the given fingerprint is held by the store.
    #[error("alert not found: {fingerprint}")]
    NotFound {
        /// The fingerprint that was looked up.
        fingerprint: String,
    },

    /// No alert matches the given label set.
    #[error("no alert matches labels {labels}")]
    NoMatch {
        /// Rendered label set that was searched for.
        labels: String,
    },

    /// A label lookup was attempted with no labels.
    #[error("label set must not be empty")]
    EmptyLabelSet,

    /// A fingerprint string could not be decoded.
    #[error("invalid fingerprint '{value}': {reason}")]
    InvalidFingerprint {
        /// The offending input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The acknowledger name was empty.
    #[error("acknowledger name must not be empty")]
    InvalidAcknowledger,

    /// The upstream alerting engine failed.
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Reading or writing the snapshot file failed.
    #[error("persistence failure on {}: {source}", path.display())]
    Persistence {
        /// Path of the file involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file is not in the expected format.
    #[error("corrupt snapshot: {reason}")]
    CorruptSnapshot {
        /// Description of the corruption.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store runs without a persistence gateway.
    #[error("persistence is disabled for this store")]
    PersistenceDisabled,
}

impl StoreError {
    /// Returns true for the "nothing there" family of errors.
    ///
    /// Callers use this to fall back (e.g. treat the alert as already
    /// resolved) instead of failing the request.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoMatch { .. })
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_not_found() {
        let err = StoreError::NotFound {
            fingerprint: "05281b4f8947b35c".to_string(),
        };
        assert_eq!(err.to_string(), "alert not found: 05281b4f8947b35c");
    }

    #[test]
    fn error_display_invalid_fingerprint() {
        let err = StoreError::InvalidFingerprint {
            value: "xyz".to_string(),
            reason: "not hexadecimal".to_string(),
        };
        assert_eq!(err.to_string(), "invalid fingerprint 'xyz': not hexadecimal");
    }

    #[test]
    fn error_display_upstream_status() {
        let err: StoreError = UpstreamError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "upstream error: upstream returned status 503: unavailable"
        );
    }

    #[test]
    fn error_display_persistence() {
        let err = StoreError::persistence(
            "/var/lib/beacon/alerts.snap",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(
            err.to_string(),
            "persistence failure on /var/lib/beacon/alerts.snap: denied"
        );
    }

    #[test]
    fn not_found_kinds() {
        assert!(StoreError::NotFound {
            fingerprint: "1".to_string()
        }
        .is_not_found());
        assert!(StoreError::NoMatch {
            labels: "{}".to_string()
        }
        .is_not_found());
        assert!(!StoreError::EmptyLabelSet.is_not_found());
        assert!(!StoreError::InvalidFingerprint {
            value: String::new(),
            reason: String::new(),
        }
        .is_not_found());
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<String>("invalid json");
        assert!(json_err.is_err());
        let store_err: StoreError = json_err.unwrap_err().into();
        assert!(matches!(store_err, StoreError::Serialization(_)));
    }
}
