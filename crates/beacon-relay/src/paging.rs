//! Paging engine contract and incident summary parsing.

use async_trait::async_trait;
use beacon_store::Alert;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{RelayError, Result};

/// Client of the incident paging engine.
#[async_trait]
pub trait PagingClient: Send + Sync + std::fmt::Debug {
    /// Acknowledges the incident raised for `alert` on behalf of `user_email`.
    async fn acknowledge_incident(&self, alert: &Alert, user_email: &str) -> Result<()>;
}

/// Alert identity recovered from an incident summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentIdentity {
    /// Region, lowercased.
    pub region: String,
    /// Alert name.
    pub alertname: String,
}

impl IncidentIdentity {
    /// Returns true if `alert` carries this region and alert name.
    #[must_use]
    pub fn matches(&self, alert: &Alert) -> bool {
        alert.name() == self.alertname
            && alert
                .region()
                .is_some_and(|r| r.eq_ignore_ascii_case(&self.region))
    }
}

static SUMMARY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r".*\s\[(?P<region>.+?)\]\s(?P<alertname>.+?)\s-.*")
        .unwrap_or_else(|_| unreachable!())
});

/// Parses `... [<region>] <alertname> - ...` out of an incident summary.
///
/// # Errors
///
/// Returns `RelayError::InvalidSummary` if the summary does not match.
pub fn parse_incident_summary(summary: &str) -> Result<IncidentIdentity> {
    let captures = SUMMARY_REGEX
        .captures(summary)
        .ok_or_else(|| RelayError::InvalidSummary {
            summary: summary.to_string(),
        })?;

    Ok(IncidentIdentity {
        region: captures["region"].to_lowercase(),
        alertname: captures["alertname"].to_string(),
    })
}
