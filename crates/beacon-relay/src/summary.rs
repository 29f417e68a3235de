//! Plain-text alert summaries posted to chat.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use beacon_store::{Alert, AlertSeverity};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::duration::humanize_duration;

/// Alerts grouped by severity, most severe first when iterated in reverse.
pub type AlertsBySeverity<'a> = BTreeMap<AlertSeverity, Vec<&'a Alert>>;

/// Groups alerts by their `severity` label.
///
/// Alerts without a known severity are left out.
#[must_use]
pub fn group_by_severity(alerts: &[Alert]) -> AlertsBySeverity<'_> {
    let mut grouped = AlertsBySeverity::new();
    for alert in alerts {
        match alert.severity() {
            Some(severity) => grouped.entry(severity).or_default().push(alert),
            None => debug!(fingerprint = %alert.fingerprint, "alert has no known severity"),
        }
    }
    grouped
}

/// Counts alerts acknowledged by at least one person.
#[must_use]
pub fn count_acknowledged(alerts: &[&Alert]) -> usize {
    alerts.iter().filter(|a| a.is_acknowledged()).count()
}

/// Returns true if nothing is critical or warning.
#[must_use]
pub fn is_quiet(grouped: &AlertsBySeverity<'_>) -> bool {
    !grouped.contains_key(&AlertSeverity::Critical) && !grouped.contains_key(&AlertSeverity::Warning)
}

/// Renders the per-severity counts of a region.
///
/// ```text
/// Region eu-de-1 shows:
/// • 2 critical alerts. Acknowledged: 1.
/// ```
#[must_use]
pub fn alert_summary(grouped: &AlertsBySeverity<'_>) -> String {
    let region = grouped
        .values()
        .flatten()
        .find_map(|a| a.region())
        .unwrap_or_default();

    let mut out = format!("Region {region} shows:\n");
    for (severity, alerts) in grouped.iter().rev() {
        if alerts.is_empty() {
            continue;
        }
        let _ = writeln!(
            out,
            "• {} {severity} alerts. Acknowledged: {}.",
            alerts.len(),
            count_acknowledged(alerts)
        );
    }
    out
}

/// Renders a fixed-width table of the alerts.
#[must_use]
pub fn alert_details(grouped: &AlertsBySeverity<'_>, now: DateTime<Utc>) -> String {
    let mut out = String::from("\n");
    let _ = writeln!(
        out,
        "| {:<30}| {:<20}| {:<15}| {:<10}| {:<30}|",
        "Alertname", "Service", "Firing since", "Severity", "Acknowledged"
    );
    for (severity, alerts) in grouped.iter().rev() {
        for alert in alerts {
            let firing_for = (now - alert.starts_at).to_std().unwrap_or(Duration::ZERO);
            let _ = writeln!(
                out,
                "| {:<30}| {:<20}| {:<15}| {:<10}| {:<30}|",
                alert.name(),
                alert.label("service").unwrap_or_default(),
                humanize_duration(firing_for),
                severity.as_str(),
                alert.acknowledged_by().unwrap_or_default(),
            );
        }
    }
    out
}
