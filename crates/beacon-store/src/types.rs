//! Core types for the alert overlay store.
//!
//! This module provides the fundamental types used throughout the crate:
//! - [`Fingerprint`]: The stable identifier of one alert instance
//! - [`AlertSeverity`]: The conventional severity label values
//! - [`Alert`]: An upstream alert snapshot plus locally applied annotations

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Label or annotation name/value mapping. Ordering is irrelevant.
pub type LabelSet = HashMap<String, String>;

/// Label holding the alert name.
pub const ALERTNAME_LABEL: &str = "alertname";
/// Label holding the region an alert fired in.
pub const REGION_LABEL: &str = "region";
/// Label holding the alert severity.
pub const SEVERITY_LABEL: &str = "severity";
/// Annotation holding the comma-separated list of acknowledgers.
pub const ACKNOWLEDGED_BY_ANNOTATION: &str = "acknowledgedBy";

const ACKNOWLEDGER_SEPARATOR: &str = ", ";

// FNV-1a, as used by the upstream engine for label set signatures.
const FNV_OFFSET_64: u64 = 14_695_981_039_346_656_037;
const FNV_PRIME_64: u64 = 1_099_511_628_211;
const LABEL_SEPARATOR: u8 = 0xff;

/// Stable identifier of one alert instance, assigned upstream from its labels.
///
/// The textual form is hexadecimal and always rendered as 16 digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Creates a fingerprint from its raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Computes the label set signature the upstream engine uses as fingerprint.
    #[must_use]
    pub fn from_labels(labels: &LabelSet) -> Self {
        let mut names: Vec<&String> = labels.keys().collect();
        names.sort();

        let mut hash = FNV_OFFSET_64;
        for name in names {
            hash = fnv_add(hash, name.as_bytes());
            hash = fnv_add(hash, &[LABEL_SEPARATOR]);
            hash = fnv_add(hash, labels[name].as_bytes());
            hash = fnv_add(hash, &[LABEL_SEPARATOR]);
        }
        Self(hash)
    }
}

fn fnv_add(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME_64);
    }
    hash
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| StoreError::InvalidFingerprint {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("empty string"));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid("not hexadecimal"));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| invalid(&e.to_string()))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_string()
    }
}

/// Conventional values of the `severity` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational alert, no action required.
    Info,
    /// Warning alert, should be investigated.
    Warning,
    /// Critical alert, requires immediate attention.
    Critical,
}

impl AlertSeverity {
    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    /// Returns the priority of this severity (higher = more urgent).
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Info => 1,
            Self::Warning => 2,
            Self::Critical => 3,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// One alert instance as reported upstream, extended with local annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identifier; unique key within the store.
    pub fingerprint: Fingerprint,
    /// Identifying labels.
    pub labels: LabelSet,
    /// Descriptive annotations, including `acknowledgedBy`.
    #[serde(default)]
    pub annotations: LabelSet,
    /// When the alert started firing.
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    /// Upstream-declared expiry; the sole liveness signal.
    #[serde(rename = "endsAt")]
    pub ends_at: DateTime<Utc>,
    /// Link back to the rule that generated the alert.
    #[serde(rename = "generatorURL", default)]
    pub generator_url: String,
}

impl Alert {
    /// Creates an alert with an upstream-assigned fingerprint.
    #[must_use]
    pub fn new(
        fingerprint: Fingerprint,
        labels: LabelSet,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint,
            labels,
            annotations: LabelSet::new(),
            starts_at,
            ends_at,
            generator_url: String::new(),
        }
    }

    /// Creates an alert whose fingerprint is derived from its labels.
    #[must_use]
    pub fn from_labels(labels: LabelSet, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        let fingerprint = Fingerprint::from_labels(&labels);
        Self::new(fingerprint, labels, starts_at, ends_at)
    }

    /// Adds an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Sets the generator URL.
    #[must_use]
    pub fn with_generator_url(mut self, url: impl Into<String>) -> Self {
        self.generator_url = url.into();
        self
    }

    /// Returns the value of a label, if present.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Returns the `alertname` label or an empty string.
    #[must_use]
    pub fn name(&self) -> &str {
        self.label(ALERTNAME_LABEL).unwrap_or_default()
    }

    /// Returns the `region` label, if present.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.label(REGION_LABEL)
    }

    /// Returns the parsed `severity` label, if present and known.
    #[must_use]
    pub fn severity(&self) -> Option<AlertSeverity> {
        self.label(SEVERITY_LABEL).and_then(|s| s.parse().ok())
    }

    /// Returns true if the alert expired before `now`.
    #[must_use]
    pub fn is_resolved_at(&self, now: DateTime<Utc>) -> bool {
        self.ends_at < now
    }

    /// Returns true if the alert has expired.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.is_resolved_at(Utc::now())
    }

    /// Returns true if every label in `subset` is present with the same value.
    #[must_use]
    pub fn has_labels(&self, subset: &LabelSet) -> bool {
        subset
            .iter()
            .all(|(name, value)| self.labels.get(name) == Some(value))
    }

    /// Returns true if both alerts describe the same logical alert.
    ///
    /// That is the case when they share a fingerprint or when one label set
    /// is contained in the other.
    #[must_use]
    pub fn is_same_logical(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            || self.has_labels(&other.labels)
            || other.has_labels(&self.labels)
    }

    /// Returns the raw `acknowledgedBy` annotation.
    #[must_use]
    pub fn acknowledged_by(&self) -> Option<&str> {
        self.annotations
            .get(ACKNOWLEDGED_BY_ANNOTATION)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Returns true if at least one person acknowledged the alert.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_by().is_some()
    }

    /// Returns the acknowledgers in the order they acknowledged.
    #[must_use]
    pub fn acknowledgers(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if let Some(value) = self.acknowledged_by() {
            push_acknowledgers(&mut names, value);
        }
        names
    }

    /// Returns a copy acknowledged by `name`.
    ///
    /// The name is appended after existing acknowledgers unless already
    /// listed, so repeated acknowledgement is a no-op.
    #[must_use]
    pub fn acknowledge(&self, name: &str) -> Self {
        let mut clone = self.clone();
        clone.merge_acknowledgers(None, name);
        clone
    }

    /// Rewrites `acknowledgedBy` as `previous` followed by the current
    /// acknowledgers and finally `name`, without duplicates.
    pub(crate) fn merge_acknowledgers(&mut self, previous: Option<&Self>, name: &str) {
        let mut names: Vec<&str> = Vec::new();
        if let Some(value) = previous.and_then(Self::acknowledged_by) {
            push_acknowledgers(&mut names, value);
        }
        if let Some(value) = self.acknowledged_by() {
            push_acknowledgers(&mut names, value);
        }
        push_acknowledgers(&mut names, name);

        let merged = names.join(ACKNOWLEDGER_SEPARATOR);
        self.annotations
            .insert(ACKNOWLEDGED_BY_ANNOTATION.to_string(), merged);
    }
}

fn push_acknowledgers<'a>(names: &mut Vec<&'a str>, value: &'a str) {
    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
}

/// Renders a label set as `{a="1", b="2"}` with sorted names.
#[must_use]
pub fn format_labels(labels: &LabelSet) -> String {
    let mut pairs: Vec<_> = labels.iter().collect();
    pairs.sort();
    let body = pairs
        .into_iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}
