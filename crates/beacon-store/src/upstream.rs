//! Upstream alerting engine contract.
//!
//! The store never talks to the network itself; it is handed an
//! [`UpstreamClient`] at construction. This module also holds the query
//! [`AlertFilter`] and the records the upstream returns.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError, UpstreamError};
use crate::types::{Alert, Fingerprint, LabelSet};

/// How silenced alerts are treated by a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilencedFilter {
    /// Leave silenced alerts out.
    #[default]
    Exclude,
    /// Return silenced and unsilenced alerts.
    Include,
    /// Return only silenced alerts.
    Only,
}

impl SilencedFilter {
    /// Returns true if silenced alerts are part of the result.
    #[must_use]
    pub const fn includes_silenced(self) -> bool {
        matches!(self, Self::Include | Self::Only)
    }
}

/// A single label matcher in the upstream matcher language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Matcher {
    /// Label name.
    pub name: String,
    /// Value or regular expression.
    pub value: String,
    /// Whether `value` is a regular expression.
    #[serde(rename = "isRegex")]
    pub is_regex: bool,
    /// Equality (`true`) or negation (`false`).
    #[serde(rename = "isEqual", default = "default_true")]
    pub is_equal: bool,
}

const fn default_true() -> bool {
    true
}

impl Matcher {
    /// Creates an equality matcher.
    #[must_use]
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_regex: false,
            is_equal: true,
        }
    }

    /// Creates a regular-expression matcher.
    #[must_use]
    pub fn regex(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_regex: true,
            is_equal: true,
        }
    }

    /// Negates the matcher.
    #[must_use]
    pub const fn negated(mut self) -> Self {
        self.is_equal = !self.is_equal;
        self
    }

    /// Returns the operator symbol.
    #[must_use]
    pub const fn operator(&self) -> &'static str {
        match (self.is_regex, self.is_equal) {
            (false, true) => "=",
            (false, false) => "!=",
            (true, true) => "=~",
            (true, false) => "!~",
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let escaped = self.value.replace('\\', "\\\\").replace('"', "\\\"");
        write!(f, "{}{}\"{}\"", self.name, self.operator(), escaped)
    }
}

/// Builds matchers that select exactly the given label set.
#[must_use]
pub fn matchers_from_labels(labels: &LabelSet) -> Vec<Matcher> {
    let mut matchers: Vec<Matcher> = labels
        .iter()
        .map(|(name, value)| Matcher::equal(name, value))
        .collect();
    matchers.sort_by(|a, b| a.name.cmp(&b.name));
    matchers
}

/// Query filter for [`UpstreamClient::list_alerts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFilter {
    /// Treatment of silenced alerts.
    pub silenced: SilencedFilter,
    /// Include inhibited alerts.
    pub inhibited: bool,
    /// Include active alerts.
    pub active: bool,
    /// Include unprocessed alerts.
    pub unprocessed: bool,
    /// Restrict to alerts routed to this receiver.
    pub receiver: Option<String>,
    /// Conjunction of label matchers.
    pub matchers: Vec<Matcher>,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            silenced: SilencedFilter::Exclude,
            inhibited: true,
            active: true,
            unprocessed: false,
            receiver: None,
            matchers: Vec::new(),
        }
    }
}

impl AlertFilter {
    /// Filter used by reconciliation.
    ///
    /// Silenced alerts are kept so that their expiry can be observed.
    #[must_use]
    pub fn reconciliation() -> Self {
        Self {
            silenced: SilencedFilter::Include,
            ..Self::default()
        }
    }

    /// Adds a matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Adds equality matchers for every label in `labels`.
    #[must_use]
    pub fn with_labels(mut self, labels: &LabelSet) -> Self {
        self.matchers.extend(matchers_from_labels(labels));
        self
    }

    /// Sets the receiver.
    #[must_use]
    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    /// Builds a filter from HTTP query parameters.
    ///
    /// `silenced` takes `true`, `false` or `only`; `inhibited`, `active` and
    /// `unprocessed` are false only if one of their values is `false`;
    /// `receiver` values are joined with commas; any other key becomes an
    /// equality matcher.
    #[must_use]
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().to_string());
            match grouped.iter_mut().find(|(k, _)| k == key) {
                Some((_, values)) => values.push(value),
                None => grouped.push((key.to_string(), vec![value])),
            }
        }

        let mut filter = Self::default();
        for (key, values) in grouped {
            match key.as_str() {
                "silenced" => filter.silenced = parse_silenced(&values),
                "inhibited" => filter.inhibited = parse_flag(&values),
                "active" => filter.active = parse_flag(&values),
                "unprocessed" => filter.unprocessed = parse_flag(&values),
                "receiver" => filter.receiver = Some(values.join(",")),
                _ => filter.matchers.push(Matcher::equal(key, values.join(","))),
            }
        }
        filter
    }

    /// Renders the matchers as a comma-separated expression.
    #[must_use]
    pub fn matcher_expression(&self) -> String {
        self.matchers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn parse_flag(values: &[String]) -> bool {
    !values.iter().any(|v| v == "false")
}

fn parse_silenced(values: &[String]) -> SilencedFilter {
    for value in values {
        match value.as_str() {
            "false" => return SilencedFilter::Exclude,
            "true" => return SilencedFilter::Include,
            "only" => return SilencedFilter::Only,
            _ => {}
        }
    }
    SilencedFilter::Exclude
}

/// State of an alert as reported upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamAlertState {
    /// Not yet processed by the upstream pipeline.
    Unprocessed,
    /// Firing and not suppressed.
    #[default]
    Active,
    /// Silenced or inhibited.
    Suppressed,
}

/// An alert record as returned by the upstream engine.
///
/// The fingerprint is kept verbatim; conversion into an [`Alert`] parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamAlert {
    /// Fingerprint as reported upstream.
    pub fingerprint: String,
    /// Identifying labels.
    pub labels: LabelSet,
    /// Annotations.
    #[serde(default)]
    pub annotations: LabelSet,
    /// Start of the alert.
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    /// Upstream expiry.
    #[serde(rename = "endsAt")]
    pub ends_at: DateTime<Utc>,
    /// Link back to the generating rule.
    #[serde(rename = "generatorURL", default)]
    pub generator_url: String,
    /// Processing state.
    #[serde(default)]
    pub state: UpstreamAlertState,
    /// IDs of silences muting this alert.
    #[serde(rename = "silencedBy", default)]
    pub silenced_by: Vec<String>,
    /// Fingerprints of alerts inhibiting this alert.
    #[serde(rename = "inhibitedBy", default)]
    pub inhibited_by: Vec<String>,
}

impl UpstreamAlert {
    /// Returns true if at least one silence mutes the alert.
    #[must_use]
    pub fn is_silenced(&self) -> bool {
        !self.silenced_by.is_empty()
    }

    /// Returns true if another alert inhibits this one.
    #[must_use]
    pub fn is_inhibited(&self) -> bool {
        !self.inhibited_by.is_empty()
    }

    /// Converts into a store alert.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidFingerprint` if the fingerprint is malformed.
    pub fn to_alert(&self) -> Result<Alert> {
        let fingerprint: Fingerprint = self.fingerprint.parse()?;
        Ok(Alert {
            fingerprint,
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            generator_url: self.generator_url.clone(),
        })
    }

    /// Returns true if the record passes `filter`.
    ///
    /// Matchers are compared as equality on the label value; regular
    /// expressions are left to real upstream engines and always pass.
    #[must_use]
    pub fn matches(&self, filter: &AlertFilter) -> bool {
        let silenced_ok = match filter.silenced {
            SilencedFilter::Exclude => !self.is_silenced(),
            SilencedFilter::Include => true,
            SilencedFilter::Only => self.is_silenced(),
        };
        let inhibited_ok = filter.inhibited || !self.is_inhibited();
        let state_ok = match self.state {
            UpstreamAlertState::Unprocessed => filter.unprocessed,
            UpstreamAlertState::Active => filter.active,
            UpstreamAlertState::Suppressed => true,
        };
        let matchers_ok = filter.matchers.iter().all(|m| {
            if m.is_regex {
                return true;
            }
            let equal = self.labels.get(&m.name) == Some(&m.value);
            equal == m.is_equal
        });
        silenced_ok && inhibited_ok && state_ok && matchers_ok
    }
}

impl From<&Alert> for UpstreamAlert {
    fn from(alert: &Alert) -> Self {
        Self {
            fingerprint: alert.fingerprint.to_string(),
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            starts_at: alert.starts_at,
            ends_at: alert.ends_at,
            generator_url: alert.generator_url.clone(),
            state: UpstreamAlertState::Active,
            silenced_by: Vec::new(),
            inhibited_by: Vec::new(),
        }
    }
}

/// Lifecycle state of a silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilenceState {
    /// Starts in the future.
    Pending,
    /// Currently muting.
    Active,
    /// Ended.
    Expired,
}

/// A time-bounded suppression created upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Silence {
    /// Upstream identifier.
    pub id: String,
    /// Matchers selecting the silenced alerts.
    pub matchers: Vec<Matcher>,
    /// Start of the silence.
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    /// End of the silence.
    #[serde(rename = "endsAt")]
    pub ends_at: DateTime<Utc>,
    /// Author.
    #[serde(rename = "createdBy")]
    pub created_by: String,
    /// Free-form comment.
    pub comment: String,
    /// Current state.
    pub state: SilenceState,
}

impl Silence {
    /// Returns true if the silence mutes alerts right now.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SilenceState::Active
    }

    /// Returns true if both silences select the same alerts.
    ///
    /// Matcher order and any `createdBy` matcher are ignored.
    #[must_use]
    pub fn has_same_matchers(&self, matchers: &[Matcher]) -> bool {
        same_matchers(&self.matchers, matchers)
    }
}

/// Compares two matcher lists ignoring order and `createdBy` matchers.
#[must_use]
pub fn same_matchers(a: &[Matcher], b: &[Matcher]) -> bool {
    let normalize = |list: &[Matcher]| {
        let mut list: Vec<Matcher> = list
            .iter()
            .filter(|m| m.name != "createdBy")
            .cloned()
            .collect();
        list.sort_by(|x, y| (&x.name, &x.value).cmp(&(&y.name, &y.value)));
        list
    };
    normalize(a) == normalize(b)
}

/// Client of the upstream alerting engine.
#[async_trait]
pub trait UpstreamClient: Send + Sync + fmt::Debug {
    /// Lists alerts matching `filter`.
    async fn list_alerts(
        &self,
        filter: &AlertFilter,
    ) -> std::result::Result<Vec<UpstreamAlert>, UpstreamError>;

    /// Creates a silence for `alert` and returns its ID.
    async fn create_silence(
        &self,
        alert: &Alert,
        author: &str,
        comment: &str,
        duration: Duration,
    ) -> std::result::Result<String, UpstreamError>;

    /// Lists silences whose matchers match `matchers`.
    async fn list_silences(
        &self,
        matchers: &[Matcher],
    ) -> std::result::Result<Vec<Silence>, UpstreamError>;

    /// Fetches a silence by ID.
    async fn get_silence(&self, id: &str) -> std::result::Result<Silence, UpstreamError>;

    /// Returns a user-facing link to a silence.
    fn link_to_silence(&self, silence_id: &str) -> String {
        silence_id.to_string()
    }
}

/// Validates the arguments of [`UpstreamClient::create_silence`].
///
/// # Errors
///
/// Returns `UpstreamError::InvalidRequest` for an empty author or a zero duration.
pub fn validate_silence_request(
    author: &str,
    duration: Duration,
) -> std::result::Result<(), UpstreamError> {
    if author.trim().is_empty() {
        return Err(UpstreamError::InvalidRequest(
            "author must not be empty".to_string(),
        ));
    }
    if duration.is_zero() {
        return Err(UpstreamError::InvalidRequest(
            "duration must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// An upstream that lives in memory.
///
/// Useful for tests and offline runs. Alerts are replaced with
/// [`InMemoryUpstream::set_alerts`]; availability can be toggled to exercise
/// failure paths.
#[derive(Debug, Default)]
pub struct InMemoryUpstream {
    alerts: RwLock<Vec<UpstreamAlert>>,
    silences: RwLock<HashMap<String, Silence>>,
    unavailable: RwLock<bool>,
    list_calls: Mutex<usize>,
}

impl InMemoryUpstream {
    /// Creates an empty upstream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the alerts the upstream reports.
    pub fn set_alerts(&self, alerts: Vec<UpstreamAlert>) {
        *self.alerts.write() = alerts;
    }

    /// Replaces the alerts with plain active copies of `alerts`.
    pub fn set_store_alerts(&self, alerts: &[Alert]) {
        self.set_alerts(alerts.iter().map(UpstreamAlert::from).collect());
    }

    /// Makes every call fail with `UpstreamError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    /// Returns how often `list_alerts` was called.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock()
    }

    /// Returns all silences created so far.
    #[must_use]
    pub fn silences(&self) -> Vec<Silence> {
        self.silences.read().values().cloned().collect()
    }

    fn check_available(&self) -> std::result::Result<(), UpstreamError> {
        if *self.unavailable.read() {
            return Err(UpstreamError::Unavailable(
                "in-memory upstream switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UpstreamClient for InMemoryUpstream {
    async fn list_alerts(
        &self,
        filter: &AlertFilter,
    ) -> std::result::Result<Vec<UpstreamAlert>, UpstreamError> {
        *self.list_calls.lock() += 1;
        self.check_available()?;
        Ok(self
            .alerts
            .read()
            .iter()
            .filter(|a| a.matches(filter))
            .cloned()
            .collect())
    }

    async fn create_silence(
        &self,
        alert: &Alert,
        author: &str,
        comment: &str,
        duration: Duration,
    ) -> std::result::Result<String, UpstreamError> {
        self.check_available()?;
        validate_silence_request(author, duration)?;

        let matchers = matchers_from_labels(&alert.labels);
        let mut silences = self.silences.write();
        if let Some(existing) = silences
            .values()
            .find(|s| s.is_active() && s.has_same_matchers(&matchers))
        {
            return Ok(existing.id.clone());
        }

        let now = Utc::now();
        let ends_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| UpstreamError::InvalidRequest("duration out of range".to_string()))?;
        let id = format!("{:016x}", rand::random::<u64>());
        silences.insert(
            id.clone(),
            Silence {
                id: id.clone(),
                matchers,
                starts_at: now,
                ends_at,
                created_by: author.to_string(),
                comment: comment.to_string(),
                state: SilenceState::Active,
            },
        );
        Ok(id)
    }

    async fn list_silences(
        &self,
        matchers: &[Matcher],
    ) -> std::result::Result<Vec<Silence>, UpstreamError> {
        self.check_available()?;
        Ok(self
            .silences
            .read()
            .values()
            .filter(|s| matchers.iter().all(|m| s.matchers.contains(m)))
            .cloned()
            .collect())
    }

    async fn get_silence(&self, id: &str) -> std::result::Result<Silence, UpstreamError> {
        self.check_available()?;
        self.silences
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| UpstreamError::SilenceNotFound { id: id.to_string() })
    }
}

/// Converts upstream records, dropping those with malformed fingerprints.
///
/// Returns the converted alerts and the number of dropped records.
pub(crate) fn convert_alerts(records: &[UpstreamAlert]) -> (HashMap<Fingerprint, Alert>, usize) {
    let mut alerts = HashMap::with_capacity(records.len());
    let mut dropped = 0;
    for record in records {
        match record.to_alert() {
            Ok(alert) => {
                alerts.insert(alert.fingerprint, alert);
            }
            Err(StoreError::InvalidFingerprint { value, reason }) => {
                tracing::warn!(fingerprint = %value, reason = %reason, "dropping upstream alert");
                dropped += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping upstream alert");
                dropped += 1;
            }
        }
    }
    (alerts, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use test_case::test_case;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn upstream_alert(pairs: &[(&str, &str)]) -> UpstreamAlert {
        let now = Utc::now();
        let alert = Alert::from_labels(labels(pairs), now, now + ChronoDuration::minutes(5));
        UpstreamAlert::from(&alert)
    }

    mod matcher_tests {
        use super::*;
        use test_case::test_case;

        #[test_case(Matcher::equal("a", "b"), r#"a="b""# ; "equal")]
        #[test_case(Matcher::equal("a", "b").negated(), r#"a!="b""# ; "not equal")]
        #[test_case(Matcher::regex("a", "b.*"), r#"a=~"b.*""# ; "regex")]
        #[test_case(Matcher::regex("a", "b.*").negated(), r#"a!~"b.*""# ; "not regex")]
        #[test_case(Matcher::equal("a", r#"say "hi""#), r#"a="say \"hi\"""# ; "escaped quotes")]
        fn render(matcher: Matcher, expected: &str) {
            assert_eq!(matcher.to_string(), expected);
        }

        #[test]
        fn matchers_from_labels_sorted() {
            let matchers = matchers_from_labels(&labels(&[("region", "r1"), ("alertname", "A")]));
            assert_eq!(matchers[0].name, "alertname");
            assert_eq!(matchers[1].name, "region");
            assert!(matchers.iter().all(|m| m.is_equal && !m.is_regex));
        }

        #[test]
        fn same_matchers_ignores_order_and_author() {
            let a = vec![
                Matcher::equal("alertname", "A"),
                Matcher::equal("region", "r1"),
            ];
            let b = vec![
                Matcher::equal("createdBy", "someone"),
                Matcher::equal("region", "r1"),
                Matcher::equal("alertname", "A"),
            ];
            assert!(same_matchers(&a, &b));
            assert!(!same_matchers(&a, &a[..1]));
        }
    }

    mod filter_tests {
        use super::*;
        use test_case::test_case;

        #[test]
        fn default_filter() {
            let filter = AlertFilter::default();
            assert_eq!(filter.silenced, SilencedFilter::Exclude);
            assert!(filter.inhibited);
            assert!(filter.active);
            assert!(!filter.unprocessed);
            assert!(filter.receiver.is_none());
            assert!(filter.matchers.is_empty());
        }

        #[test]
        fn reconciliation_includes_silenced() {
            let filter = AlertFilter::reconciliation();
            assert!(filter.silenced.includes_silenced());
            assert!(filter.active);
            assert!(!filter.unprocessed);
        }

        #[test]
        fn from_query_pairs() {
            let filter = AlertFilter::from_query_pairs(vec![
                ("silenced", "only"),
                ("inhibited", "false"),
                ("unprocessed", "true"),
                ("receiver", "slack"),
                ("receiver", "pagerduty"),
                ("region", "staging"),
            ]);
            assert_eq!(filter.silenced, SilencedFilter::Only);
            assert!(!filter.inhibited);
            assert!(filter.active);
            assert!(filter.unprocessed);
            assert_eq!(filter.receiver.as_deref(), Some("slack,pagerduty"));
            assert_eq!(filter.matchers, vec![Matcher::equal("region", "staging")]);
        }

        #[test_case(&["true"], SilencedFilter::Include)]
        #[test_case(&["false"], SilencedFilter::Exclude)]
        #[test_case(&["only"], SilencedFilter::Only)]
        #[test_case(&["bogus"], SilencedFilter::Exclude)]
        #[test_case(&["bogus", "only"], SilencedFilter::Only)]
        fn silenced_values(values: &[&str], expected: SilencedFilter) {
            let pairs = values.iter().map(|v| ("silenced", *v));
            assert_eq!(AlertFilter::from_query_pairs(pairs).silenced, expected);
        }

        #[test]
        fn flag_false_wins() {
            let filter = AlertFilter::from_query_pairs(vec![("active", "true"), ("active", "false")]);
            assert!(!filter.active);
        }

        #[test]
        fn matcher_expression() {
            let filter = AlertFilter::default()
                .with_matcher(Matcher::equal("alertname", "A"))
                .with_matcher(Matcher::regex("region", "eu-.*"));
            assert_eq!(filter.matcher_expression(), r#"alertname="A",region=~"eu-.*""#);
        }
    }

    mod upstream_alert_tests {
        use super::*;

        #[test]
        fn to_alert_parses_fingerprint() {
            let record = upstream_alert(&[("alertname", "A")]);
            let alert = record.to_alert().unwrap();
            assert_eq!(alert.fingerprint.to_string(), record.fingerprint);
            assert_eq!(alert.labels, record.labels);
        }

        #[test]
        fn to_alert_rejects_bad_fingerprint() {
            let mut record = upstream_alert(&[("alertname", "A")]);
            record.fingerprint = "nope".to_string();
            assert!(matches!(
                record.to_alert(),
                Err(StoreError::InvalidFingerprint { .. })
            ));
        }

        #[test]
        fn convert_drops_bad_records() {
            let good = upstream_alert(&[("alertname", "A")]);
            let mut bad = upstream_alert(&[("alertname", "B")]);
            bad.fingerprint = "zz".to_string();

            let (alerts, dropped) = convert_alerts(&[good, bad]);
            assert_eq!(alerts.len(), 1);
            assert_eq!(dropped, 1);
        }

        #[test]
        fn matches_silenced_filter() {
            let mut silenced = upstream_alert(&[("alertname", "A")]);
            silenced.silenced_by = vec!["s1".to_string()];
            silenced.state = UpstreamAlertState::Suppressed;
            let plain = upstream_alert(&[("alertname", "B")]);

            let exclude = AlertFilter::default();
            let include = AlertFilter::reconciliation();
            let only = AlertFilter {
                silenced: SilencedFilter::Only,
                ..AlertFilter::default()
            };

            assert!(!silenced.matches(&exclude));
            assert!(plain.matches(&exclude));
            assert!(silenced.matches(&include));
            assert!(plain.matches(&include));
            assert!(silenced.matches(&only));
            assert!(!plain.matches(&only));
        }

        #[test]
        fn matches_label_matchers() {
            let alert = upstream_alert(&[("alertname", "A"), ("region", "r1")]);
            let hit = AlertFilter::default().with_matcher(Matcher::equal("region", "r1"));
            let miss = AlertFilter::default().with_matcher(Matcher::equal("region", "r2"));
            let negated =
                AlertFilter::default().with_matcher(Matcher::equal("region", "r2").negated());
            assert!(alert.matches(&hit));
            assert!(!alert.matches(&miss));
            assert!(alert.matches(&negated));
        }

        #[test]
        fn unprocessed_needs_flag() {
            let mut alert = upstream_alert(&[("alertname", "A")]);
            alert.state = UpstreamAlertState::Unprocessed;
            assert!(!alert.matches(&AlertFilter::default()));
            let filter = AlertFilter {
                unprocessed: true,
                ..AlertFilter::default()
            };
            assert!(alert.matches(&filter));
        }
    }

    mod in_memory_tests {
        use super::*;

        fn store_alert() -> Alert {
            let now = Utc::now();
            Alert::from_labels(
                labels(&[("alertname", "A"), ("region", "r1")]),
                now,
                now + ChronoDuration::minutes(5),
            )
        }

        #[tokio::test]
        async fn list_respects_filter_and_counts_calls() {
            let upstream = InMemoryUpstream::new();
            upstream.set_store_alerts(&[store_alert()]);

            let all = upstream.list_alerts(&AlertFilter::reconciliation()).await.unwrap();
            assert_eq!(all.len(), 1);

            let none = upstream
                .list_alerts(&AlertFilter::default().with_matcher(Matcher::equal("region", "r2")))
                .await
                .unwrap();
            assert!(none.is_empty());
            assert_eq!(upstream.list_calls(), 2);
        }

        #[tokio::test]
        async fn unavailable_fails() {
            let upstream = InMemoryUpstream::new();
            upstream.set_unavailable(true);
            let result = upstream.list_alerts(&AlertFilter::default()).await;
            assert!(matches!(result, Err(UpstreamError::Unavailable(_))));
        }

        #[tokio::test]
        async fn create_silence_is_deduplicated() {
            let upstream = InMemoryUpstream::new();
            let alert = store_alert();

            let first = upstream
                .create_silence(&alert, "Max", "silenced via chat", Duration::from_secs(3600))
                .await
                .unwrap();
            let second = upstream
                .create_silence(&alert, "Peter", "again", Duration::from_secs(60))
                .await
                .unwrap();
            assert_eq!(first, second);
            assert_eq!(upstream.silences().len(), 1);

            let silence = upstream.get_silence(&first).await.unwrap();
            assert_eq!(silence.created_by, "Max");
            assert!(silence.is_active());
        }

        #[tokio::test]
        async fn create_silence_validates() {
            let upstream = InMemoryUpstream::new();
            let alert = store_alert();

            let no_author = upstream
                .create_silence(&alert, " ", "c", Duration::from_secs(60))
                .await;
            assert!(matches!(no_author, Err(UpstreamError::InvalidRequest(_))));

            let no_duration = upstream.create_silence(&alert, "Max", "c", Duration::ZERO).await;
            assert!(matches!(no_duration, Err(UpstreamError::InvalidRequest(_))));
        }

        #[tokio::test]
        async fn list_and_get_silences() {
            let upstream = InMemoryUpstream::new();
            let id = upstream
                .create_silence(&store_alert(), "Max", "c", Duration::from_secs(60))
                .await
                .unwrap();

            let found = upstream
                .list_silences(&[Matcher::equal("alertname", "A")])
                .await
                .unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].id, id);

            let missing = upstream.get_silence("unknown").await;
            assert!(matches!(missing, Err(UpstreamError::SilenceNotFound { .. })));
        }
    }
}
