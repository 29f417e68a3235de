//! The action relay.
//!
//! A [`Relay`] turns an [`ActionEvent`] from chat into calls against the
//! overlay store, the upstream alerting engine and the paging engine, then
//! reports back to chat.
//!
//! | action | store | upstream | pager | chat |
//! |--------|-------|----------|-------|------|
//! | acknowledge | label lookup, `acknowledge_and_set` | - | acknowledge incident | reply, reaction |
//! | silence* | - | create (or reuse) silence | - | reply with link, reaction |
//!
//! Pager and chat failures after the alert state has changed are logged and
//! counted but do not fail the action.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use beacon_store::{
    Alert, AlertFilter, AlertStore, Fingerprint, Matcher, StoreError, ALERTNAME_LABEL,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chat::{
    Action, ActionEvent, ChatClient, ChatUser, ACKNOWLEDGE_REACTION, SILENCE_COMMENT,
    SILENCE_REACTION,
};
use crate::duration::{days_to_duration, days_until_next_monday, humanize_duration};
use crate::error::{RelayError, Result};
use crate::paging::{parse_incident_summary, PagingClient};
use crate::summary::{alert_details, alert_summary, group_by_severity, is_quiet};

/// What a single action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The alert was acknowledged.
    Acknowledged {
        /// Fingerprint of the acknowledged alert.
        fingerprint: Fingerprint,
        /// The full list of acknowledgers after this action.
        acknowledged_by: String,
    },
    /// A silence was created or reused.
    Silenced {
        /// Upstream silence ID.
        silence_id: String,
        /// Requested silence length.
        duration: Duration,
    },
}

/// Returns how long `action` silences for, or `None` for non-silence actions.
#[must_use]
pub fn silence_duration(action: Action, now: DateTime<Utc>) -> Option<Duration> {
    match action {
        Action::Acknowledge => None,
        Action::SilenceUntilMonday => Some(days_to_duration(days_until_next_monday(now))),
        Action::Silence1Day => Some(days_to_duration(1)),
        Action::Silence1Month => Some(days_to_duration(31)),
    }
}

const COMPONENT: &str = "relay";
const SUCCESS: &str = "success";
const FAILURE: &str = "failure";

/// Relay operation counters, kept in a Prometheus registry.
///
/// Outcomes are counted in `beacon_operations_total` with
/// `component="relay"`.
pub struct RelayMetrics {
    registry: Registry,
    operations_total: IntCounterVec,
}

/// Point-in-time copy of [`RelayMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMetricsSnapshot {
    /// Successful acknowledgements.
    pub acknowledge_succeeded: u64,
    /// Failed acknowledgements.
    pub acknowledge_failed: u64,
    /// Successful silences.
    pub silence_succeeded: u64,
    /// Failed silences.
    pub silence_failed: u64,
    /// Pager calls that failed after a local acknowledgement.
    pub paging_failed: u64,
    /// Chat replies or reactions that could not be delivered.
    pub chat_failed: u64,
    /// Events rejected because the user is not authorized.
    pub unauthorized: u64,
}

impl RelayMetrics {
    /// Creates the counters and registers them in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the counters cannot be created or registered.
    pub fn new() -> std::result::Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let operations_total = IntCounterVec::new(
            Opts::new("beacon_operations_total", "Operations by outcome"),
            &["component", "action", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;
        Ok(Self {
            registry,
            operations_total,
        })
    }

    fn counter(&self, action: &str, outcome: &str) -> IntCounter {
        self.operations_total
            .with_label_values(&[COMPONENT, action, outcome])
    }

    fn record(&self, action: Action, ok: bool) {
        let name = if action.is_silence() { "silence" } else { "acknowledge" };
        self.counter(name, if ok { SUCCESS } else { FAILURE }).inc();
    }

    fn record_paging_failure(&self) {
        self.counter("page", FAILURE).inc();
    }

    fn record_chat_failure(&self) {
        self.counter("chat", FAILURE).inc();
    }

    fn record_unauthorized(&self) {
        self.counter("authorize", FAILURE).inc();
    }

    /// Returns the registry holding the counters.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the counters in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn export_text(&self) -> std::result::Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Returns the current values.
    #[must_use]
    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            acknowledge_succeeded: self.counter("acknowledge", SUCCESS).get(),
            acknowledge_failed: self.counter("acknowledge", FAILURE).get(),
            silence_succeeded: self.counter("silence", SUCCESS).get(),
            silence_failed: self.counter("silence", FAILURE).get(),
            paging_failed: self.counter("page", FAILURE).get(),
            chat_failed: self.counter("chat", FAILURE).get(),
            unauthorized: self.counter("authorize", FAILURE).get(),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| unreachable!())
    }
}

impl fmt::Debug for RelayMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayMetrics")
            .field("values", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Relays chat actions to the store, upstream and the pager.
///
/// Cloning is cheap and yields a handle sharing the same authorized users
/// and metrics.
#[derive(Debug)]
pub struct Relay {
    store: AlertStore,
    chat: Arc<dyn ChatClient>,
    paging: Arc<dyn PagingClient>,
    authorized: Arc<RwLock<HashSet<String>>>,
    metrics: Arc<RelayMetrics>,
}

impl Clone for Relay {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            chat: Arc::clone(&self.chat),
            paging: Arc::clone(&self.paging),
            authorized: Arc::clone(&self.authorized),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl Relay {
    /// Creates a relay. No user is authorized until
    /// [`Relay::refresh_authorized_users`] has run.
    #[must_use]
    pub fn new(
        store: AlertStore,
        chat: Arc<dyn ChatClient>,
        paging: Arc<dyn PagingClient>,
    ) -> Self {
        Self {
            store,
            chat,
            paging,
            authorized: Arc::new(RwLock::new(HashSet::new())),
            metrics: Arc::new(RelayMetrics::default()),
        }
    }

    /// Returns the overlay store.
    #[must_use]
    pub const fn store(&self) -> &AlertStore {
        &self.store
    }

    /// Returns the current counters.
    #[must_use]
    pub fn metrics(&self) -> RelayMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns the Prometheus registry behind [`Relay::metrics`].
    #[must_use]
    pub fn metrics_registry(&self) -> &Registry {
        self.metrics.registry()
    }

    // ============ Authorization ============

    /// Replaces the authorized users with the chat platform's list.
    ///
    /// # Errors
    ///
    /// Returns the chat client's error; the previous list stays in place.
    pub async fn refresh_authorized_users(&self) -> Result<usize> {
        let users: HashSet<String> = self.chat.list_authorized_users().await?.into_iter().collect();
        let count = users.len();
        *self.authorized.write() = users;
        info!(count, "refreshed authorized users");
        Ok(count)
    }

    /// Returns true if `user_id` may act on alerts.
    #[must_use]
    pub fn is_authorized(&self, user_id: &str) -> bool {
        self.authorized.read().contains(user_id)
    }

    // ============ Actions ============

    /// Handles every action of `event` in order.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Unauthorized` for unknown users, and otherwise the
    /// first failing action's error. Actions before it have taken effect.
    pub async fn handle(&self, event: &ActionEvent) -> Result<Vec<ActionOutcome>> {
        self.handle_at(event, Utc::now()).await
    }

    /// Like [`Relay::handle`], with `now` driving silence lengths.
    ///
    /// # Errors
    ///
    /// See [`Relay::handle`].
    pub async fn handle_at(
        &self,
        event: &ActionEvent,
        now: DateTime<Utc>,
    ) -> Result<Vec<ActionOutcome>> {
        if !self.is_authorized(&event.user_id) {
            self.metrics.record_unauthorized();
            warn!(user_id = %event.user_id, "rejecting action from unauthorized user");
            return Err(RelayError::Unauthorized {
                user_id: event.user_id.clone(),
            });
        }

        let user = self.chat.resolve_user(&event.user_id).await?;
        let mut outcomes = Vec::with_capacity(event.actions.len());
        for &action in &event.actions {
            let result = match silence_duration(action, now) {
                None => self.acknowledge(event, &user).await,
                Some(duration) => self.silence(event, &user, duration).await,
            };
            self.metrics.record(action, result.is_ok());
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(action = %action, user = %user.name, error = %e, "action failed");
                    return Err(e);
                }
            }
        }
        Ok(outcomes)
    }

    async fn acknowledge(&self, event: &ActionEvent, user: &ChatUser) -> Result<ActionOutcome> {
        let alert = self.store.find_by_label_subset(&event.labels).await?;
        self.store
            .acknowledge_and_set(std::slice::from_ref(&alert), &user.name)?;
        let acknowledged_by = self
            .store
            .get(alert.fingerprint)?
            .acknowledged_by()
            .unwrap_or_default()
            .to_string();

        if let Err(e) = self.paging.acknowledge_incident(&alert, &user.email).await {
            self.metrics.record_paging_failure();
            warn!(fingerprint = %alert.fingerprint, error = %e, "cannot acknowledge incident");
        }

        info!(
            fingerprint = %alert.fingerprint,
            alertname = %alert.name(),
            user = %user.name,
            "alert acknowledged"
        );
        self.notify(
            event,
            &format!("Acknowledged by <@{}>", user.id),
            ACKNOWLEDGE_REACTION,
        )
        .await;

        Ok(ActionOutcome::Acknowledged {
            fingerprint: alert.fingerprint,
            acknowledged_by,
        })
    }

    async fn silence(
        &self,
        event: &ActionEvent,
        user: &ChatUser,
        duration: Duration,
    ) -> Result<ActionOutcome> {
        // An empty matcher list would silence everything.
        if event.labels.is_empty() {
            return Err(StoreError::EmptyLabelSet.into());
        }

        let now = Utc::now();
        let alert = Alert::from_labels(event.labels.clone(), now, now);
        let upstream = self.store.upstream();
        let silence_id = upstream
            .create_silence(&alert, &user.name, SILENCE_COMMENT, duration)
            .await?;

        info!(
            silence_id = %silence_id,
            alertname = %alert.name(),
            user = %user.name,
            duration_secs = duration.as_secs(),
            "alert silenced"
        );
        let text = format!(
            "<@{}> silenced alert {} for {}. <{}|See Silence>",
            user.id,
            alert.name(),
            humanize_duration(duration),
            upstream.link_to_silence(&silence_id),
        );
        self.notify(event, &text, SILENCE_REACTION).await;

        Ok(ActionOutcome::Silenced {
            silence_id,
            duration,
        })
    }

    async fn notify(&self, event: &ActionEvent, text: &str, emoji: &str) {
        if let Err(e) = self
            .chat
            .post_message(&event.channel, text, &event.message_ref)
            .await
        {
            self.metrics.record_chat_failure();
            warn!(channel = %event.channel, error = %e, "cannot post reply");
        }
        if let Err(e) = self
            .chat
            .add_reaction(&event.channel, &event.message_ref, emoji)
            .await
        {
            self.metrics.record_chat_failure();
            warn!(channel = %event.channel, emoji, error = %e, "cannot add reaction");
        }
    }

    // ============ Queries ============

    /// Returns the annotated alerts behind a paging incident.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidSummary` for an unparsable summary and
    /// `RelayError::Upstream` if the alerts cannot be listed.
    pub async fn incident_alerts(&self, summary: &str) -> Result<Vec<Alert>> {
        let identity = parse_incident_summary(summary)?;
        let filter = AlertFilter::default()
            .with_matcher(Matcher::equal(ALERTNAME_LABEL, identity.alertname.clone()));
        let records = self.store.upstream().list_alerts(&filter).await?;
        let alerts: Vec<Alert> = self
            .store
            .annotate(&records)
            .into_iter()
            .filter(|alert| identity.matches(alert))
            .collect();
        debug!(
            region = %identity.region,
            alertname = %identity.alertname,
            count = alerts.len(),
            "resolved incident alerts"
        );
        Ok(alerts)
    }

    /// Renders the severity summary of the alerts matching `filter`, followed
    /// by the detail table unless only informational alerts fire.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Upstream` if the alerts cannot be listed.
    pub async fn summarize(&self, filter: &AlertFilter, now: DateTime<Utc>) -> Result<String> {
        let records = self.store.upstream().list_alerts(filter).await?;
        let alerts = self.store.annotate(&records);
        let grouped = group_by_severity(&alerts);

        let mut text = alert_summary(&grouped);
        if !is_quiet(&grouped) {
            text.push_str(&alert_details(&grouped, now));
        }
        Ok(text)
    }
}
