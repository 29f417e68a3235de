//! Alertmanager v2 API payloads.

use beacon_store::{LabelSet, Matcher, Silence, SilenceState, UpstreamAlert, UpstreamAlertState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GettableAlert {
    pub(crate) fingerprint: String,
    pub(crate) labels: LabelSet,
    #[serde(default)]
    pub(crate) annotations: LabelSet,
    pub(crate) starts_at: DateTime<Utc>,
    pub(crate) ends_at: DateTime<Utc>,
    #[serde(rename = "generatorURL", default)]
    pub(crate) generator_url: String,
    pub(crate) status: AlertStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AlertStatus {
    pub(crate) state: UpstreamAlertState,
    #[serde(default)]
    pub(crate) silenced_by: Vec<String>,
    #[serde(default)]
    pub(crate) inhibited_by: Vec<String>,
}

impl From<GettableAlert> for UpstreamAlert {
    fn from(alert: GettableAlert) -> Self {
        Self {
            fingerprint: alert.fingerprint,
            labels: alert.labels,
            annotations: alert.annotations,
            starts_at: alert.starts_at,
            ends_at: alert.ends_at,
            generator_url: alert.generator_url,
            state: alert.status.state,
            silenced_by: alert.status.silenced_by,
            inhibited_by: alert.status.inhibited_by,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GettableSilence {
    pub(crate) id: String,
    pub(crate) status: SilenceStatus,
    pub(crate) matchers: Vec<Matcher>,
    pub(crate) starts_at: DateTime<Utc>,
    pub(crate) ends_at: DateTime<Utc>,
    pub(crate) created_by: String,
    #[serde(default)]
    pub(crate) comment: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SilenceStatus {
    pub(crate) state: SilenceState,
}

impl From<GettableSilence> for Silence {
    fn from(silence: GettableSilence) -> Self {
        Self {
            id: silence.id,
            matchers: silence.matchers,
            starts_at: silence.starts_at,
            ends_at: silence.ends_at,
            created_by: silence.created_by,
            comment: silence.comment,
            state: silence.status.state,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostableSilence<'a> {
    pub(crate) matchers: &'a [Matcher],
    pub(crate) starts_at: DateTime<Utc>,
    pub(crate) ends_at: DateTime<Utc>,
    pub(crate) created_by: &'a str,
    pub(crate) comment: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostSilenceResponse {
    #[serde(rename = "silenceID")]
    pub(crate) silence_id: String,
}
