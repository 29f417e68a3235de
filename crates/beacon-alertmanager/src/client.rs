//! HTTP client for the Alertmanager v2 API.

use std::time::Duration;

use async_trait::async_trait;
use beacon_store::{
    matchers_from_labels, same_matchers, validate_silence_request, Alert, AlertFilter, Matcher,
    Silence, SilenceState, SilencedFilter, UpstreamAlert, UpstreamClient, UpstreamError,
};
use chrono::Utc;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::error::{status_error, transport_error, AlertmanagerError, Result};
use crate::wire::{GettableAlert, GettableSilence, PostSilenceResponse, PostableSilence};

/// Connection settings for [`AlertmanagerClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertmanagerConfig {
    /// Base URL, e.g. `http://alertmanager:9093`.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl AlertmanagerConfig {
    /// Creates a configuration with the default timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Client for a Prometheus Alertmanager.
#[derive(Debug, Clone)]
pub struct AlertmanagerClient {
    base: Url,
    http: reqwest::Client,
}

impl AlertmanagerClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `AlertmanagerError::InvalidUrl` if the URL does not parse or
    /// cannot carry a path, and `AlertmanagerError::Client` if the HTTP client
    /// cannot be built.
    pub fn new(config: &AlertmanagerConfig) -> Result<Self> {
        let invalid = |reason: String| AlertmanagerError::InvalidUrl {
            url: config.url.clone(),
            reason,
        };
        let base = Url::parse(&config.url).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("url cannot be a base".to_string()));
        }
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AlertmanagerError::Client(e.to_string()))?;

        Ok(Self { base, http })
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &[&str]) -> std::result::Result<Url, UpstreamError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| UpstreamError::InvalidRequest("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "v2"])
            .extend(path);
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(
        response: Response,
    ) -> std::result::Result<T, UpstreamError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }
        let bytes = response.bytes().await.map_err(|e| transport_error(&e))?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    /// Returns an existing, unexpired silence with exactly these matchers.
    async fn find_existing_silence(
        &self,
        matchers: &[Matcher],
    ) -> std::result::Result<Option<Silence>, UpstreamError> {
        let silences = self.list_silences(matchers).await?;
        Ok(silences
            .into_iter()
            .find(|s| s.state != SilenceState::Expired && same_matchers(&s.matchers, matchers)))
    }
}

fn flag(value: bool) -> String {
    value.to_string()
}

fn alert_query(filter: &AlertFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("active", flag(filter.active)),
        ("silenced", flag(filter.silenced.includes_silenced())),
        ("inhibited", flag(filter.inhibited)),
        ("unprocessed", flag(filter.unprocessed)),
    ];
    if let Some(receiver) = &filter.receiver {
        query.push(("receiver", receiver.clone()));
    }
    query.extend(filter.matchers.iter().map(|m| ("filter", m.to_string())));
    query
}

#[async_trait]
impl UpstreamClient for AlertmanagerClient {
    async fn list_alerts(
        &self,
        filter: &AlertFilter,
    ) -> std::result::Result<Vec<UpstreamAlert>, UpstreamError> {
        let url = self.endpoint(&["alerts"])?;
        let response = self
            .http
            .get(url)
            .query(&alert_query(filter))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let alerts: Vec<GettableAlert> = Self::read_json(response).await?;
        let mut alerts: Vec<UpstreamAlert> = alerts.into_iter().map(UpstreamAlert::from).collect();
        if filter.silenced == SilencedFilter::Only {
            alerts.retain(UpstreamAlert::is_silenced);
        }
        debug!(count = alerts.len(), "listed alerts");
        Ok(alerts)
    }

    async fn create_silence(
        &self,
        alert: &Alert,
        author: &str,
        comment: &str,
        duration: Duration,
    ) -> std::result::Result<String, UpstreamError> {
        validate_silence_request(author, duration)?;
        let matchers = matchers_from_labels(&alert.labels);

        if let Some(existing) = self.find_existing_silence(&matchers).await? {
            info!(
                silence_id = %existing.id,
                alertname = %alert.name(),
                "silence with identical matchers exists, not creating again"
            );
            return Ok(existing.id);
        }

        let starts_at = Utc::now();
        let ends_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| starts_at.checked_add_signed(d))
            .ok_or_else(|| UpstreamError::InvalidRequest("duration out of range".to_string()))?;
        let body = PostableSilence {
            matchers: &matchers,
            starts_at,
            ends_at,
            created_by: author,
            comment,
        };

        let url = self.endpoint(&["silences"])?;
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let created: PostSilenceResponse = Self::read_json(response).await?;

        info!(
            silence_id = %created.silence_id,
            alertname = %alert.name(),
            author = %author,
            duration_secs = duration.as_secs(),
            "created silence"
        );
        Ok(created.silence_id)
    }

    async fn list_silences(
        &self,
        matchers: &[Matcher],
    ) -> std::result::Result<Vec<Silence>, UpstreamError> {
        let url = self.endpoint(&["silences"])?;
        let query: Vec<(&str, String)> = matchers.iter().map(|m| ("filter", m.to_string())).collect();
        let response = self
            .http
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let silences: Vec<GettableSilence> = Self::read_json(response).await?;
        Ok(silences.into_iter().map(Silence::from).collect())
    }

    async fn get_silence(&self, id: &str) -> std::result::Result<Silence, UpstreamError> {
        let url = self.endpoint(&["silence", id])?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(UpstreamError::SilenceNotFound { id: id.to_string() });
        }
        let silence: GettableSilence = Self::read_json(response).await?;
        Ok(silence.into())
    }

    fn link_to_silence(&self, silence_id: &str) -> String {
        format!(
            "{}/#/silences/{silence_id}",
            self.base.as_str().trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_store::LabelSet;
    use mockito::Matcher as QueryMatcher;
    use test_case::test_case;

    fn client(url: &str) -> AlertmanagerClient {
        AlertmanagerClient::new(&AlertmanagerConfig::new(url)).unwrap()
    }

    fn test_alert() -> Alert {
        let mut labels = LabelSet::new();
        labels.insert("alertname".to_string(), "quarkNase".to_string());
        labels.insert("region".to_string(), "staging".to_string());
        let now = Utc::now();
        Alert::from_labels(labels, now, now + chrono::Duration::hours(1))
    }

    fn alerts_body() -> String {
        serde_json::json!([
            {
                "fingerprint": "05281b4f8947b35c",
                "labels": {"alertname": "quarkNase", "region": "staging"},
                "annotations": {},
                "startsAt": "2024-03-01T12:00:00Z",
                "endsAt": "2024-03-01T13:00:00Z",
                "generatorURL": "",
                "status": {"state": "active", "silencedBy": [], "inhibitedBy": []}
            },
            {
                "fingerprint": "00000000000000aa",
                "labels": {"alertname": "Boogieman", "region": "staging"},
                "annotations": {},
                "startsAt": "2024-03-01T12:00:00Z",
                "endsAt": "2024-03-01T13:00:00Z",
                "status": {"state": "suppressed", "silencedBy": ["s-1"], "inhibitedBy": []}
            }
        ])
        .to_string()
    }

    fn silence_json(id: &str, state: &str, matchers: &[Matcher]) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "status": {"state": state},
            "matchers": matchers,
            "startsAt": "2024-03-01T12:00:00Z",
            "endsAt": "2024-03-02T12:00:00Z",
            "createdBy": "Max",
            "comment": "silenced via chat"
        })
    }

    mod construction_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("not a url" ; "garbage")]
        #[test_case("mailto:someone@example.com" ; "cannot be a base")]
        #[test_case("ftp://alertmanager:9093" ; "unsupported scheme")]
        fn rejects_invalid_urls(url: &str) {
            let result = AlertmanagerClient::new(&AlertmanagerConfig::new(url));
            assert!(matches!(result, Err(AlertmanagerError::InvalidUrl { .. })));
        }

        #[test_case("http://alertmanager:9093", "http://alertmanager:9093/#/silences/abc" ; "plain")]
        #[test_case("http://alertmanager:9093/", "http://alertmanager:9093/#/silences/abc" ; "trailing slash")]
        #[test_case("https://example.com/am", "https://example.com/am/#/silences/abc" ; "path prefix")]
        fn link_to_silence(base: &str, expected: &str) {
            assert_eq!(client(base).link_to_silence("abc"), expected);
        }

        #[test]
        fn endpoint_keeps_path_prefix() {
            let c = client("https://example.com/am/");
            let url = c.endpoint(&["silence", "abc"]).unwrap();
            assert_eq!(url.as_str(), "https://example.com/am/api/v2/silence/abc");
        }

        #[test]
        fn alert_query_parameters() {
            let filter = AlertFilter::reconciliation()
                .with_receiver("slack")
                .with_matcher(Matcher::equal("region", "staging"));
            let query = alert_query(&filter);
            assert!(query.contains(&("active", "true".to_string())));
            assert!(query.contains(&("silenced", "true".to_string())));
            assert!(query.contains(&("unprocessed", "false".to_string())));
            assert!(query.contains(&("receiver", "slack".to_string())));
            assert!(query.contains(&("filter", r#"region="staging""#.to_string())));
        }
    }

    mod alert_tests {
        use super::*;

        #[tokio::test]
        async fn list_alerts_sends_filter() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/api/v2/alerts")
                .match_query(QueryMatcher::AllOf(vec![
                    QueryMatcher::UrlEncoded("active".into(), "true".into()),
                    QueryMatcher::UrlEncoded("silenced".into(), "false".into()),
                    QueryMatcher::UrlEncoded("inhibited".into(), "true".into()),
                    QueryMatcher::UrlEncoded("unprocessed".into(), "false".into()),
                    QueryMatcher::UrlEncoded("filter".into(), r#"region="staging""#.into()),
                ]))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(alerts_body())
                .create_async()
                .await;

            let filter = AlertFilter::default().with_matcher(Matcher::equal("region", "staging"));
            let alerts = client(&server.url()).list_alerts(&filter).await.unwrap();

            assert_eq!(alerts.len(), 2);
            assert_eq!(alerts[0].fingerprint, "05281b4f8947b35c");
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn only_silenced_is_applied_locally() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/api/v2/alerts")
                .match_query(QueryMatcher::UrlEncoded("silenced".into(), "true".into()))
                .with_status(200)
                .with_body(alerts_body())
                .create_async()
                .await;

            let filter = AlertFilter {
                silenced: SilencedFilter::Only,
                ..AlertFilter::default()
            };
            let alerts = client(&server.url()).list_alerts(&filter).await.unwrap();

            assert_eq!(alerts.len(), 1);
            assert_eq!(alerts[0].labels["alertname"], "Boogieman");
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn server_error_maps_to_status() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", "/api/v2/alerts")
                .match_query(QueryMatcher::Any)
                .with_status(503)
                .with_body("overloaded")
                .create_async()
                .await;

            let result = client(&server.url())
                .list_alerts(&AlertFilter::default())
                .await;
            match result {
                Err(UpstreamError::Status { status, body }) => {
                    assert_eq!(status, 503);
                    assert_eq!(body, "overloaded");
                }
                other => panic!("unexpected result: {other:?}"),
            }
        }

        #[tokio::test]
        async fn malformed_body_maps_to_decode() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", "/api/v2/alerts")
                .match_query(QueryMatcher::Any)
                .with_status(200)
                .with_body("{not json")
                .create_async()
                .await;

            let result = client(&server.url())
                .list_alerts(&AlertFilter::default())
                .await;
            assert!(matches!(result, Err(UpstreamError::Decode(_))));
        }

        #[tokio::test]
        async fn unreachable_maps_to_unavailable() {
            let config = AlertmanagerConfig {
                url: "http://127.0.0.1:1".to_string(),
                timeout: Duration::from_secs(2),
            };
            let result = AlertmanagerClient::new(&config)
                .unwrap()
                .list_alerts(&AlertFilter::default())
                .await;
            assert!(matches!(result, Err(UpstreamError::Unavailable(_))));
        }
    }

    mod silence_tests {
        use super::*;

        #[tokio::test]
        async fn create_silence_posts_when_none_exists() {
            let mut server = mockito::Server::new_async().await;
            let list = server
                .mock("GET", "/api/v2/silences")
                .match_query(QueryMatcher::Any)
                .with_status(200)
                .with_body("[]")
                .create_async()
                .await;
            let post = server
                .mock("POST", "/api/v2/silences")
                .match_body(QueryMatcher::PartialJson(serde_json::json!({
                    "createdBy": "Max",
                    "comment": "silenced via chat",
                    "matchers": [
                        {"name": "alertname", "value": "quarkNase", "isRegex": false, "isEqual": true},
                        {"name": "region", "value": "staging", "isRegex": false, "isEqual": true}
                    ]
                })))
                .with_status(200)
                .with_body(r#"{"silenceID":"new-silence"}"#)
                .create_async()
                .await;

            let id = client(&server.url())
                .create_silence(
                    &test_alert(),
                    "Max",
                    "silenced via chat",
                    Duration::from_secs(86_400),
                )
                .await
                .unwrap();

            assert_eq!(id, "new-silence");
            list.assert_async().await;
            post.assert_async().await;
        }

        #[tokio::test]
        async fn create_silence_reuses_existing() {
            let mut server = mockito::Server::new_async().await;
            let mut existing = matchers_from_labels(&test_alert().labels);
            existing.push(Matcher::equal("createdBy", "Peter"));
            let _list = server
                .mock("GET", "/api/v2/silences")
                .match_query(QueryMatcher::Any)
                .with_status(200)
                .with_body(
                    serde_json::json!([
                        silence_json("old", "expired", &existing),
                        silence_json("current", "active", &existing),
                    ])
                    .to_string(),
                )
                .create_async()
                .await;
            let post = server
                .mock("POST", "/api/v2/silences")
                .expect(0)
                .create_async()
                .await;

            let id = client(&server.url())
                .create_silence(&test_alert(), "Max", "again", Duration::from_secs(60))
                .await
                .unwrap();

            assert_eq!(id, "current");
            post.assert_async().await;
        }

        #[tokio::test]
        async fn create_silence_validates_before_calling() {
            let server = mockito::Server::new_async().await;
            let c = client(&server.url());

            let no_author = c
                .create_silence(&test_alert(), "", "c", Duration::from_secs(60))
                .await;
            assert!(matches!(no_author, Err(UpstreamError::InvalidRequest(_))));

            let no_duration = c
                .create_silence(&test_alert(), "Max", "c", Duration::ZERO)
                .await;
            assert!(matches!(no_duration, Err(UpstreamError::InvalidRequest(_))));
        }

        #[tokio::test]
        async fn get_silence_found() {
            let mut server = mockito::Server::new_async().await;
            let matchers = vec![Matcher::equal("alertname", "A")];
            let _mock = server
                .mock("GET", "/api/v2/silence/s-1")
                .with_status(200)
                .with_body(silence_json("s-1", "active", &matchers).to_string())
                .create_async()
                .await;

            let silence = client(&server.url()).get_silence("s-1").await.unwrap();
            assert_eq!(silence.id, "s-1");
            assert_eq!(silence.created_by, "Max");
            assert!(silence.is_active());
        }

        #[tokio::test]
        async fn get_silence_not_found() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", "/api/v2/silence/missing")
                .with_status(404)
                .create_async()
                .await;

            let result = client(&server.url()).get_silence("missing").await;
            assert!(matches!(result, Err(UpstreamError::SilenceNotFound { .. })));
        }
    }
}
