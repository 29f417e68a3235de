//! Daemon lifecycle: background tasks, snapshots and shutdown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use beacon_alertmanager::AlertmanagerClient;
use beacon_relay::{ChatClient, PagingClient, Relay};
use beacon_store::{Alert, AlertStore, FilePersister};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BeaconConfig;
use crate::error::{DaemonError, Result};

/// The running daemon: an alert store kept in sync with Alertmanager and
/// snapshotted to disk.
#[derive(Debug)]
pub struct Daemon {
    store: AlertStore,
    snapshot_interval: Duration,
}

impl Daemon {
    /// Builds the Alertmanager client and the store, loading the last
    /// snapshot if persistence is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built or the snapshot
    /// directory cannot be created.
    pub fn new(config: &BeaconConfig) -> Result<Self> {
        let client = AlertmanagerClient::new(&config.alertmanager_config())?;
        let persister = config
            .store
            .persistence_path
            .as_ref()
            .map(FilePersister::new)
            .transpose()?;

        info!(
            alertmanager = %client.base_url(),
            persistence = ?config.store.persistence_path,
            recheck_interval_secs = config.store.recheck_interval_secs,
            "initializing alert store"
        );
        let store = AlertStore::new(config.store_config(), Arc::new(client), persister);
        Ok(Self::with_store(store, config.snapshot_interval()))
    }

    /// Wraps an existing store.
    #[must_use]
    pub const fn with_store(store: AlertStore, snapshot_interval: Duration) -> Self {
        Self {
            store,
            snapshot_interval,
        }
    }

    /// Returns the store.
    #[must_use]
    pub const fn store(&self) -> &AlertStore {
        &self.store
    }

    /// Builds an action relay on top of the daemon's store.
    ///
    /// Acknowledgements made through the relay land in the same overlay the
    /// daemon reconciles and snapshots. Call
    /// [`Relay::refresh_authorized_users`] before handling events.
    #[must_use]
    pub fn relay(&self, chat: Arc<dyn ChatClient>, paging: Arc<dyn PagingClient>) -> Relay {
        debug!("attaching action relay");
        Relay::new(self.store.clone(), chat, paging)
    }

    /// Runs until `token` is cancelled.
    ///
    /// Starts the reconciler and, with persistence, a periodic snapshot task.
    /// After cancellation both tasks are joined and a final snapshot is taken.
    pub async fn run(self, token: CancellationToken) {
        info!(alerts = self.store.count(), "beacon daemon started");

        let reconciler = self.store.spawn_reconciler(token.clone());
        let snapshotter = self.store.persistence_path().is_some().then(|| {
            tokio::spawn(run_snapshots(
                self.store.clone(),
                self.snapshot_interval,
                token.clone(),
            ))
        });

        token.cancelled().await;
        info!("shutting down");

        join(reconciler, "reconciler").await;
        if let Some(handle) = snapshotter {
            join(handle, "snapshotter").await;
            if let Some(bytes) = snapshot(&self.store).await {
                info!(bytes, alerts = self.store.count(), "wrote final snapshot");
            }
        }
        info!("beacon daemon stopped");
    }
}

async fn join(handle: JoinHandle<()>, task: &str) {
    if let Err(e) = handle.await {
        warn!(task, error = %e, "background task failed");
    }
}

async fn run_snapshots(store: AlertStore, period: Duration, token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(interval_secs = period.as_secs(), "snapshotter started");

    loop {
        tokio::select! {
            biased;

            () = token.cancelled() => break,

            _ = ticker.tick() => {
                snapshot(&store).await;
            }
        }
    }
    debug!("snapshotter stopped");
}

/// Writes a snapshot off the async runtime. Failures are logged.
async fn snapshot(store: &AlertStore) -> Option<u64> {
    let store = store.clone();
    match tokio::task::spawn_blocking(move || store.snapshot()).await {
        Ok(Ok(bytes)) => Some(bytes),
        Ok(Err(e)) => {
            warn!(error = %e, "snapshot failed, keeping in-memory state");
            None
        }
        Err(e) => {
            warn!(error = %e, "snapshot task failed");
            None
        }
    }
}

/// Cancels `token` on SIGINT or SIGTERM.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
        () = token.cancelled() => return,
    }
    token.cancel();
}

/// Reads a snapshot file, oldest alert first.
///
/// # Errors
///
/// Returns `DaemonError::Config` if the file does not exist, or the store's
/// error if it cannot be decoded.
pub fn inspect_snapshot(path: &Path) -> Result<Vec<Alert>> {
    if !path.is_file() {
        return Err(DaemonError::Config(format!(
            "snapshot '{}' does not exist",
            path.display()
        )));
    }
    let mut alerts: Vec<Alert> = FilePersister::new(path)?.load()?.into_values().collect();
    alerts.sort_by(|a, b| {
        a.starts_at
            .cmp(&b.starts_at)
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_store::{InMemoryUpstream, LabelSet, StoreConfig, UpstreamClient};
    use chrono::{Duration as ChronoDuration, Utc};

    fn alert(name: &str, age_hours: i64) -> Alert {
        let mut labels = LabelSet::new();
        labels.insert("alertname".to_string(), name.to_string());
        let now = Utc::now();
        Alert::from_labels(
            labels,
            now - ChronoDuration::hours(age_hours),
            now + ChronoDuration::hours(1),
        )
    }

    fn persistent_store(path: &Path, upstream: Arc<InMemoryUpstream>) -> AlertStore {
        AlertStore::new(
            StoreConfig {
                recheck_interval: Duration::from_millis(20),
                ..StoreConfig::default()
            },
            upstream as Arc<dyn UpstreamClient>,
            Some(FilePersister::new(path).unwrap()),
        )
    }

    mod lifecycle_tests {
        use super::*;

        #[tokio::test]
        async fn final_snapshot_on_shutdown() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("alerts.snapshot");
            let upstream = Arc::new(InMemoryUpstream::new());
            let firing = alert("quarkNase", 1);
            upstream.set_store_alerts(&[firing.clone()]);

            let store = persistent_store(&path, Arc::clone(&upstream));
            store.acknowledge_and_set(&[firing.clone()], "Max").unwrap();

            let daemon = Daemon::with_store(store, Duration::from_secs(3600));
            let token = CancellationToken::new();
            let handle = tokio::spawn(daemon.run(token.clone()));

            tokio::time::sleep(Duration::from_millis(60)).await;
            token.cancel();
            handle.await.unwrap();

            assert!(upstream.list_calls() >= 1);
            let restored = inspect_snapshot(&path).unwrap();
            assert_eq!(restored.len(), 1);
            assert_eq!(restored[0].fingerprint, firing.fingerprint);
            assert_eq!(restored[0].acknowledged_by(), Some("Max"));
        }

        #[tokio::test]
        async fn periodic_snapshots() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("alerts.snapshot");
            let store = persistent_store(&path, Arc::new(InMemoryUpstream::new()));
            store.set(alert("quarkNase", 1));

            let daemon = Daemon::with_store(store.clone(), Duration::from_millis(20));
            let token = CancellationToken::new();
            let handle = tokio::spawn(daemon.run(token.clone()));

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(store.metrics().snapshots_succeeded >= 1);
            assert!(path.is_file());

            token.cancel();
            handle.await.unwrap();
        }

        #[tokio::test]
        async fn stateless_store_writes_nothing() {
            let store = AlertStore::new(
                StoreConfig::default(),
                Arc::new(InMemoryUpstream::new()),
                None,
            );
            let daemon = Daemon::with_store(store.clone(), Duration::from_millis(10));
            let token = CancellationToken::new();
            token.cancel();
            daemon.run(token).await;

            let metrics = store.metrics();
            assert_eq!(metrics.snapshots_succeeded, 0);
            assert_eq!(metrics.snapshots_failed, 0);
        }

        #[tokio::test]
        async fn shutdown_signal_returns_on_cancel() {
            let token = CancellationToken::new();
            token.cancel();
            tokio::time::timeout(Duration::from_secs(1), shutdown_signal(token))
                .await
                .unwrap();
        }

        #[test]
        fn daemon_from_config() {
            let dir = tempfile::tempdir().unwrap();
            let mut config = BeaconConfig::default();
            config.store.persistence_path = Some(dir.path().join("state").join("alerts.snapshot"));

            let daemon = Daemon::new(&config).unwrap();
            assert_eq!(daemon.store().count(), 0);
            assert!(dir.path().join("state").is_dir());
        }
    }

    mod relay_tests {
        use super::*;
        use async_trait::async_trait;
        use beacon_relay::{Action, ActionEvent, ChatUser};

        #[derive(Debug)]
        struct QuietChat;

        #[async_trait]
        impl ChatClient for QuietChat {
            async fn list_authorized_users(&self) -> beacon_relay::Result<Vec<String>> {
                Ok(vec!["U1".to_string()])
            }

            async fn resolve_user(&self, user_id: &str) -> beacon_relay::Result<ChatUser> {
                Ok(ChatUser {
                    id: user_id.to_string(),
                    name: "Max".to_string(),
                    email: "max@example.com".to_string(),
                })
            }

            async fn post_message(
                &self,
                _channel: &str,
                _text: &str,
                _thread_ref: &str,
            ) -> beacon_relay::Result<()> {
                Ok(())
            }

            async fn add_reaction(
                &self,
                _channel: &str,
                _message_ref: &str,
                _emoji: &str,
            ) -> beacon_relay::Result<()> {
                Ok(())
            }
        }

        #[derive(Debug)]
        struct QuietPaging;

        #[async_trait]
        impl PagingClient for QuietPaging {
            async fn acknowledge_incident(
                &self,
                _alert: &Alert,
                _user_email: &str,
            ) -> beacon_relay::Result<()> {
                Ok(())
            }
        }

        #[tokio::test]
        async fn relay_acknowledges_into_daemon_store() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("alerts.snapshot");
            let upstream = Arc::new(InMemoryUpstream::new());
            let firing = alert("quarkNase", 1);
            upstream.set_store_alerts(&[firing.clone()]);

            let daemon = Daemon::with_store(
                persistent_store(&path, upstream),
                Duration::from_secs(3600),
            );
            let relay = daemon.relay(Arc::new(QuietChat), Arc::new(QuietPaging));
            relay.refresh_authorized_users().await.unwrap();

            relay
                .handle(&ActionEvent {
                    user_id: "U1".to_string(),
                    channel: "C1".to_string(),
                    message_ref: "1700000000.000100".to_string(),
                    labels: firing.labels.clone(),
                    actions: vec![Action::Acknowledge],
                })
                .await
                .unwrap();

            let stored = daemon.store().get(firing.fingerprint).unwrap();
            assert_eq!(stored.acknowledged_by(), Some("Max"));

            let token = CancellationToken::new();
            token.cancel();
            daemon.run(token).await;
            assert_eq!(inspect_snapshot(&path).unwrap()[0].acknowledged_by(), Some("Max"));
        }
    }

    mod inspect_tests {
        use super::*;

        #[test]
        fn sorted_oldest_first() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("alerts.snapshot");
            let store = persistent_store(&path, Arc::new(InMemoryUpstream::new()));
            store.set(alert("young", 1));
            store.set(alert("old", 5));
            store.snapshot().unwrap();

            let alerts = inspect_snapshot(&path).unwrap();
            let names: Vec<&str> = alerts.iter().map(Alert::name).collect();
            assert_eq!(names, vec!["old", "young"]);
        }

        #[test]
        fn missing_snapshot() {
            let dir = tempfile::tempdir().unwrap();
            let err = inspect_snapshot(&dir.path().join("nope")).unwrap_err();
            assert!(matches!(err, DaemonError::Config(msg) if msg.contains("does not exist")));
        }
    }
}
