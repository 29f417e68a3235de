//! Daemon configuration.
//!
//! The configuration file is TOML with two sections:
//!
//! ```toml
//! [alertmanager]
//! url = "http://alertmanager:9093"
//! timeout_secs = 10
//!
//! [store]
//! persistence_path = "/var/lib/beacon/alerts.snapshot"
//! recheck_interval_secs = 60
//! snapshot_interval_secs = 300
//! min_requery_interval_secs = 5
//! ```
//!
//! Every field has a default. Command line flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use beacon_alertmanager::AlertmanagerConfig;
use beacon_store::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

/// Path the daemon reads when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/beacon/beacon.toml";

/// Snapshot path written by `init-config`.
pub const DEFAULT_PERSISTENCE_PATH: &str = "/var/lib/beacon/alerts.snapshot";

/// Upstream Alertmanager settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlertmanagerSection {
    /// Base URL.
    pub url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AlertmanagerSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:9093".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Overlay store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreSection {
    /// Snapshot file. Without one the store is stateless.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_path: Option<PathBuf>,
    /// Reconciliation period in seconds.
    pub recheck_interval_secs: u64,
    /// Snapshot period in seconds.
    pub snapshot_interval_secs: u64,
    /// Minimum seconds between lookup-triggered upstream queries.
    pub min_requery_interval_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            persistence_path: None,
            recheck_interval_secs: 60,
            snapshot_interval_secs: 300,
            min_requery_interval_secs: 5,
        }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BeaconConfig {
    /// Upstream settings.
    pub alertmanager: AlertmanagerSection,
    /// Store settings.
    pub store: StoreSection,
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--alertmanager-url`
    pub alertmanager_url: Option<String>,
    /// `--persistence-file`
    pub persistence_file: Option<PathBuf>,
    /// `--recheck-interval`
    pub recheck_interval_secs: Option<u64>,
}

impl BeaconConfig {
    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DaemonError::io(path, e))?;
        Self::from_toml(&content)
    }

    /// Parses and validates TOML.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::Config` for invalid TOML or values.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| DaemonError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, else the default path if it exists, else the
    /// built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is found but cannot be loaded.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::Config` if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DaemonError::Config(format!("cannot render TOML: {e}")))
    }

    /// Writes the configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DaemonError::io(parent, e))?;
        }
        std::fs::write(path, self.to_toml()?).map_err(|e| DaemonError::io(path, e))
    }

    /// Applies command line overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.alertmanager_url {
            self.alertmanager.url.clone_from(url);
        }
        if let Some(path) = &overrides.persistence_file {
            self.store.persistence_path = Some(path.clone());
        }
        if let Some(secs) = overrides.recheck_interval_secs {
            self.store.recheck_interval_secs = secs;
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let url = self.alertmanager.url.trim();
        if url.is_empty() {
            return Err(DaemonError::Config("alertmanager.url cannot be empty".to_string()));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DaemonError::Config(
                "alertmanager.url must start with http:// or https://".to_string(),
            ));
        }
        if self.alertmanager.timeout_secs == 0 {
            return Err(DaemonError::Config(
                "alertmanager.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.store.recheck_interval_secs == 0 {
            return Err(DaemonError::Config(
                "store.recheck_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.store.persistence_path.is_some() && self.store.snapshot_interval_secs == 0 {
            return Err(DaemonError::Config(
                "store.snapshot_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn store_config(&self) -> StoreConfig {
        StoreConfig {
            recheck_interval: Duration::from_secs(self.store.recheck_interval_secs),
            min_requery_interval: Duration::from_secs(self.store.min_requery_interval_secs),
        }
    }

    /// Returns the Alertmanager client configuration.
    #[must_use]
    pub fn alertmanager_config(&self) -> AlertmanagerConfig {
        AlertmanagerConfig {
            url: self.alertmanager.url.trim().to_string(),
            timeout: Duration::from_secs(self.alertmanager.timeout_secs),
        }
    }

    /// Returns the snapshot period.
    #[must_use]
    pub const fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.store.snapshot_interval_secs)
    }
}
