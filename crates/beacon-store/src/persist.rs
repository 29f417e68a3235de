//! File-backed snapshot persistence.
//!
//! [`FilePersister`] owns one snapshot path. Writes go to a sibling temporary
//! file which is renamed over the target once complete, so a reader never
//! observes a partial snapshot and a crash mid-write leaves the previous one
//! intact.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::types::{Alert, Fingerprint};

/// Persists the overlay map to a single snapshot file.
#[derive(Debug)]
pub struct FilePersister {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// A fully written temporary snapshot that has not replaced the target yet.
#[derive(Debug)]
struct StagedSnapshot {
    temp_path: PathBuf,
    bytes: u64,
}

impl FilePersister {
    /// Creates a persister for `path`.
    ///
    /// The parent directory is created if missing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the parent directory cannot be created.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::persistence(parent, e))?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the last snapshot.
    ///
    /// A missing file is a first run and yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn load(&self) -> Result<HashMap<Fingerprint, Alert>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot found, starting empty");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(StoreError::persistence(&self.path, e)),
        };

        let alerts = codec::decode(&mut BufReader::new(file)).map_err(|e| match e {
            StoreError::Persistence { source, .. } => StoreError::persistence(&self.path, source),
            other => other,
        })?;

        info!(path = %self.path.display(), alerts = alerts.len(), "loaded snapshot");
        Ok(alerts)
    }

    /// Writes a snapshot of `alerts` and returns its size in bytes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Persistence` if the temporary file cannot be
    /// written or renamed. The previous snapshot is left untouched.
    pub fn store(&self, alerts: &HashMap<Fingerprint, Alert>) -> Result<u64> {
        let _guard = self.write_lock.lock();
        let staged = self.stage(alerts)?;
        self.commit(staged)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{:016x}", rand::random::<u64>()));
        PathBuf::from(name)
    }

    fn stage(&self, alerts: &HashMap<Fingerprint, Alert>) -> Result<StagedSnapshot> {
        let temp_path = self.temp_path();
        let result = Self::write_file(&temp_path, alerts);
        match result {
            Ok(bytes) => Ok(StagedSnapshot { temp_path, bytes }),
            Err(e) => {
                remove_quietly(&temp_path);
                Err(StoreError::persistence(&temp_path, e))
            }
        }
    }

    fn write_file(path: &Path, alerts: &HashMap<Fingerprint, Alert>) -> std::io::Result<u64> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let bytes = codec::encode(&mut writer, alerts.values())?;
        writer.flush()?;
        let file = writer.into_inner().map_err(std::io::IntoInnerError::into_error)?;
        file.sync_all()?;
        Ok(bytes)
    }

    fn commit(&self, staged: StagedSnapshot) -> Result<u64> {
        if let Err(e) = fs::rename(&staged.temp_path, &self.path) {
            remove_quietly(&staged.temp_path);
            return Err(StoreError::persistence(&self.path, e));
        }
        debug!(path = %self.path.display(), bytes = staged.bytes, "snapshot committed");
        Ok(staged.bytes)
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove temporary snapshot");
        }
    }
}
