//! Snapshot codec.
//!
//! A snapshot is the magic [`SNAPSHOT_MAGIC`] followed by a sequence of
//! records. Each record is a big-endian `u32` length and that many bytes of
//! JSON describing one alert. The fingerprint is kept as its textual form so
//! that a single undecodable key only costs its own record.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::types::{Alert, Fingerprint, LabelSet};

/// Leading bytes of every snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"BSN1";

/// Upper bound for a single record, guards against reading garbage lengths.
pub const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    fingerprint: String,
    labels: LabelSet,
    #[serde(default)]
    annotations: LabelSet,
    #[serde(rename = "startsAt")]
    starts_at: DateTime<Utc>,
    #[serde(rename = "endsAt")]
    ends_at: DateTime<Utc>,
    #[serde(rename = "generatorURL", default)]
    generator_url: String,
}

impl From<&Alert> for SnapshotRecord {
    fn from(alert: &Alert) -> Self {
        Self {
            fingerprint: alert.fingerprint.to_string(),
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            starts_at: alert.starts_at,
            ends_at: alert.ends_at,
            generator_url: alert.generator_url.clone(),
        }
    }
}

impl SnapshotRecord {
    fn into_alert(self) -> Result<Alert> {
        let fingerprint: Fingerprint = self.fingerprint.parse()?;
        Ok(Alert {
            fingerprint,
            labels: self.labels,
            annotations: self.annotations,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            generator_url: self.generator_url,
        })
    }
}

/// Writes `alerts` as a snapshot and returns the number of bytes written.
///
/// # Errors
///
/// Returns an error if a record cannot be serialized or the writer fails.
pub fn encode<'a, W, I>(writer: &mut W, alerts: I) -> io::Result<u64>
where
    W: Write,
    I: IntoIterator<Item = &'a Alert>,
{
    writer.write_all(&SNAPSHOT_MAGIC)?;
    let mut written = SNAPSHOT_MAGIC.len() as u64;

    for alert in alerts {
        let payload = serde_json::to_vec(&SnapshotRecord::from(alert))?;
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_RECORD_LEN)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("record for {} exceeds {MAX_RECORD_LEN} bytes", alert.fingerprint),
                )
            })?;
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(&payload)?;
        written += 4 + u64::from(len);
    }

    Ok(written)
}

/// Reads a snapshot, keyed by fingerprint.
///
/// Records that are not valid JSON or whose fingerprint cannot be parsed are
/// skipped with a warning; the length prefix still locates the next record.
///
/// # Errors
///
/// Returns `StoreError::CorruptSnapshot` if the magic is wrong, a length is
/// oversized, or a prefix or record is truncated, and
/// `StoreError::Persistence` on I/O errors.
pub fn decode<R: Read>(reader: &mut R) -> Result<HashMap<Fingerprint, Alert>> {
    let mut magic = [0u8; 4];
    read_exact_or_corrupt(reader, &mut magic, "missing header")?;
    if magic != SNAPSHOT_MAGIC {
        return Err(StoreError::CorruptSnapshot {
            reason: format!("unexpected header {magic:02x?}"),
        });
    }

    let mut alerts = HashMap::new();
    let mut index = 0usize;
    loop {
        let mut len_buf = [0u8; 4];
        match read_prefix(reader, &mut len_buf)? {
            Prefix::Eof => break,
            Prefix::Partial => {
                return Err(StoreError::CorruptSnapshot {
                    reason: format!("truncated length prefix in record {index}"),
                });
            }
            Prefix::Complete => {}
        }

        let len = u32::from_be_bytes(len_buf);
        if len > MAX_RECORD_LEN {
            return Err(StoreError::CorruptSnapshot {
                reason: format!("record {index} claims {len} bytes"),
            });
        }

        let mut payload = vec![0u8; len as usize];
        read_exact_or_corrupt(reader, &mut payload, "truncated record")?;

        let decoded = serde_json::from_slice::<SnapshotRecord>(&payload)
            .map_err(StoreError::from)
            .and_then(SnapshotRecord::into_alert);
        match decoded {
            Ok(alert) => {
                alerts.insert(alert.fingerprint, alert);
            }
            Err(e) => {
                warn!(record = index, error = %e, "skipping snapshot record");
            }
        }
        index += 1;
    }

    Ok(alerts)
}

enum Prefix {
    Eof,
    Partial,
    Complete,
}

fn read_prefix<R: Read>(reader: &mut R, buf: &mut [u8; 4]) -> Result<Prefix> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(StoreError::persistence("<snapshot>", e)),
        }
    }
    Ok(match filled {
        0 => Prefix::Eof,
        4 => Prefix::Complete,
        _ => Prefix::Partial,
    })
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StoreError::CorruptSnapshot {
                reason: what.to_string(),
            }
        } else {
            StoreError::persistence("<snapshot>", e)
        }
    })
}
