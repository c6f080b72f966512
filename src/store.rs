//! Shipment store: the single durable record of known shipments.
//!
//! The whole map lives in one human-readable JSON file keyed by waybill.
//! Every write goes to a uniquely named temporary file next to the target,
//! is fsynced, and is then renamed over the target, so a reader only ever
//! sees the previous complete file or the new complete file.
//!
//! A file that exists but cannot be parsed is fatal: [`ShipmentStore::load`]
//! fails and no store instance exists that could overwrite it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::shipment::{EventSnapshot, Shipment, ShipmentPatch, Waybill};

/// Default store file name, relative to the working directory.
pub const DEFAULT_STORE_FILE: &str = "active_ids.json";

/// Outcome of an [`ShipmentStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// File-backed map of waybill → shipment.
#[derive(Debug)]
pub struct ShipmentStore {
    path: PathBuf,
    shipments: BTreeMap<Waybill, Shipment>,
}

impl ShipmentStore {
    /// Load the store from `path`. A missing file is an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Store file not found, starting empty");
                return Ok(Self {
                    path,
                    shipments: BTreeMap::new(),
                });
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let records: BTreeMap<Waybill, StoredRecord> =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let mut legacy = 0usize;
        let shipments = records
            .into_iter()
            .map(|(id, record)| {
                let shipment = match record {
                    StoredRecord::Current(s) => s,
                    StoredRecord::Legacy(l) => {
                        legacy += 1;
                        l.into_shipment()
                    }
                };
                (id, shipment)
            })
            .collect::<BTreeMap<_, _>>();

        if legacy > 0 {
            warn!(
                count = legacy,
                "Imported records in the old store format; they are rewritten on next save"
            );
        }
        debug!(path = %path.display(), count = shipments.len(), "Loaded shipment store");

        Ok(Self { path, shipments })
    }

    pub fn get(&self, id: &Waybill) -> Option<&Shipment> {
        self.shipments.get(id)
    }

    pub fn contains(&self, id: &Waybill) -> bool {
        self.shipments.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }

    /// Waybills the tracking cycle still has to look at: non-terminal, or
    /// carrying an undispatched notification. Ascending.
    pub fn active_ids(&self) -> Vec<Waybill> {
        self.shipments
            .iter()
            .filter(|(_, s)| s.is_active())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Create `id` with defaults if absent, then merge `patch` into it.
    pub fn upsert(&mut self, id: &Waybill, patch: ShipmentPatch) -> Upsert {
        let mut outcome = Upsert::Updated;
        let shipment = self.shipments.entry(id.clone()).or_insert_with(|| {
            outcome = Upsert::Created;
            Shipment::discovered(Utc::now())
        });
        patch.apply(shipment);
        outcome
    }

    /// Atomically replace the backing file with the current map.
    pub async fn persist(&self) -> Result<(), StoreError> {
        self.stage().await?.commit().await?;
        debug!(path = %self.path.display(), count = self.shipments.len(), "Persisted shipment store");
        Ok(())
    }

    /// First half of [`persist`](Self::persist): write the full map to a
    /// temporary file beside the target. The target is untouched until
    /// [`StagedWrite::commit`].
    pub async fn stage(&self) -> Result<StagedWrite, StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let payload = serde_json::to_vec_pretty(&self.shipments)?;
        let temp = temp_path_for(&self.path);
        // Guard exists before the first byte is written so a failed write
        // cleans up after itself.
        let staged = StagedWrite {
            temp: temp.clone(),
            target: self.path.clone(),
            committed: false,
        };

        let io_err = |source| StoreError::Io {
            path: temp.clone(),
            source,
        };
        let mut file = fs::File::create(&temp).await.map_err(io_err)?;
        file.write_all(&payload).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        Ok(staged)
    }
}

/// A fully written temporary copy of the store awaiting its rename.
///
/// Dropping it without committing removes the temporary file.
#[derive(Debug)]
pub struct StagedWrite {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Path of the temporary file.
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Rename the temporary file over the target.
    pub async fn commit(mut self) -> Result<(), StoreError> {
        fs::rename(&self.temp, &self.target)
            .await
            .map_err(|source| StoreError::Io {
                path: self.target.clone(),
                source,
            })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

/// `dir/.active_ids.json.<uuid>.tmp` for `dir/active_ids.json`.
fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_STORE_FILE.to_string());
    target.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}

// ── On-disk records ─────────────────────────────────────────────────

/// A record as found on disk: the current schema, or the flat
/// `{last_event, delivered}` shape written by earlier versions.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Current(Shipment),
    Legacy(LegacyRecord),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyRecord {
    #[serde(default)]
    last_event: Option<LegacyEvent>,
    #[serde(default)]
    delivered: bool,
}

#[derive(Debug, Deserialize)]
struct LegacyEvent {
    #[serde(rename = "Location", default)]
    location: String,
    #[serde(rename = "Details")]
    details: String,
    #[serde(rename = "Date", default)]
    date: String,
    #[serde(rename = "Time", default)]
    time: String,
}

impl LegacyRecord {
    fn into_shipment(self) -> Shipment {
        let mut shipment = Shipment::discovered(Utc::now());
        shipment.terminal = self.delivered;
        if let Some(ev) = self.last_event {
            let snapshot = EventSnapshot {
                location: ev.location,
                details: ev.details,
                date: ev.date,
                time: ev.time,
            };
            shipment.status_label = Some(snapshot.details.trim().to_string());
            shipment.last_event_signature = Some(snapshot.signature());
            shipment.last_event = Some(snapshot);
        }
        shipment
    }
}
