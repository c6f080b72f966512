//! Shipment model: waybill numbers, tracked shipments, and event descriptors.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidWaybill;

/// Number of digits in a waybill number.
pub const WAYBILL_LEN: usize = 11;

// ── Waybill ─────────────────────────────────────────────────────────

/// An 11-digit waybill (shipment) number. The store's natural key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Waybill(String);

impl Waybill {
    /// Validate and wrap a waybill number.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidWaybill> {
        let raw = raw.into();
        if raw.len() == WAYBILL_LEN && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw))
        } else {
            Err(InvalidWaybill(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Waybill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Waybill {
    type Err = InvalidWaybill;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Waybill {
    type Error = InvalidWaybill;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Waybill> for String {
    fn from(value: Waybill) -> Self {
        value.0
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// Comparable fingerprint of a tracking event, used for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Build a signature from the parts of an event.
    ///
    /// Each part is lower-cased and whitespace-collapsed so cosmetic
    /// differences in the scraped page do not count as a new event.
    pub fn from_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let normalized: Vec<String> = parts
            .into_iter()
            .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
            .collect();
        Self(normalized.join("|"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Signature {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One scan row as reported by the carrier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSnapshot {
    /// Scan location (hub or city).
    #[serde(default)]
    pub location: String,
    /// Status text, e.g. "Shipment Picked Up" or "Delivered".
    pub details: String,
    /// Date as printed by the carrier.
    #[serde(default)]
    pub date: String,
    /// Time as printed by the carrier.
    #[serde(default)]
    pub time: String,
}

impl EventSnapshot {
    /// Signature of this event: details, date, time, location.
    pub fn signature(&self) -> Signature {
        Signature::from_parts([
            self.details.as_str(),
            self.date.as_str(),
            self.time.as_str(),
            self.location.as_str(),
        ])
    }
}

/// Normalized snapshot of a shipment's current tracking state.
///
/// Persisted only as a shipment's `pending_notification`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub shipment_id: Waybill,
    pub signature: Signature,
    pub label: String,
    pub is_terminal: bool,
    /// Raw scan row, kept so a retried notification renders the same way.
    pub snapshot: EventSnapshot,
}

impl EventDescriptor {
    /// Build a descriptor from a scan row.
    pub fn from_snapshot(shipment_id: Waybill, snapshot: EventSnapshot, is_terminal: bool) -> Self {
        Self {
            shipment_id,
            signature: snapshot.signature(),
            label: snapshot.details.trim().to_string(),
            is_terminal,
            snapshot,
        }
    }
}

// ── Shipment ────────────────────────────────────────────────────────

/// A tracked shipment, as stored on disk.
///
/// The waybill is the map key in the store file, so it is not repeated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    /// Description of the most recently committed event.
    #[serde(default)]
    pub status_label: Option<String>,
    /// Fingerprint of the most recently committed event.
    #[serde(default)]
    pub last_event_signature: Option<Signature>,
    /// When the waybill was first extracted from a message.
    pub discovered_at: DateTime<Utc>,
    /// Delivered and notified. Never reverts.
    #[serde(default)]
    pub terminal: bool,
    /// An event that was decided but not yet dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_notification: Option<EventDescriptor>,
    /// Last committed scan row, for humans reading the store file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event: Option<EventSnapshot>,
}

impl Shipment {
    /// A freshly discovered shipment with no known status.
    pub fn discovered(at: DateTime<Utc>) -> Self {
        Self {
            status_label: None,
            last_event_signature: None,
            discovered_at: at,
            terminal: false,
            pending_notification: None,
            last_event: None,
        }
    }

    /// Whether the orchestrator still has work for this shipment.
    pub fn is_active(&self) -> bool {
        !self.terminal || self.pending_notification.is_some()
    }
}

/// Partial update applied by [`crate::store::ShipmentStore::upsert`].
///
/// `None` leaves a field unchanged. `pending_notification` uses a nested
/// option: `Some(None)` clears it, `Some(Some(_))` sets it.
#[derive(Debug, Clone, Default)]
pub struct ShipmentPatch {
    pub status_label: Option<String>,
    pub last_event_signature: Option<Signature>,
    pub terminal: Option<bool>,
    pub pending_notification: Option<Option<EventDescriptor>>,
    pub last_event: Option<EventSnapshot>,
}

impl ShipmentPatch {
    /// Patch that commits a dispatched event: status, signature, terminal flag,
    /// and clears any pending notification.
    pub fn commit(event: &EventDescriptor) -> Self {
        Self {
            status_label: Some(event.label.clone()),
            last_event_signature: Some(event.signature.clone()),
            terminal: event.is_terminal.then_some(true),
            pending_notification: Some(None),
            last_event: Some(event.snapshot.clone()),
        }
    }

    /// Patch that defers an undispatched event. Status fields stay untouched.
    pub fn defer(event: &EventDescriptor) -> Self {
        Self {
            pending_notification: Some(Some(event.clone())),
            ..Self::default()
        }
    }

    /// Merge this patch into a shipment. A terminal flag is never cleared.
    pub fn apply(self, shipment: &mut Shipment) {
        if let Some(label) = self.status_label {
            shipment.status_label = Some(label);
        }
        if let Some(signature) = self.last_event_signature {
            shipment.last_event_signature = Some(signature);
        }
        if let Some(terminal) = self.terminal {
            shipment.terminal |= terminal;
        }
        if let Some(pending) = self.pending_notification {
            shipment.pending_notification = pending;
        }
        if let Some(event) = self.last_event {
            shipment.last_event = Some(event);
        }
    }
}
