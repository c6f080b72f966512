//! Status source trait: where the latest tracking event comes from.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::shipment::{EventSnapshot, Waybill};

/// Latest event for a waybill as reported by a carrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub snapshot: EventSnapshot,
    /// The carrier considers the shipment delivered.
    pub is_terminal: bool,
}

/// A carrier tracking backend.
///
/// Implementations either return a complete event or fail; they never
/// return a half-filled one.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Fetch the most recent scan for `waybill`.
    async fn fetch_latest(&self, waybill: &Waybill) -> Result<RawEvent, SourceError>;
}
