//! Status resolver: turns a carrier's raw event into an [`EventDescriptor`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ResolveError, SourceError};
use crate::shipment::{EventDescriptor, Waybill};
use crate::tracking::source::StatusSource;

/// Wraps a [`StatusSource`] and normalizes what it returns.
pub struct StatusResolver {
    source: Arc<dyn StatusSource>,
}

impl StatusResolver {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self { source }
    }

    /// Resolve the current event for `waybill`.
    ///
    /// Never touches the store. A parse failure usually means the carrier
    /// changed its page, so it is logged at warn level on top of being
    /// returned.
    pub async fn resolve(&self, waybill: &Waybill) -> Result<EventDescriptor, ResolveError> {
        let raw = self
            .source
            .fetch_latest(waybill)
            .await
            .map_err(|e| match e {
                SourceError::Unavailable(reason) => ResolveError::Unavailable {
                    waybill: waybill.to_string(),
                    reason,
                },
                SourceError::Parse(reason) => {
                    warn!(
                        waybill = %waybill,
                        source = self.source.name(),
                        %reason,
                        "Tracking page format not recognised; the site may have changed"
                    );
                    ResolveError::Parse {
                        waybill: waybill.to_string(),
                        reason,
                    }
                }
            })?;

        if raw.snapshot.details.trim().is_empty() {
            warn!(waybill = %waybill, source = self.source.name(), "Tracking event has no status text");
            return Err(ResolveError::Parse {
                waybill: waybill.to_string(),
                reason: "empty status text".into(),
            });
        }

        let descriptor = EventDescriptor::from_snapshot(waybill.clone(), raw.snapshot, raw.is_terminal);
        debug!(
            waybill = %waybill,
            label = %descriptor.label,
            terminal = descriptor.is_terminal,
            "Resolved tracking event"
        );
        Ok(descriptor)
    }
}
