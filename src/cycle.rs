//! One tracking cycle: the mailbox pass, then every active shipment.
//!
//! Per shipment, in order:
//! 1. A pending notification is retried first, and nothing else happens to
//!    that shipment this cycle. On failure it stays queued; nothing newer
//!    may overtake it.
//! 2. The latest event is resolved. Failures are logged and skipped.
//! 3. The evaluator decides. `NoChange` mutates nothing.
//! 4. A new or delivered event is dispatched, then committed on success or
//!    parked in `pending_notification` (and persisted at once) on failure.
//!
//! The store is persisted once more at the end. At most one notification
//! goes out per shipment per cycle. Only store failures abort a cycle;
//! everything else is isolated to the shipment it happened on.

use std::path::Path;

use tracing::{info, warn};

use crate::error::StoreError;
use crate::evaluator::evaluate;
use crate::mailbox::{MailboxSynchronizer, SyncReport};
use crate::notify::Notifier;
use crate::shipment::{EventDescriptor, ShipmentPatch, Waybill};
use crate::store::ShipmentStore;
use crate::tracking::StatusResolver;

/// Exit status of a cycle that finished with per-item failures.
pub const EXIT_PARTIAL: u8 = 2;

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub mailbox: SyncReport,
    /// Shipments whose status was resolved (successfully or not).
    pub polled: usize,
    pub unchanged: usize,
    /// Update notifications sent (delivered ones counted separately).
    pub notified: usize,
    /// Delivered notifications sent; these shipments are now terminal.
    pub delivered: usize,
    /// Pending notifications that went out on retry.
    pub retried: usize,
    /// Events parked in `pending_notification` this cycle.
    pub deferred: usize,
    pub resolve_failures: usize,
    pub dispatch_failures: usize,
}

impl CycleReport {
    /// True when every step of the cycle succeeded.
    pub fn is_clean(&self) -> bool {
        !self.mailbox.had_errors() && self.resolve_failures == 0 && self.dispatch_failures == 0
    }

    /// `0` for a clean cycle, [`EXIT_PARTIAL`] otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_clean() { 0 } else { EXIT_PARTIAL }
    }
}

/// Wires the synchronizer, resolver and notifier around one store.
pub struct TrackingCycle {
    synchronizer: MailboxSynchronizer,
    resolver: StatusResolver,
    notifier: Notifier,
}

impl TrackingCycle {
    pub fn new(synchronizer: MailboxSynchronizer, resolver: StatusResolver, notifier: Notifier) -> Self {
        Self {
            synchronizer,
            resolver,
            notifier,
        }
    }

    /// Load the store at `store_path` and run one cycle against it.
    ///
    /// A corrupt store is refused before any collaborator is touched.
    pub async fn run_at(&self, store_path: &Path) -> crate::error::Result<CycleReport> {
        let mut store = ShipmentStore::load(store_path).await?;
        Ok(self.run(&mut store).await?)
    }

    /// Run one cycle to completion.
    pub async fn run(&self, store: &mut ShipmentStore) -> Result<CycleReport, StoreError> {
        info!(known = store.len(), "--- Starting tracking cycle ---");

        let mut report = CycleReport {
            mailbox: self.synchronizer.sync(store).await?,
            ..CycleReport::default()
        };

        for waybill in store.active_ids() {
            self.track(store, &waybill, &mut report).await?;
        }

        store.persist().await?;

        info!(
            fetched = report.mailbox.fetched,
            discovered = report.mailbox.discovered.len(),
            polled = report.polled,
            unchanged = report.unchanged,
            notified = report.notified,
            delivered = report.delivered,
            retried = report.retried,
            deferred = report.deferred,
            resolve_failures = report.resolve_failures,
            dispatch_failures = report.dispatch_failures,
            "--- Tracking cycle finished ---"
        );
        Ok(report)
    }

    async fn track(
        &self,
        store: &mut ShipmentStore,
        waybill: &Waybill,
        report: &mut CycleReport,
    ) -> Result<(), StoreError> {
        let Some(pending) = store.get(waybill).and_then(|s| s.pending_notification.clone()) else {
            return self.poll(store, waybill, report).await;
        };

        info!(waybill = %waybill, status = %pending.label, "Retrying pending notification");
        match self.notifier.notify(&pending).await {
            Ok(()) => {
                store.upsert(waybill, ShipmentPatch::commit(&pending));
                report.retried += 1;
                if pending.is_terminal {
                    info!(waybill = %waybill, "Package has been delivered. Deactivating tracking");
                }
            }
            Err(e) => {
                warn!(waybill = %waybill, error = %e, "Pending notification failed again; will retry next cycle");
                report.dispatch_failures += 1;
            }
        }
        // Fresh polling waits for the next cycle.
        Ok(())
    }

    async fn poll(
        &self,
        store: &mut ShipmentStore,
        waybill: &Waybill,
        report: &mut CycleReport,
    ) -> Result<(), StoreError> {
        let Some(shipment) = store.get(waybill) else {
            return Ok(());
        };
        if shipment.terminal {
            return Ok(());
        }

        report.polled += 1;
        let descriptor = match self.resolver.resolve(waybill).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(waybill = %waybill, error = %e, "Could not fetch event, will retry next time");
                report.resolve_failures += 1;
                return Ok(());
            }
        };

        // The store was not touched while resolving.
        let Some(shipment) = store.get(waybill) else {
            return Ok(());
        };
        let decision = evaluate(shipment, descriptor);
        info!(waybill = %waybill, decision = decision.label(), "Evaluated tracking event");

        let Some(event) = decision.into_event() else {
            info!(
                waybill = %waybill,
                status = shipment.status_label.as_deref().unwrap_or_default(),
                "No new update"
            );
            report.unchanged += 1;
            return Ok(());
        };
        self.dispatch(store, event, report).await
    }

    async fn dispatch(
        &self,
        store: &mut ShipmentStore,
        event: EventDescriptor,
        report: &mut CycleReport,
    ) -> Result<(), StoreError> {
        let waybill = event.shipment_id.clone();
        match self.notifier.notify(&event).await {
            Ok(()) => {
                store.upsert(&waybill, ShipmentPatch::commit(&event));
                if event.is_terminal {
                    info!(waybill = %waybill, "Package has been delivered. Deactivating tracking");
                    report.delivered += 1;
                } else {
                    info!(waybill = %waybill, status = %event.label, "New update found");
                    report.notified += 1;
                }
                Ok(())
            }
            Err(e) => {
                warn!(
                    waybill = %waybill,
                    error = %e,
                    "Notification failed; queued for retry before further tracking"
                );
                store.upsert(&waybill, ShipmentPatch::defer(&event));
                report.dispatch_failures += 1;
                report.deferred += 1;
                store.persist().await
            }
        }
    }
}
