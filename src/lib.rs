//! HyTrack: parcel tracking from shipment emails.
//!
//! Waybill numbers found in unread mail are tracked against the carrier's
//! site until delivery, with one email per new tracking event.

pub mod config;
pub mod cycle;
pub mod error;
pub mod evaluator;
pub mod extract;
pub mod html;
pub mod logging;
pub mod mailbox;
pub mod notify;
pub mod shipment;
pub mod store;
pub mod tracking;

pub use cycle::{CycleReport, TrackingCycle};
pub use store::ShipmentStore;
