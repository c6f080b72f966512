//! Shipment status lookup: the carrier source and its normalizing resolver.

pub mod bluedart;
pub mod resolver;
pub mod source;

pub use bluedart::BlueDartSource;
pub use resolver::StatusResolver;
pub use source::{RawEvent, StatusSource};
