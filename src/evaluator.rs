//! Event evaluator: decides whether a resolved event is news.
//!
//! Pure function, no side effects. Delivered wins over "new event" so a
//! shipment whose final transition was missed (or whose delivered event
//! was already seen but never committed) still gets its last notification.

use crate::shipment::{EventDescriptor, Shipment};

/// Outcome of comparing a stored shipment with a freshly resolved event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Same signature as last committed. Nothing to do.
    NoChange,
    /// A different event than last committed.
    NewEvent(EventDescriptor),
    /// The carrier reports delivery.
    Delivered(EventDescriptor),
}

impl Decision {
    /// The event to notify about, if any.
    pub fn into_event(self) -> Option<EventDescriptor> {
        match self {
            Decision::NoChange => None,
            Decision::NewEvent(ev) | Decision::Delivered(ev) => Some(ev),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::NoChange => "no_change",
            Decision::NewEvent(_) => "new_event",
            Decision::Delivered(_) => "delivered",
        }
    }
}

/// Decide what `descriptor` means for `shipment`.
pub fn evaluate(shipment: &Shipment, descriptor: EventDescriptor) -> Decision {
    if descriptor.is_terminal {
        return Decision::Delivered(descriptor);
    }
    match &shipment.last_event_signature {
        Some(sig) if *sig == descriptor.signature => Decision::NoChange,
        _ => Decision::NewEvent(descriptor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::shipment::{Signature, Waybill};

    fn descriptor(sig: &str, terminal: bool) -> EventDescriptor {
        EventDescriptor {
            shipment_id: Waybill::new("40512233198").unwrap(),
            signature: Signature::from(sig),
            label: if terminal { "Delivered" } else { "In Transit" }.into(),
            is_terminal: terminal,
            snapshot: Default::default(),
        }
    }

    fn shipment_with(sig: Option<&str>) -> Shipment {
        let mut s = Shipment::discovered(Utc::now());
        s.last_event_signature = sig.map(Signature::from);
        s
    }

    #[test]
    fn first_event_is_new() {
        let d = evaluate(&shipment_with(None), descriptor("S1", false));
        assert_eq!(d, Decision::NewEvent(descriptor("S1", false)));
    }

    #[test]
    fn same_signature_is_no_change() {
        let d = evaluate(&shipment_with(Some("S1")), descriptor("S1", false));
        assert_eq!(d, Decision::NoChange);
        assert!(d.into_event().is_none());
    }

    #[test]
    fn different_signature_is_new() {
        let d = evaluate(&shipment_with(Some("S1")), descriptor("S2", false));
        assert!(matches!(d, Decision::NewEvent(_)));
    }

    #[test]
    fn terminal_with_new_signature_is_delivered() {
        let d = evaluate(&shipment_with(Some("S1")), descriptor("S2", true));
        assert!(matches!(d, Decision::Delivered(_)));
    }

    #[test]
    fn terminal_with_same_signature_is_still_delivered() {
        let d = evaluate(&shipment_with(Some("S2")), descriptor("S2", true));
        assert_eq!(d.label(), "delivered");
        assert_eq!(d.into_event().map(|e| e.signature), Some(Signature::from("S2")));
    }

    #[test]
    fn terminal_on_first_sight_is_delivered() {
        let d = evaluate(&shipment_with(None), descriptor("S9", true));
        assert!(matches!(d, Decision::Delivered(_)));
    }
}
