//! HTML notification rendering.

use crate::html::escape_html;
use crate::shipment::EventDescriptor;
use crate::tracking::bluedart::tracking_url;

/// A rendered notification, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub html_body: String,
}

/// Subject line for an event.
pub fn subject_for(event: &EventDescriptor) -> String {
    if event.is_terminal {
        format!("✅ DELIVERED: Waybill {}", event.shipment_id)
    } else {
        format!("📦 Update for Waybill {}", event.shipment_id)
    }
}

/// Render the notification for an event.
pub fn render(event: &EventDescriptor) -> Notification {
    let snap = &event.snapshot;
    let html_body = format!(
        r#"<html>
<head>
<style>
  .container {{ font-family: Arial, sans-serif; max-width: 500px; margin: auto; padding: 20px;
               border: 1px solid #ddd; border-radius: 8px; background-color: #f9f9f9; color: #333; }}
  h2 {{ color: #2E86C1; }}
  .info {{ margin: 10px 0; padding: 10px; background-color: #fff; border-left: 4px solid #2E86C1;
          box-shadow: 0 2px 4px rgba(0,0,0,0.05); }}
  .label {{ font-weight: bold; display: inline-block; width: 80px; }}
  .track-link {{ display: inline-block; margin-top: 20px; padding: 10px 15px; background-color: #000000;
                color: white; text-decoration: none; border-radius: 5px; }}
  .footer {{ margin-top: 30px; font-size: 0.9em; color: #777; text-align: center; }}
</style>
</head>
<body>
<div class="container">
  <h2>{heading}</h2>
  <div class="info"><span class="label">Waybill:</span> {waybill}</div>
  <div class="info"><span class="label">Location:</span> {location}</div>
  <div class="info"><span class="label">Status:</span> {status}</div>
  <div class="info"><span class="label">Date:</span> {date}</div>
  <div class="info"><span class="label">Time:</span> {time}</div>
  <a href="{url}" class="track-link">🔍 Track Your Package</a>
  <div class="footer">Thank you for using HyTrack</div>
</div>
</body>
</html>
"#,
        heading = if event.is_terminal {
            "✅ Your Blue Dart Shipment Was Delivered"
        } else {
            "📦 New Blue Dart Tracking Update"
        },
        waybill = event.shipment_id,
        location = escape_html(&snap.location),
        status = escape_html(&event.label),
        date = escape_html(&snap.date),
        time = escape_html(&snap.time),
        url = escape_html(&tracking_url(&event.shipment_id)),
    );

    Notification {
        subject: subject_for(event),
        html_body,
    }
}
