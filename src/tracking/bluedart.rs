//! Blue Dart tracking page scraper.
//!
//! The public third-party tracking page renders one `div#SCAN<waybill>`
//! per shipment holding a table of scans, newest first. Only the first
//! row is read: location, details, date, time.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::SourceError;
use crate::html::{collapse_whitespace, strip_html};
use crate::shipment::{EventSnapshot, Waybill};
use crate::tracking::source::{RawEvent, StatusSource};

const TRACKING_URL: &str = "https://www.bluedart.com/trackdartresultthirdparty";
const USER_AGENT: &str = "Mozilla/5.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

static ROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").unwrap());
static CELL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").unwrap());
static DELIVERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bdelivered\b").unwrap());
static NOT_DELIVERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(not|un)[\s-]*delivered\b").unwrap());

/// Public page a human can open to follow a shipment.
pub fn tracking_url(waybill: &Waybill) -> String {
    format!("{TRACKING_URL}?trackFor=0&trackNo={waybill}")
}

/// Scrapes bluedart.com for the latest scan.
pub struct BlueDartSource {
    client: reqwest::Client,
}

impl BlueDartSource {
    pub fn new() -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusSource for BlueDartSource {
    fn name(&self) -> &str {
        "bluedart"
    }

    async fn fetch_latest(&self, waybill: &Waybill) -> Result<RawEvent, SourceError> {
        let url = tracking_url(waybill);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let html = response
            .text()
            .await
            .map_err(|e| SourceError::Unavailable(format!("reading body: {e}")))?;

        debug!(waybill = %waybill, bytes = html.len(), "Fetched tracking page");
        parse_latest_scan(&html, waybill)
    }
}

// ── Page parsing (public for testing) ───────────────────────────────

/// Pull the newest scan for `waybill` out of a tracking page.
pub fn parse_latest_scan(html: &str, waybill: &Waybill) -> Result<RawEvent, SourceError> {
    let section = scan_section(html, waybill)
        .ok_or_else(|| SourceError::Parse(format!("no SCAN{waybill} section")))?;

    let table_start = find_ci(section, "<table")
        .ok_or_else(|| SourceError::Parse("scan section has no table".into()))?;
    let table = &section[table_start..];
    let table = match find_ci(table, "</table>") {
        Some(end) => &table[..end],
        None => table,
    };
    let body_start = find_ci(table, "<tbody")
        .ok_or_else(|| SourceError::Parse("scan table has no tbody".into()))?;
    let body = &table[body_start..];

    let row = ROW
        .captures(body)
        .and_then(|c| c.get(1))
        .ok_or_else(|| SourceError::Parse("scan table has no rows".into()))?;

    let cells: Vec<String> = CELL
        .captures_iter(row.as_str())
        .filter_map(|c| c.get(1))
        .map(|m| cell_text(m.as_str()))
        .collect();

    let [location, details, date, time, ..] = cells.as_slice() else {
        return Err(SourceError::Parse(format!(
            "expected 4 cells in first scan row, found {}",
            cells.len()
        )));
    };

    let is_terminal = is_delivered(details);
    Ok(RawEvent {
        snapshot: EventSnapshot {
            location: location.clone(),
            details: details.clone(),
            date: date.clone(),
            time: time.clone(),
        },
        is_terminal,
    })
}

/// Whether a status text reports delivery to the consignee.
pub fn is_delivered(details: &str) -> bool {
    DELIVERED.is_match(details) && !NOT_DELIVERED.is_match(details)
}

/// Slice of the page starting at the `SCAN<waybill>` div.
fn scan_section<'a>(html: &'a str, waybill: &Waybill) -> Option<&'a str> {
    let id = format!("SCAN{waybill}");
    [format!("id=\"{id}\""), format!("id='{id}'"), format!("id={id}")]
        .iter()
        .find_map(|needle| html.find(needle.as_str()))
        .map(|pos| &html[pos..])
}

/// ASCII case-insensitive `find`.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Visible text of a table cell: tags dropped, entities decoded,
/// whitespace collapsed.
fn cell_text(html: &str) -> String {
    let decoded = strip_html(html)
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    collapse_whitespace(&decoded)
}
