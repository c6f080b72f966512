//! Waybill extraction from message text.
//!
//! Every maximal run of ASCII digits exactly 11 long is a candidate. Runs
//! that are longer (order numbers, phone numbers with country code, ...)
//! are rejected outright rather than sliced, and letters directly around a
//! run do not hide it (`AWB40512233198` still yields the waybill).
//!
//! Pure string scanning, no I/O.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::shipment::{WAYBILL_LEN, Waybill};

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

/// Extract the distinct waybill numbers mentioned in `text`.
pub fn extract_waybills(text: &str) -> BTreeSet<Waybill> {
    DIGIT_RUN
        .find_iter(text)
        .filter(|m| m.as_str().len() == WAYBILL_LEN)
        .filter_map(|m| Waybill::new(m.as_str()).ok())
        .collect()
}

/// Extract from a message's subject and body together.
pub fn extract_from_message(subject: &str, body: &str) -> BTreeSet<Waybill> {
    let mut found = extract_waybills(subject);
    found.extend(extract_waybills(body));
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(text: &str) -> Vec<String> {
        extract_waybills(text)
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn finds_waybill_in_sentence() {
        assert_eq!(
            ids("Your shipment 40512233198 has been picked up"),
            vec!["40512233198"]
        );
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(extract_waybills("").is_empty());
        assert!(extract_waybills("no numbers at all").is_empty());
    }

    #[test]
    fn rejects_longer_digit_runs() {
        assert!(extract_waybills("Order 123405122331980 confirmed").is_empty());
        assert!(extract_waybills("call +914051223319812").is_empty());
    }

    #[test]
    fn rejects_shorter_digit_runs() {
        assert!(extract_waybills("PIN 400001, ref 4051223319").is_empty());
    }

    #[test]
    fn finds_waybill_glued_to_letters_or_punctuation() {
        assert_eq!(ids("AWB40512233198"), vec!["40512233198"]);
        assert_eq!(ids("(#40512233198)."), vec!["40512233198"]);
        assert_eq!(ids("waybill:40512233198,"), vec!["40512233198"]);
    }

    #[test]
    fn separators_split_runs() {
        // Formatted with spaces, this is not one 11-digit run.
        assert!(extract_waybills("405 1223 3198").is_empty());
        assert_eq!(
            ids("40512233198-77788899900"),
            vec!["40512233198", "77788899900"]
        );
    }

    #[test]
    fn duplicates_collapse() {
        let text = "77788899900 and again 77788899900";
        assert_eq!(ids(text), vec!["77788899900"]);
    }

    #[test]
    fn results_are_sorted() {
        assert_eq!(
            ids("99999999999 then 11111111111"),
            vec!["11111111111", "99999999999"]
        );
    }

    #[test]
    fn ignores_non_ascii_digits() {
        assert!(extract_waybills("٤٠٥١٢٢٣٣١٩٨").is_empty());
    }

    #[test]
    fn subject_and_body_are_merged() {
        let found = extract_from_message("Shipped: 40512233198", "Also 77788899900, 40512233198");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn html_bodies_work_too() {
        let html = r#"<td class="awb">40512233198</td><a href="https://x?trackNo=40512233198">"#;
        assert_eq!(ids(html), vec!["40512233198"]);
    }
}
