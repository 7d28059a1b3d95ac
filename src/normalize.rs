//! Maps JSON-LD records onto [`Event`].
//!
//! Missing or oddly typed fields never fail the event: strings fall back to
//! empty and unparseable dates to the Unix epoch.

use crate::error::NormalizeError;
use crate::types::{Event, RawStructuredRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

static DIGIT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit pattern is valid"));

/// Which of a page's records becomes the event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPolicy {
    /// Always the first record on the page
    FirstRecord,
    /// The first record whose `@type` is `Event` or a `*Event` subtype
    #[default]
    FirstEventTyped,
}

impl RecordPolicy {
    pub fn select<'a>(
        &self,
        records: &'a [RawStructuredRecord],
    ) -> Result<&'a RawStructuredRecord, NormalizeError> {
        if records.is_empty() {
            return Err(NormalizeError::NoRecords);
        }
        match self {
            RecordPolicy::FirstRecord => Ok(&records[0]),
            RecordPolicy::FirstEventTyped => records
                .iter()
                .find(|r| is_event_record(r))
                .ok_or(NormalizeError::NoEventRecord(records.len())),
        }
    }
}

fn is_event_type(t: &str) -> bool {
    let t = t.rsplit('/').next().unwrap_or(t);
    t.ends_with("Event")
}

fn is_event_record(record: &RawStructuredRecord) -> bool {
    match record.get("@type") {
        Some(Value::String(t)) => is_event_type(t),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(is_event_type),
        _ => false,
    }
}

/// Normalize with the default record policy.
pub fn normalize(
    records: &[RawStructuredRecord],
    source_url: &str,
) -> Result<Event, NormalizeError> {
    normalize_with(records, source_url, RecordPolicy::default())
}

pub fn normalize_with(
    records: &[RawStructuredRecord],
    source_url: &str,
    policy: RecordPolicy,
) -> Result<Event, NormalizeError> {
    let record = policy.select(records)?;

    Ok(Event {
        id: event_id_from_url(source_url),
        name: str_field(record, "name").to_string(),
        description: str_field(record, "description").to_string(),
        start: parse_datetime(str_field(record, "startDate")).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        end: parse_datetime(str_field(record, "endDate")).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        location: location_from_record(record),
        url: str_field(record, "url").to_string(),
        source_url: source_url.to_string(),
        stamp: Utc::now(),
    })
}

fn str_field<'a>(value: &'a serde_json::Map<String, Value>, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

/// First run of digits in the URL's path and query, or empty. Host and port
/// never contribute. Input that isn't an absolute URL is scanned as a whole.
pub fn event_id_from_url(url: &str) -> String {
    let haystack = match Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    };
    DIGIT_RUN_RE
        .find(&haystack)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Venue, street, locality, postal code and country joined with `", "`.
/// Empty parts stay as empty segments.
pub fn format_location(
    name: &str,
    street: &str,
    locality: &str,
    postal_code: &str,
    country: &str,
) -> String {
    format!("{name}, {street}, {locality}, {postal_code}, {country}")
}

fn location_from_record(record: &RawStructuredRecord) -> String {
    let location = match record.get("location") {
        Some(Value::Array(items)) => items.first(),
        other => other,
    };

    match location {
        Some(Value::String(name)) => format_location(name, "", "", "", ""),
        Some(Value::Object(place)) => {
            let name = str_field(place, "name");
            match place.get("address") {
                Some(Value::Object(address)) => format_location(
                    name,
                    str_field(address, "streetAddress"),
                    str_field(address, "addressLocality"),
                    str_field(address, "postalCode"),
                    country_name(address.get("addressCountry")),
                ),
                Some(Value::String(street)) => format_location(name, street, "", "", ""),
                _ => format_location(name, "", "", "", ""),
            }
        }
        _ => format_location("", "", "", "", ""),
    }
}

/// `addressCountry` is either a string or a `Country` object with a name.
fn country_name(value: Option<&Value>) -> &str {
    match value {
        Some(Value::String(s)) => s,
        Some(Value::Object(country)) => str_field(country, "name"),
        _ => "",
    }
}

const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M:%S%z",
];

const NAIVE_DATETIME_FORMATS: [&str; 9] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
    "%B %d, %Y %H:%M",
];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"];

/// Permissive date parser. Values without an offset are read as UTC.
pub fn parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ndt.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
        }
    }
    if s.chars().all(|c| c.is_ascii_digit()) {
        let n: i64 = s.parse().ok()?;
        // Millisecond timestamps are 13 digits for any date after 2001
        return if s.len() >= 13 {
            DateTime::from_timestamp_millis(n)
        } else {
            DateTime::from_timestamp(n, 0)
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawStructuredRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_event_id_from_url() {
        assert_eq!(event_id_from_url("https://site/events/123456789/"), "123456789");
        assert_eq!(event_id_from_url("https://site/events/none/"), "");
        assert_eq!(event_id_from_url("https://site/events/12/?ref=34"), "12");
    }

    #[test]
    fn test_event_id_ignores_digits_in_host_and_port() {
        assert_eq!(event_id_from_url("http://127.0.0.1:8080/events/111/"), "111");
        assert_eq!(event_id_from_url("https://m2.example.com:443/events/42"), "42");
        assert_eq!(event_id_from_url("http://127.0.0.1:8080/about"), "");

        assert_eq!(event_id_from_url("http://10.0.0.2/event.php?id=77"), "77");

        let records = vec![record(json!({"@type": "Event", "name": "Gig"}))];
        let event = normalize(&records, "http://127.0.0.1:8080/events/111/").unwrap();
        assert_eq!(event.id, "111");
    }

    #[test]
    fn test_format_location() {
        assert_eq!(
            format_location("Venue", "1 Main St", "Town", "AB1", "UK"),
            "Venue, 1 Main St, Town, AB1, UK"
        );
        assert_eq!(format_location("", "", "", "", ""), ", , , , ");
    }

    #[test]
    fn test_empty_records_is_no_records() {
        assert_eq!(
            normalize(&[], "https://site/events/1/").unwrap_err(),
            NormalizeError::NoRecords
        );
    }

    #[test]
    fn test_full_record() {
        let records = vec![record(json!({
            "@context": "http://schema.org",
            "@type": "Event",
            "name": "Gig",
            "description": "Loud music",
            "url": "https://www.facebook.com/events/111/",
            "startDate": "2024-05-01T20:00:00+01:00",
            "endDate": "2024-05-01T23:00:00+01:00",
            "location": {
                "@type": "Place",
                "name": "Venue",
                "address": {
                    "@type": "PostalAddress",
                    "streetAddress": "1 Main St",
                    "addressLocality": "Town",
                    "postalCode": "AB1",
                    "addressCountry": "UK"
                }
            }
        }))];

        let before = Utc::now();
        let event = normalize(&records, "https://www.facebook.com/events/111/").unwrap();
        assert_eq!(event.id, "111");
        assert_eq!(event.name, "Gig");
        assert_eq!(event.description, "Loud music");
        assert_eq!(event.url, "https://www.facebook.com/events/111/");
        assert_eq!(event.location, "Venue, 1 Main St, Town, AB1, UK");
        assert_eq!(event.start, Utc.with_ymd_and_hms(2024, 5, 1, 19, 0, 0).unwrap());
        assert_eq!(event.end, Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap());
        assert!(event.stamp >= before);
    }

    #[test]
    fn test_missing_fields_become_empty() {
        let records = vec![record(json!({"@type": "Event"}))];
        let event = normalize(&records, "https://site/events/5/").unwrap();
        assert_eq!(event.name, "");
        assert_eq!(event.description, "");
        assert_eq!(event.url, "");
        assert_eq!(event.location, ", , , , ");
        assert_eq!(event.start, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(event.end, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_id_comes_from_source_url_not_record() {
        let records = vec![record(json!({
            "@type": "Event",
            "url": "https://www.facebook.com/events/999/"
        }))];
        let event = normalize(&records, "https://mbasic.facebook.com/events/111").unwrap();
        assert_eq!(event.id, "111");
    }

    #[test]
    fn test_unparseable_dates_fall_back_to_epoch() {
        let records = vec![record(json!({
            "@type": "Event",
            "name": "Sometime",
            "startDate": "next tuesday-ish",
            "endDate": 42
        }))];
        let event = normalize(&records, "https://site/events/7/").unwrap();
        assert_eq!(event.name, "Sometime");
        assert_eq!(event.start, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(event.end, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_policy_first_event_typed_skips_other_schemas() {
        let records = vec![
            record(json!({"@type": "Organization", "name": "Org"})),
            record(json!({"@type": "MusicEvent", "name": "Show"})),
        ];
        let event = normalize_with(&records, "u/1", RecordPolicy::FirstEventTyped).unwrap();
        assert_eq!(event.name, "Show");

        let event = normalize_with(&records, "u/1", RecordPolicy::FirstRecord).unwrap();
        assert_eq!(event.name, "Org");
    }

    #[test]
    fn test_policy_without_event_record() {
        let records = vec![record(json!({"@type": "WebPage"}))];
        assert_eq!(
            normalize_with(&records, "u/1", RecordPolicy::FirstEventTyped).unwrap_err(),
            NormalizeError::NoEventRecord(1)
        );
    }

    #[test]
    fn test_event_type_variants() {
        assert!(is_event_record(&record(json!({"@type": "Event"}))));
        assert!(is_event_record(&record(json!({"@type": "http://schema.org/SocialEvent"}))));
        assert!(is_event_record(&record(json!({"@type": ["Thing", "Event"]}))));
        assert!(!is_event_record(&record(json!({"@type": "Place"}))));
        assert!(!is_event_record(&record(json!({"name": "untyped"}))));
    }

    #[test]
    fn test_location_shapes() {
        let as_string = record(json!({"location": "The Pub"}));
        assert_eq!(location_from_record(&as_string), "The Pub, , , , ");

        let street_string = record(json!({"location": {"name": "Hall", "address": "2 High St"}}));
        assert_eq!(location_from_record(&street_string), "Hall, 2 High St, , , ");

        let country_object = record(json!({"location": [{
            "name": "Club",
            "address": {"addressLocality": "Leeds", "addressCountry": {"name": "GB"}}
        }]}));
        assert_eq!(location_from_record(&country_object), "Club, , Leeds, , GB");
    }

    #[test]
    fn test_parse_datetime_formats() {
        let eight_pm = Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-05-01T20:00"), Some(eight_pm));
        assert_eq!(parse_datetime("2024-05-01T20:00:00"), Some(eight_pm));
        assert_eq!(parse_datetime("2024-05-01T20:00:00Z"), Some(eight_pm));
        assert_eq!(parse_datetime("2024-05-01T21:00:00+0100"), Some(eight_pm));
        assert_eq!(parse_datetime("2024-05-01 20:00"), Some(eight_pm));
        assert_eq!(parse_datetime("05/01/2024 8:00 PM"), Some(eight_pm));
        assert_eq!(parse_datetime("Wed, 01 May 2024 20:00:00 +0000"), Some(eight_pm));
        assert_eq!(parse_datetime("1714593600"), Some(eight_pm));
        assert_eq!(parse_datetime("1714593600000"), Some(eight_pm));

        let midnight = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-05-01"), Some(midnight));
        assert_eq!(parse_datetime("May 1, 2024"), Some(midnight));

        assert_eq!(parse_datetime(""), None);
        assert_eq!(parse_datetime("soon"), None);
    }
}
