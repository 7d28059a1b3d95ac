//! In-memory calendar plus its iCalendar rendering.

use crate::error::Result;
use crate::types::Event;
use icalendar::{Calendar as IcsCalendar, Component, Event as IcsEvent, EventLike, Property};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// The iCalendar `METHOD` of the feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarMethod {
    Publish,
    #[default]
    Request,
}

impl CalendarMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarMethod::Publish => "PUBLISH",
            CalendarMethod::Request => "REQUEST",
        }
    }
}

/// Events in the order they were discovered. No dedup happens here.
#[derive(Debug, Clone, Default)]
pub struct Calendar {
    pub name: Option<String>,
    pub method: CalendarMethod,
    events: Vec<Event>,
}

impl Calendar {
    pub fn new(method: CalendarMethod) -> Self {
        Self {
            name: None,
            method,
            events: Vec::new(),
        }
    }

    pub fn named(name: impl Into<String>, method: CalendarMethod) -> Self {
        Self {
            name: Some(name.into()),
            method,
            events: Vec::new(),
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Render as RFC 5545 text.
    pub fn to_ics(&self) -> String {
        let mut calendar = IcsCalendar::new();
        calendar.append_property(Property::new("METHOD", self.method.as_str()));
        if let Some(name) = &self.name {
            calendar.name(name);
        }
        for event in &self.events {
            calendar.push(to_ics_event(event));
        }
        calendar.done().to_string()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_ics())?;
        info!(path = %path.display(), events = self.len(), "wrote calendar");
        Ok(())
    }
}

fn to_ics_event(event: &Event) -> IcsEvent {
    IcsEvent::new()
        .uid(&event.id)
        .summary(&event.name)
        .description(&event.description)
        .location(&event.location)
        .add_property("URL", event.feed_url())
        .starts(event.start)
        .ends(event.end)
        .timestamp(event.stamp)
        .done()
}

/// `<dir>/<page>.ics`, with anything outside `[A-Za-z0-9_-]` replaced.
pub fn page_calendar_path(dir: &Path, page: &str) -> PathBuf {
    let stem: String = page
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(page)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "page".to_string() } else { stem };
    dir.join(format!("{stem}.ics"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn gig() -> Event {
        Event {
            id: "111".into(),
            name: "Gig".into(),
            description: "Loud".into(),
            start: Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap(),
            location: "Venue, 1 Main St, Town, AB1, UK".into(),
            url: String::new(),
            source_url: "https://www.facebook.com/events/111/".into(),
            stamp: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_calendar_keeps_order_and_duplicates() {
        let mut calendar = Calendar::new(CalendarMethod::Request);
        let mut other = gig();
        other.name = "Other".into();
        calendar.push(gig());
        calendar.push(other);
        calendar.push(gig());
        let names: Vec<_> = calendar.events().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Gig", "Other", "Gig"]);
    }

    #[test]
    fn test_to_ics_populates_fields() {
        let mut calendar = Calendar::named("examplepage", CalendarMethod::Request);
        calendar.push(gig());
        let ics = calendar.to_ics();

        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(ics.contains("METHOD:REQUEST"));
        assert!(ics.contains("BEGIN:VEVENT"));
        assert!(ics.contains("UID:111"));
        assert!(ics.contains("SUMMARY:Gig"));
        assert!(ics.contains("DTSTART:20240501T200000Z"));
        assert!(ics.contains("DTEND:20240501T230000Z"));
        assert!(ics.contains("DTSTAMP:20240401T000000Z"));
        assert!(ics.contains("URL:https://www.facebook.com/events/111/"));
    }

    #[test]
    fn test_empty_calendar_renders() {
        let ics = Calendar::new(CalendarMethod::Publish).to_ics();
        assert!(ics.contains("METHOD:PUBLISH"));
        assert!(!ics.contains("BEGIN:VEVENT"));
    }

    #[test]
    fn test_write_to_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("calendar.ics");
        let mut calendar = Calendar::new(CalendarMethod::Request);
        calendar.push(gig());
        calendar.write_to(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("SUMMARY:Gig"));
    }

    #[test]
    fn test_page_calendar_path() {
        let dir = Path::new("out");
        assert_eq!(page_calendar_path(dir, "examplepage"), dir.join("examplepage.ics"));
        assert_eq!(
            page_calendar_path(dir, "https://www.facebook.com/my.page/"),
            dir.join("my_page.ics")
        );
    }
}
