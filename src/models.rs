use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Placeholder rendered for a date that could not be resolved.
pub const UNKNOWN_DATE: &str = "N/A";

/// Friday through Sunday span targeted by a single run.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn from_friday(friday: NaiveDate) -> Self {
        Self {
            start: friday,
            end: friday + Duration::days(2),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Whatever a collector managed to pull out of one listing card.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RawListing {
    fields: BTreeMap<String, String>,
}

impl RawListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// First present value among `keys`, in order.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EventDate {
    At(NaiveDateTime),
    On(NaiveDate),
    Unknown { raw: String },
}

impl EventDate {
    pub fn day(&self) -> Option<NaiveDate> {
        match self {
            EventDate::At(dt) => Some(dt.date()),
            EventDate::On(date) => Some(*date),
            EventDate::Unknown { .. } => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventDate::Unknown { .. })
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventDate::At(dt) => write!(f, "{}", dt.format("%a %b %-d, %Y %-I:%M %p")),
            EventDate::On(date) => write!(f, "{}", date.format("%a %b %-d, %Y")),
            EventDate::Unknown { .. } => f.write_str(UNKNOWN_DATE),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventRecord {
    pub id: String, // stable hash: source|url
    pub title: String,
    pub date: EventDate,
    pub price: String,
    pub location: String,
    pub image_url: String,
    pub url: String,
    pub source: String,
}

impl EventRecord {
    pub fn has_image(&self) -> bool {
        !self.image_url.is_empty()
    }
}

pub fn record_id(source: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_spans_three_days() {
        let friday = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let window = DateWindow::from_friday(friday);
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2024, 6, 16).unwrap());
        assert!(window.contains(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2024, 6, 17).unwrap()));
        assert_eq!(window.to_string(), "2024-06-14 to 2024-06-16");
    }

    #[test]
    fn raw_listing_prefers_first_alias() {
        let raw = RawListing::new()
            .with("link", "https://b.example")
            .with("url", "https://a.example");
        assert_eq!(raw.first_of(&["url", "link"]), Some("https://a.example"));
        assert_eq!(raw.first_of(&["href"]), None);
    }

    #[test]
    fn unknown_date_displays_placeholder() {
        let date = EventDate::Unknown {
            raw: "sometime".to_string(),
        };
        assert_eq!(date.to_string(), UNKNOWN_DATE);
        assert_eq!(date.day(), None);
    }

    #[test]
    fn record_id_is_stable() {
        let a = record_id("eventbrite/music", "https://example.com/e/1");
        let b = record_id("eventbrite/music", "https://example.com/e/1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, record_id("eventbrite/music", "https://example.com/e/2"));
    }
}
