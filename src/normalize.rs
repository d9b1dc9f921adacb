use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{record_id, EventDate, EventRecord, RawListing, UNKNOWN_DATE};
use crate::scraping::base::clean_text;

pub const FREE_PRICE: &str = "Free";

const TITLE_KEYS: &[&str] = &["title", "name"];
const URL_KEYS: &[&str] = &["url", "link", "href"];
const DATE_KEYS: &[&str] = &["date", "when", "start"];
const PRICE_KEYS: &[&str] = &["price", "cost"];
const LOCATION_KEYS: &[&str] = &["location", "venue", "description"];
const IMAGE_KEYS: &[&str] = &["image_url", "image", "img"];

const WEEKDAYS: &[&str] = &[
    "mon", "monday", "tue", "tues", "tuesday", "wed", "wednesday", "thu", "thur", "thurs",
    "thursday", "fri", "friday", "sat", "saturday", "sun", "sunday",
];

static AMPM_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\.?").expect("valid am/pm regex")
});
static CLOCK_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("valid clock regex"));
static ISO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{1,2}):(\d{2}))?").expect("valid iso regex")
});
static ORDINAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("valid ordinal regex"));
static ZONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Z]{1,3}[SD]?T|(?:GMT|UTC)[+-]?\d*)$").expect("zone regex"));

const DATED_FORMATS: &[&str] = &[
    "%B %d %Y", "%b %d %Y", "%d %B %Y", "%d %b %Y", "%m/%d/%Y", "%m/%d/%y",
];
const YEARLESS_FORMATS: &[&str] = &["%B %d %Y", "%b %d %Y", "%d %B %Y", "%d %b %Y", "%m/%d %Y"];

/// Turns raw listings into canonical records relative to a fixed `today`.
#[derive(Clone, Copy, Debug)]
pub struct Normalizer {
    today: NaiveDate,
}

impl Normalizer {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Returns `None` when the listing has no usable title or url.
    pub fn normalize(&self, raw: &RawListing, source: &str) -> Option<EventRecord> {
        let title = match text_field(raw, TITLE_KEYS) {
            Some(title) => title,
            None => {
                debug!("skipping listing from {source}: missing title");
                return None;
            }
        };
        let url = match text_field(raw, URL_KEYS) {
            Some(url) => url,
            None => {
                debug!("skipping \"{title}\" from {source}: missing url");
                return None;
            }
        };

        let date = match text_field(raw, DATE_KEYS) {
            Some(text) => parse_event_date(&text, self.today),
            None => EventDate::Unknown { raw: String::new() },
        };
        let price = text_field(raw, PRICE_KEYS).unwrap_or_else(|| FREE_PRICE.to_string());
        let location = text_field(raw, LOCATION_KEYS).unwrap_or_default();
        let image_url = text_field(raw, IMAGE_KEYS)
            .filter(|value| has_http_scheme(value))
            .unwrap_or_default();

        Some(EventRecord {
            id: record_id(source, &url),
            title,
            date,
            price,
            location,
            image_url,
            url,
            source: source.to_string(),
        })
    }

    /// Normalizes a batch and reports how many listings were dropped.
    pub fn normalize_all(&self, raw: &[RawListing], source: &str) -> (Vec<EventRecord>, usize) {
        let records: Vec<EventRecord> = raw
            .iter()
            .filter_map(|listing| self.normalize(listing, source))
            .collect();
        let discarded = raw.len() - records.len();
        (records, discarded)
    }
}

fn text_field(raw: &RawListing, keys: &[&str]) -> Option<String> {
    let value = clean_text(raw.first_of(keys)?);
    if value.is_empty() || value.eq_ignore_ascii_case(UNKNOWN_DATE) {
        None
    } else {
        Some(value)
    }
}

fn has_http_scheme(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Best-effort parse of listing date text. Never fails: anything unreadable
/// comes back as `EventDate::Unknown` carrying the original text.
pub fn parse_event_date(text: &str, today: NaiveDate) -> EventDate {
    let cleaned = clean_text(text);
    let parsed = if cleaned.contains("Tomorrow") {
        today
            .succ_opt()
            .and_then(|tomorrow| on_day(tomorrow, &cleaned))
    } else if cleaned.contains("Today") {
        on_day(today, &cleaned)
    } else {
        parse_free_text(&cleaned, today)
    };
    parsed.unwrap_or(EventDate::Unknown { raw: cleaned })
}

/// Relative listings always carry a time; without one the text is unreadable.
fn on_day(day: NaiveDate, text: &str) -> Option<EventDate> {
    let time = find_time(text).or_else(|| last_token_time(text))?;
    Some(EventDate::At(NaiveDateTime::new(day, time)))
}

fn last_token_time(text: &str) -> Option<NaiveTime> {
    let token = text.split_whitespace().last()?.to_ascii_uppercase();
    ["%H:%M:%S", "%H:%M", "%I:%M%p", "%I%p", "%H%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&token, fmt).ok())
}

fn parse_free_text(text: &str, today: NaiveDate) -> Option<EventDate> {
    if let Some(caps) = ISO_RE.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        let time = match (caps.get(4), caps.get(5)) {
            (Some(h), Some(m)) => NaiveTime::from_hms_opt(
                h.as_str().parse().ok()?,
                m.as_str().parse().ok()?,
                0,
            ),
            _ => find_time(&text[caps.get(0)?.end()..]),
        };
        return Some(with_time(date, time));
    }

    let time = find_time(text);
    let date_text = date_portion(text);
    if date_text.is_empty() {
        return None;
    }
    let date = parse_calendar_date(&date_text, today)?;
    Some(with_time(date, time))
}

fn with_time(date: NaiveDate, time: Option<NaiveTime>) -> EventDate {
    match time {
        Some(time) => EventDate::At(NaiveDateTime::new(date, time)),
        None => EventDate::On(date),
    }
}

/// Strips separators, weekday names, clock times and zone labels, leaving
/// something like `June 15 2024` or `6/15/2024`.
fn date_portion(text: &str) -> String {
    let without_times = AMPM_TIME_RE.replace_all(text, " ");
    let without_times = CLOCK_TIME_RE.replace_all(&without_times, " ");
    let without_ordinals = ORDINAL_RE.replace_all(&without_times, "$1");
    let head = without_ordinals
        .split('+')
        .next()
        .unwrap_or_default()
        .replace(['•', '|', ',', '@', '-'], " ");

    head.split_whitespace()
        .map(|token| token.trim_end_matches('.'))
        .filter(|token| !token.is_empty())
        .filter(|token| !WEEKDAYS.contains(&token.to_lowercase().as_str()))
        .filter(|token| !token.eq_ignore_ascii_case("at"))
        .filter(|token| !ZONE_RE.is_match(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_calendar_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    for fmt in DATED_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, fmt) {
            return Some(date);
        }
    }

    // Listings rarely carry a year; take the first occurrence from today on.
    for fmt in YEARLESS_FORMATS {
        let this_year = format!("{input} {}", today.year());
        if let Ok(date) = NaiveDate::parse_from_str(&this_year, fmt) {
            if date >= today {
                return Some(date);
            }
            let next_year = format!("{input} {}", today.year() + 1);
            return NaiveDate::parse_from_str(&next_year, fmt).ok();
        }
    }

    None
}

pub fn find_time(text: &str) -> Option<NaiveTime> {
    if let Some(caps) = AMPM_TIME_RE.captures(text) {
        let hour = caps[1].parse::<u32>().ok()?;
        let minute = caps
            .get(2)
            .map(|m| m.as_str().parse::<u32>().unwrap_or(0))
            .unwrap_or(0);
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = caps[3].eq_ignore_ascii_case("p");
        let hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    let caps = CLOCK_TIME_RE.captures(text)?;
    NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> EventDate {
        EventDate::At(date(y, m, d).and_hms_opt(h, min, 0).expect("valid time"))
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(date(2024, 3, 1))
    }

    #[test]
    fn discards_listing_without_title() {
        let raw = RawListing::new().with("url", "x");
        assert!(normalizer().normalize(&raw, "src").is_none());
    }

    #[test]
    fn discards_listing_with_blank_title() {
        let raw = RawListing::new().with("title", "   ").with("url", "x");
        assert!(normalizer().normalize(&raw, "src").is_none());
        let raw = RawListing::new().with("title", "").with("url", "x");
        assert!(normalizer().normalize(&raw, "src").is_none());
    }

    #[test]
    fn discards_placeholder_title_and_missing_url() {
        let raw = RawListing::new().with("title", "N/A").with("url", "x");
        assert!(normalizer().normalize(&raw, "src").is_none());
        let raw = RawListing::new().with("title", "T").with("url", "  ");
        assert!(normalizer().normalize(&raw, "src").is_none());
    }

    #[test]
    fn fills_defaults_for_missing_fields() {
        let raw = RawListing::new().with("title", "T").with("url", "u");
        let record = normalizer().normalize(&raw, "src").expect("kept");
        assert_eq!(record.price, FREE_PRICE);
        assert_eq!(record.location, "");
        assert_eq!(record.image_url, "");
        assert_eq!(record.source, "src");
        assert_eq!(record.date, EventDate::Unknown { raw: String::new() });
    }

    #[test]
    fn trims_fields_and_maps_aliases() {
        let raw = RawListing::new()
            .with("name", "  Jazz   Night ")
            .with("link", " https://example.com/jazz ")
            .with("cost", " $15 ")
            .with("venue", " The Rex ")
            .with("img", "https://cdn.example.com/jazz.jpg");
        let record = normalizer().normalize(&raw, "src").expect("kept");
        assert_eq!(record.title, "Jazz Night");
        assert_eq!(record.url, "https://example.com/jazz");
        assert_eq!(record.price, "$15");
        assert_eq!(record.location, "The Rex");
        assert_eq!(record.image_url, "https://cdn.example.com/jazz.jpg");
    }

    #[test]
    fn drops_non_http_images() {
        for image in ["data:image/gif;base64,R0lGOD", "/img/a.png", "N/A"] {
            let raw = RawListing::new()
                .with("title", "T")
                .with("url", "u")
                .with("image_url", image);
            let record = normalizer().normalize(&raw, "src").expect("kept");
            assert!(!record.has_image(), "{image} should be dropped");
        }
    }

    #[test]
    fn counts_discards_in_batches() {
        let raw = vec![
            RawListing::new().with("title", "A").with("url", "u1"),
            RawListing::new().with("url", "u2"),
            RawListing::new().with("title", "C"),
        ];
        let (records, discarded) = normalizer().normalize_all(&raw, "src");
        assert_eq!(records.len(), 1);
        assert_eq!(discarded, 2);
    }

    #[test]
    fn tomorrow_uses_next_calendar_day() {
        let today = date(2024, 3, 1);
        assert_eq!(
            parse_event_date("Tomorrow 7:00 PM", today),
            at(2024, 3, 2, 19, 0)
        );
        assert_eq!(
            parse_event_date("Tomorrow at 19:30", today),
            at(2024, 3, 2, 19, 30)
        );
    }

    #[test]
    fn today_uses_current_day() {
        let today = date(2024, 3, 1);
        assert_eq!(parse_event_date("Today at 8pm", today), at(2024, 3, 1, 20, 0));
        assert_eq!(parse_event_date("Today 2130", today), at(2024, 3, 1, 21, 30));
    }

    #[test]
    fn relative_day_without_time_is_unknown() {
        let today = date(2024, 3, 1);
        for text in ["Tomorrow", "Tomorrow sometime-ish", "Today TBA", "Today"] {
            assert_eq!(
                parse_event_date(text, today),
                EventDate::Unknown {
                    raw: text.to_string()
                },
                "{text}"
            );
        }
    }

    #[test]
    fn parses_card_style_dates() {
        let today = date(2024, 6, 10);
        assert_eq!(
            parse_event_date("Sat, Jun 15, 7:00 PM", today),
            at(2024, 6, 15, 19, 0)
        );
        assert_eq!(
            parse_event_date("Friday, June 14 • 9:30 PM EDT", today),
            at(2024, 6, 14, 21, 30)
        );
        assert_eq!(
            parse_event_date("Sun, Jun 16, 2:00 PM + 3 more", today),
            at(2024, 6, 16, 14, 0)
        );
        assert_eq!(
            parse_event_date("June 15th, 2024", today),
            EventDate::On(date(2024, 6, 15))
        );
        assert_eq!(
            parse_event_date("6/15/2024 8 pm", today),
            at(2024, 6, 15, 20, 0)
        );
        assert_eq!(
            parse_event_date("2024-06-15T19:00:00", today),
            at(2024, 6, 15, 19, 0)
        );
    }

    #[test]
    fn yearless_dates_roll_into_next_year() {
        let today = date(2024, 12, 30);
        assert_eq!(
            parse_event_date("Fri, Jan 3", today),
            EventDate::On(date(2025, 1, 3))
        );
        assert_eq!(
            parse_event_date("Dec 31", today),
            EventDate::On(date(2024, 12, 31))
        );
    }

    #[test]
    fn unparseable_text_becomes_unknown() {
        let parsed = parse_event_date("sometime soon-ish", date(2024, 3, 1));
        assert_eq!(
            parsed,
            EventDate::Unknown {
                raw: "sometime soon-ish".to_string()
            }
        );
        assert!(!parsed.is_known());
    }

    #[test]
    fn finds_times_in_various_shapes() {
        assert_eq!(find_time("doors 7pm"), NaiveTime::from_hms_opt(19, 0, 0));
        assert_eq!(find_time("12:15 a.m."), NaiveTime::from_hms_opt(0, 15, 0));
        assert_eq!(find_time("noon-ish"), None);
    }
}
