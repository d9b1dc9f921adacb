use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::EventRecord;

/// How two records are judged to be the same event.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DedupePolicy {
    /// Trimmed, lowercased title only. Catches the same show listed by
    /// several sources with different links.
    #[default]
    TitleOnly,
    /// Every field except the derived `id` must match exactly.
    FullRecord,
}

pub const DEFAULT_DEDUPE_POLICY: DedupePolicy = DedupePolicy::TitleOnly;

impl FromStr for DedupePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "title" | "title-only" => Ok(DedupePolicy::TitleOnly),
            "full" | "full-record" => Ok(DedupePolicy::FullRecord),
            other => Err(format!("unknown dedupe policy: {other}")),
        }
    }
}

pub fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

fn identity(record: &EventRecord, policy: DedupePolicy) -> String {
    match policy {
        DedupePolicy::TitleOnly => title_key(&record.title),
        DedupePolicy::FullRecord => [
            record.title.clone(),
            record.url.clone(),
            format!("{:?}", record.date),
            record.price.clone(),
            record.location.clone(),
            record.image_url.clone(),
            record.source.clone(),
        ]
        .join("\u{1f}"),
    }
}

/// Drops later records whose identity was already seen; order is kept.
pub fn dedupe(records: Vec<EventRecord>, policy: DedupePolicy) -> Vec<EventRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(identity(record, policy)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{record_id, EventDate};

    fn record(title: &str, url: &str) -> EventRecord {
        EventRecord {
            id: record_id("src", url),
            title: title.to_string(),
            date: EventDate::Unknown { raw: String::new() },
            price: "Free".to_string(),
            location: String::new(),
            image_url: String::new(),
            url: url.to_string(),
            source: "src".to_string(),
        }
    }

    #[test]
    fn first_occurrence_wins_ignoring_case_and_whitespace() {
        let out = dedupe(
            vec![record("A", "u1"), record("a ", "u2")],
            DEFAULT_DEDUPE_POLICY,
        );
        assert_eq!(out, vec![record("A", "u1")]);
    }

    #[test]
    fn keeps_insertion_order() {
        let out = dedupe(
            vec![
                record("C", "u3"),
                record("A", "u1"),
                record("c", "u4"),
                record("B", "u2"),
            ],
            DedupePolicy::TitleOnly,
        );
        let titles: Vec<_> = out.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A", "B"]);
    }

    #[test]
    fn is_idempotent() {
        let input = vec![
            record("Jazz Night", "u1"),
            record("JAZZ NIGHT", "u2"),
            record("Comedy", "u3"),
            record("Comedy", "u3"),
        ];
        for policy in [DedupePolicy::TitleOnly, DedupePolicy::FullRecord] {
            let once = dedupe(input.clone(), policy);
            let twice = dedupe(once.clone(), policy);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn full_record_policy_keeps_distinct_urls() {
        let out = dedupe(
            vec![record("A", "u1"), record("a", "u2"), record("A", "u1")],
            DedupePolicy::FullRecord,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].url, "u2");
    }

    #[test]
    fn full_record_policy_compares_exact_fields() {
        let mut unknown = record("B", "u4");
        unknown.date = EventDate::Unknown {
            raw: "soon".to_string(),
        };
        let mut other_unknown = unknown.clone();
        other_unknown.date = EventDate::Unknown {
            raw: "later".to_string(),
        };
        let out = dedupe(
            vec![record("A", "u1"), record("a", "u1"), unknown, other_unknown],
            DedupePolicy::FullRecord,
        );
        let titles: Vec<_> = out.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "a", "B", "B"]);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(dedupe(Vec::new(), DEFAULT_DEDUPE_POLICY).is_empty());
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("title".parse::<DedupePolicy>(), Ok(DedupePolicy::TitleOnly));
        assert_eq!("full-record".parse::<DedupePolicy>(), Ok(DedupePolicy::FullRecord));
        assert!("fuzzy".parse::<DedupePolicy>().is_err());
    }
}
