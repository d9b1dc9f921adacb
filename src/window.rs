use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::DateWindow;

const FRIDAY_FROM_MONDAY: i64 = 4;

/// Which weekend a run targets.
///
/// `Nearest` picks the first Friday on or after today, so a run on a Friday
/// targets that same weekend. `NextWeek` always skips one more week ahead.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WeekendPolicy {
    #[default]
    Nearest,
    NextWeek,
}

impl FromStr for WeekendPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "nearest" => Ok(WeekendPolicy::Nearest),
            "next-week" | "next_week" | "nextweek" => Ok(WeekendPolicy::NextWeek),
            other => Err(format!("unknown weekend policy: {other}")),
        }
    }
}

impl fmt::Display for WeekendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeekendPolicy::Nearest => f.write_str("nearest"),
            WeekendPolicy::NextWeek => f.write_str("next-week"),
        }
    }
}

pub fn days_until_friday(today: NaiveDate) -> i64 {
    let weekday = i64::from(today.weekday().num_days_from_monday());
    (FRIDAY_FROM_MONDAY - weekday).rem_euclid(7)
}

/// Dates too close to the end of the calendar clamp to its last complete
/// weekend.
pub fn resolve(today: NaiveDate, policy: WeekendPolicy) -> DateWindow {
    let mut offset = days_until_friday(today);
    if policy == WeekendPolicy::NextWeek {
        offset += 7;
    }
    let friday = today
        .checked_add_signed(Duration::days(offset))
        .filter(|friday| friday.checked_add_signed(Duration::days(2)).is_some())
        .unwrap_or_else(last_representable_friday);
    DateWindow::from_friday(friday)
}

fn last_representable_friday() -> NaiveDate {
    let back_to_sunday = i64::from(NaiveDate::MAX.weekday().num_days_from_sunday());
    NaiveDate::MAX - Duration::days(back_to_sunday + 2)
}
