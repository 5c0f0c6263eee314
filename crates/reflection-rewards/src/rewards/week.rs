use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// ISO-8601 calendar week (Monday start), rendered as `<year>-W<week>`.
///
/// Field order gives the derived ordering: year first, then week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekId {
    year: i32,
    week: u8,
}

impl WeekId {
    pub fn new(year: i32, week: u8) -> Result<Self, WeekIdError> {
        let calendar = NaiveDate::MIN.year()..=NaiveDate::MAX.year();
        if !calendar.contains(&year) || week == 0 || week > weeks_in_year(year) {
            return Err(WeekIdError::OutOfRange { year, week });
        }
        Ok(Self { year, week })
    }

    /// Week containing `timestamp`, evaluated in UTC.
    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self::from_date(timestamp.date_naive())
    }

    /// Week containing `timestamp` on the wall clock of `offset`.
    pub fn from_timestamp_in(timestamp: DateTime<Utc>, offset: FixedOffset) -> Self {
        let utc = timestamp.naive_utc();
        let local = utc
            .checked_add_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
            .unwrap_or(utc);
        Self::from_date(local.date())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            // iso weeks are always within 1..=53
            week: iso.week() as u8,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u8 {
        self.week
    }

    /// The week immediately before this one. Week 1 steps back to the real
    /// last week of the previous ISO year, which is either 52 or 53.
    pub fn predecessor(&self) -> Self {
        if self.week > 1 {
            Self {
                year: self.year,
                week: self.week - 1,
            }
        } else {
            let year = self.year - 1;
            Self {
                year,
                week: weeks_in_year(year),
            }
        }
    }

    pub fn successor(&self) -> Self {
        if self.week < weeks_in_year(self.year) {
            Self {
                year: self.year,
                week: self.week + 1,
            }
        } else {
            Self {
                year: self.year + 1,
                week: 1,
            }
        }
    }

    /// Monday that opens the week, when chrono can represent it.
    pub fn monday(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.year, u32::from(self.week), Weekday::Mon)
    }

    /// Signed number of weeks from `self` to `later`.
    pub fn weeks_until(&self, later: &WeekId) -> Option<i64> {
        let start = self.monday()?;
        let end = later.monday()?;
        Some((end - start).num_weeks())
    }
}

/// Number of ISO weeks in `year`: 53 when the year starts on a Thursday, or
/// is a leap year starting on a Wednesday; 52 otherwise.
pub fn weeks_in_year(year: i32) -> u8 {
    fn dec31_weekday(year: i64) -> i64 {
        (year + year.div_euclid(4) - year.div_euclid(100) + year.div_euclid(400)).rem_euclid(7)
    }

    let year = i64::from(year);
    if dec31_weekday(year) == 4 || dec31_weekday(year - 1) == 3 {
        53
    } else {
        52
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekId {
    type Err = WeekIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (year, week) = trimmed
            .rsplit_once("-W")
            .ok_or_else(|| WeekIdError::Malformed(trimmed.to_string()))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| WeekIdError::Malformed(trimmed.to_string()))?;
        if week.len() != 2 || !week.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(WeekIdError::Malformed(trimmed.to_string()));
        }
        let week = week
            .parse::<u8>()
            .map_err(|_| WeekIdError::Malformed(trimmed.to_string()))?;
        Self::new(year, week)
    }
}

impl Serialize for WeekId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeekIdError {
    #[error("'{0}' is not a week identifier of the form YYYY-Www")]
    Malformed(String),
    #[error("week {week} does not exist in ISO year {year}")]
    OutOfRange { year: i32, week: u8 },
}
