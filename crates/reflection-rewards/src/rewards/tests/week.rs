use chrono::{NaiveDate, TimeZone, Utc};

use super::common::week;
use crate::rewards::week::{weeks_in_year, WeekId, WeekIdError};

#[test]
fn predecessor_of_first_week_uses_the_real_length_of_the_previous_year() {
    assert_eq!(weeks_in_year(2025), 52);
    assert_eq!(week("2026-W01").predecessor(), week("2025-W52"));
    assert_eq!(weeks_in_year(2020), 53);
    assert_eq!(week("2021-W01").predecessor(), week("2020-W53"));
}

#[test]
fn successor_rolls_over_after_the_last_week() {
    assert_eq!(week("2026-W53").successor(), week("2027-W01"));
    assert_eq!(week("2025-W52").successor(), week("2026-W01"));
    assert_eq!(week("2025-W10").successor(), week("2025-W11"));
}

#[test]
fn late_december_dates_can_belong_to_the_next_iso_year() {
    let date = NaiveDate::from_ymd_opt(2025, 12, 29).expect("valid date");
    assert_eq!(WeekId::from_date(date), week("2026-W01"));

    let early_january = NaiveDate::from_ymd_opt(2021, 1, 3).expect("valid date");
    assert_eq!(WeekId::from_date(early_january), week("2020-W53"));
}

#[test]
fn offset_moves_the_week_boundary() {
    // Sunday 23:30 UTC is already Monday in UTC+01:00.
    let timestamp = Utc
        .with_ymd_and_hms(2025, 3, 9, 23, 30, 0)
        .single()
        .expect("valid timestamp");
    let plus_one = chrono::FixedOffset::east_opt(3600).expect("valid offset");

    assert_eq!(WeekId::from_timestamp(timestamp), week("2025-W10"));
    assert_eq!(
        WeekId::from_timestamp_in(timestamp, plus_one),
        week("2025-W11")
    );
}

#[test]
fn text_form_round_trips_and_rejects_garbage() {
    assert_eq!(week("2025-W03").to_string(), "2025-W03");
    assert!(matches!(
        "2025-3".parse::<WeekId>(),
        Err(WeekIdError::Malformed(_))
    ));
    assert!(matches!(
        "2025-W3".parse::<WeekId>(),
        Err(WeekIdError::Malformed(_))
    ));
    assert_eq!(
        "2025-W53".parse::<WeekId>(),
        Err(WeekIdError::OutOfRange {
            year: 2025,
            week: 53
        })
    );
    assert!(WeekId::new(2025, 0).is_err());
}

#[test]
fn years_outside_the_calendar_are_rejected() {
    assert!(matches!(
        "2000000000-W01".parse::<WeekId>(),
        Err(WeekIdError::OutOfRange { .. })
    ));
    assert!(WeekId::new(i32::MIN, 1).is_err());
    assert!(WeekId::new(i32::MAX, 52).is_err());
    assert!((52..=53).contains(&weeks_in_year(i32::MAX)));
    assert!(serde_json::from_str::<WeekId>("\"-2000000000-W10\"").is_err());
}

#[test]
fn week_digits_must_be_plain_digits() {
    for raw in ["2025-W+1", "2025-W 1", "2025-W-1"] {
        assert!(
            matches!(raw.parse::<WeekId>(), Err(WeekIdError::Malformed(_))),
            "{raw}"
        );
    }
}

#[test]
fn ordering_follows_the_calendar() {
    assert!(week("2024-W52") < week("2025-W01"));
    assert!(week("2025-W09") < week("2025-W10"));
    assert_eq!(week("2025-W11").weeks_until(&week("2025-W14")), Some(3));
}

#[test]
fn serializes_as_plain_text() {
    let json = serde_json::to_string(&week("2026-W05")).expect("serializes");
    assert_eq!(json, "\"2026-W05\"");
    let parsed: WeekId = serde_json::from_str(&json).expect("deserializes");
    assert_eq!(parsed, week("2026-W05"));
}
