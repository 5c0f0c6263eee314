use chrono::{DateTime, Utc};

use super::service::RewardError;

/// Parse an RFC 3339 timestamp or a string of epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RewardError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(raw, "timestamp is empty"));
    }

    if let Ok(millis) = trimmed.parse::<i64>() {
        return timestamp_from_millis(millis);
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| invalid(raw, &error.to_string()))
}

pub fn timestamp_from_millis(millis: i64) -> Result<DateTime<Utc>, RewardError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| invalid(&millis.to_string(), "outside the representable calendar"))
}

fn invalid(raw: &str, reason: &str) -> RewardError {
    RewardError::InvalidTimestamp {
        raw: raw.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accepts_offsets_and_normalises_to_utc() {
        let parsed = parse_timestamp("2025-03-10T01:30:00+02:00").expect("parses");
        let expected = Utc
            .with_ymd_and_hms(2025, 3, 9, 23, 30, 0)
            .single()
            .expect("valid");
        assert_eq!(parsed, expected);
    }

    #[test]
    fn accepts_epoch_millis() {
        let parsed = parse_timestamp("1741564800000").expect("parses");
        assert_eq!(parsed.timestamp_millis(), 1_741_564_800_000);
    }

    #[test]
    fn rejects_garbage_and_out_of_range_values() {
        for raw in ["", "NaN", "next tuesday", "2025-13-01T00:00:00Z"] {
            assert!(
                matches!(parse_timestamp(raw), Err(RewardError::InvalidTimestamp { .. })),
                "expected '{raw}' to be rejected"
            );
        }
        assert!(matches!(
            timestamp_from_millis(i64::MAX),
            Err(RewardError::InvalidTimestamp { .. })
        ));
    }
}
