//! Calendar-date parsing shared by the normalizer, the store and tool inputs.

use chrono::{Days, NaiveDate};
use thiserror::Error;

pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Error returned when a date string is not a usable `YYYY-MM-DD` calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateParseError {
    #[error("expected YYYY-MM-DD, got '{0}'")]
    Shape(String),
    #[error("'{0}' is not a valid calendar date")]
    Calendar(String),
}

fn has_iso_date_shape(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| {
            if index == 4 || index == 7 {
                *byte == b'-'
            } else {
                byte.is_ascii_digit()
            }
        })
}

/// Parses a strict `YYYY-MM-DD` string.
pub fn parse_iso_date(raw: &str) -> Result<NaiveDate, DateParseError> {
    if !has_iso_date_shape(raw) {
        return Err(DateParseError::Shape(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, ISO_DATE_FORMAT)
        .map_err(|_| DateParseError::Calendar(raw.to_string()))
}

/// Parses a date that may carry a time component (`2025-11-22T06:00:00Z`),
/// keeping only the calendar date.
pub fn date_only(raw: &str) -> Result<NaiveDate, DateParseError> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split_once(['T', ' '])
        .map(|(date, _)| date)
        .unwrap_or(trimmed);
    parse_iso_date(date_part)
}

pub fn format_iso_date(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

/// Returns the last `days` calendar dates ending at `today`, newest first.
pub fn recent_dates(days: usize, today: NaiveDate) -> Vec<NaiveDate> {
    (0..days)
        .filter_map(|offset| today.checked_sub_days(Days::new(offset as u64)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{date_only, parse_iso_date, recent_dates, DateParseError};
    use chrono::NaiveDate;

    #[test]
    fn parse_iso_date_rejects_loose_shapes() {
        assert!(parse_iso_date("2025-11-22").is_ok());
        assert_eq!(
            parse_iso_date("2025-1-22"),
            Err(DateParseError::Shape("2025-1-22".to_string()))
        );
        assert_eq!(
            parse_iso_date("2025-02-30"),
            Err(DateParseError::Calendar("2025-02-30".to_string()))
        );
        assert!(parse_iso_date("20251122").is_err());
    }

    #[test]
    fn date_only_strips_time_component() {
        let expected = NaiveDate::from_ymd_opt(2025, 11, 22).expect("date");
        assert_eq!(date_only("2025-11-22T06:30:00Z").expect("parse"), expected);
        assert_eq!(date_only(" 2025-11-22 ").expect("parse"), expected);
    }

    #[test]
    fn recent_dates_are_newest_first() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 2).expect("date");
        let dates = recent_dates(3, today);
        assert_eq!(
            dates,
            vec![
                today,
                NaiveDate::from_ymd_opt(2025, 3, 1).expect("date"),
                NaiveDate::from_ymd_opt(2025, 2, 28).expect("date"),
            ]
        );
        assert!(recent_dates(0, today).is_empty());
    }
}
