//! Measurement dates: spreadsheet serials and free text
//!
//! Spreadsheet serials count days since an epoch, with the fraction giving
//! the time of day. In the 1900 convention serial 1 is 1900-01-01 and serial
//! 60 is the non-existent 1900-02-29, so serials from 61 on are offset by one
//! day. The 1904 convention counts from 1904-01-01 as serial 0.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::IngestRowError;
use crate::value::Value;

/// Largest serial accepted (9999-12-31 in the 1900 convention).
pub const MAX_SERIAL: f64 = 2_958_465.0;

const PHANTOM_LEAP_DAY: f64 = 60.0;
const MICROS_PER_DAY: f64 = 86_400_000_000.0;

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: [&str; 10] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y%m%d",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Spreadsheet date convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateMode {
    /// Windows convention, serial 1 = 1900-01-01
    #[default]
    #[serde(alias = "1900")]
    Epoch1900,
    /// Classic Mac convention, serial 0 = 1904-01-01
    #[serde(alias = "1904")]
    Epoch1904,
}

/// Convert a spreadsheet serial to a timestamp.
///
/// Returns `None` for negative or out-of-range serials and for the phantom
/// 1900-02-29.
#[must_use]
pub fn serial_to_datetime(serial: f64, mode: DateMode) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > MAX_SERIAL {
        return None;
    }
    let days = serial.trunc();
    let epoch = match mode {
        DateMode::Epoch1900 if days < 1.0 || days == PHANTOM_LEAP_DAY => return None,
        DateMode::Epoch1900 if days > PHANTOM_LEAP_DAY => NaiveDate::from_ymd_opt(1899, 12, 30)?,
        DateMode::Epoch1900 => NaiveDate::from_ymd_opt(1899, 12, 31)?,
        DateMode::Epoch1904 => NaiveDate::from_ymd_opt(1904, 1, 1)?,
    };
    #[allow(clippy::cast_possible_truncation)]
    let date = epoch.checked_add_signed(TimeDelta::try_days(days as i64)?)?;
    #[allow(clippy::cast_possible_truncation)]
    let micros = ((serial - days) * MICROS_PER_DAY).round() as i64;
    date.and_time(NaiveTime::MIN)
        .checked_add_signed(TimeDelta::microseconds(micros))
}

/// Parse free-text dates. Day-first formats are preferred over month-first.
#[must_use]
pub fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn looks_like_compact_date(text: &str) -> bool {
    text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit())
}

/// Interpret a metadata `date` value.
///
/// `Null` means no date. Numbers (and numeric text) are serials, other text
/// is parsed as a date.
///
/// # Errors
///
/// Returns [`IngestRowError::InvalidDate`] if the value cannot be interpreted
pub fn parse_date(value: &Value, mode: DateMode) -> Result<Option<NaiveDateTime>, IngestRowError> {
    let invalid = || IngestRowError::InvalidDate(value.to_string());
    match value {
        Value::Null => Ok(None),
        Value::DateTime(dt) => Ok(Some(*dt)),
        #[allow(clippy::cast_precision_loss)]
        Value::Int(i) => serial_to_datetime(*i as f64, mode).map(Some).ok_or_else(invalid),
        Value::Float(x) => serial_to_datetime(*x, mode).map(Some).ok_or_else(invalid),
        Value::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let serial = if looks_like_compact_date(trimmed) {
                None
            } else {
                trimmed.parse::<f64>().ok()
            };
            match serial {
                Some(serial) => serial_to_datetime(serial, mode),
                None => parse_date_text(trimmed),
            }
            .map(Some)
            .ok_or_else(invalid)
        }
        Value::Bool(_) | Value::Duration(_) => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_time(NaiveTime::MIN)
    }

    #[test]
    fn test_serial_1900() {
        assert_eq!(serial_to_datetime(1.0, DateMode::Epoch1900), Some(ymd(1900, 1, 1)));
        assert_eq!(serial_to_datetime(59.0, DateMode::Epoch1900), Some(ymd(1900, 2, 28)));
        assert_eq!(serial_to_datetime(60.0, DateMode::Epoch1900), None);
        assert_eq!(serial_to_datetime(61.0, DateMode::Epoch1900), Some(ymd(1900, 3, 1)));
        assert_eq!(serial_to_datetime(43831.0, DateMode::Epoch1900), Some(ymd(2020, 1, 1)));
    }

    #[test]
    fn test_serial_1904() {
        assert_eq!(serial_to_datetime(0.0, DateMode::Epoch1904), Some(ymd(1904, 1, 1)));
        assert_eq!(serial_to_datetime(42369.0, DateMode::Epoch1904), Some(ymd(2020, 1, 1)));
    }

    #[test]
    fn test_serial_fraction_is_time_of_day() {
        let dt = serial_to_datetime(43831.75, DateMode::Epoch1900).unwrap();
        assert_eq!(dt, ymd(2020, 1, 1) + TimeDelta::hours(18));
    }

    #[test]
    fn test_serial_out_of_range() {
        assert_eq!(serial_to_datetime(-1.0, DateMode::Epoch1900), None);
        assert_eq!(serial_to_datetime(0.5, DateMode::Epoch1900), None);
        assert_eq!(serial_to_datetime(f64::NAN, DateMode::Epoch1900), None);
        assert_eq!(serial_to_datetime(3e6, DateMode::Epoch1900), None);
    }

    #[test]
    fn test_text_formats() {
        let expected = ymd(2020, 1, 5);
        for text in ["2020-01-05", "05.01.2020", "05/01/2020", "5 January 2020"] {
            assert_eq!(parse_date_text(text), Some(expected), "{text}");
        }
        assert_eq!(
            parse_date_text("2020-01-05T13:00:00+02:00"),
            Some(expected + TimeDelta::hours(13))
        );
        assert_eq!(parse_date_text("not a date"), None);
    }

    #[test]
    fn test_parse_date_value() {
        let mode = DateMode::Epoch1900;
        assert_eq!(parse_date(&Value::Null, mode), Ok(None));
        assert_eq!(parse_date(&Value::from(""), mode), Ok(None));
        assert_eq!(
            parse_date(&Value::Int(43831), mode),
            parse_date(&Value::from("2020-01-01"), mode)
        );
        assert_eq!(parse_date(&Value::from("43831"), mode), Ok(Some(ymd(2020, 1, 1))));
        assert_eq!(
            parse_date(&Value::from("soon"), mode),
            Err(IngestRowError::InvalidDate("soon".to_string()))
        );
        assert!(parse_date(&Value::Bool(true), mode).is_err());
    }
}
