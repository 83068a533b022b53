//! Excel serial date + HHMM time decoding.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Utc};
use chrono_tz::Asia::Kolkata;
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use crate::raw::Cell;

/// Largest serial accepted as a date.
pub const MAX_SERIAL: f64 = 1_000_000.0;

fn excel_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Parse "HHMM", "HMM", "HH:MM" or "H:MM". Returns `None` for anything else,
/// including out-of-range hours or minutes.
pub fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(?:(\d{1,2}):(\d{2})|(\d{1,2})(\d{2}))$").expect("valid time pattern")
    });

    let caps = re.captures(raw.trim())?;
    let hours = caps.get(1).or_else(|| caps.get(3))?.as_str();
    let minutes = caps.get(2).or_else(|| caps.get(4))?.as_str();
    NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0)
}

/// Decode an Excel serial day count plus an optional wall-clock time into a
/// UTC instant.
///
/// Day 0 is 1899-12-30 and the fractional part of the serial is dropped.
/// A missing or malformed time falls back to midnight of the decoded date.
pub fn decode_excel_datetime(serial: Option<f64>, time: Option<&str>) -> Option<DateTime<Utc>> {
    let serial = serial.filter(|s| s.is_finite())?;
    if !(0.0..=MAX_SERIAL).contains(&serial) {
        warn!(serial, "serial date out of range");
        return None;
    }

    let date = excel_epoch()?.checked_add_days(Days::new(serial.trunc() as u64))?;

    let time = match time.map(str::trim).filter(|t| !t.is_empty()) {
        Some(raw) => parse_hhmm(raw).unwrap_or_else(|| {
            warn!(time = raw, "invalid HHMM, using 00:00");
            NaiveTime::MIN
        }),
        None => NaiveTime::MIN,
    };

    Some(date.and_time(time).and_utc())
}

/// Asia/Kolkata wall time for a UTC instant (always +05:30).
pub fn to_local(utc: DateTime<Utc>) -> DateTime<FixedOffset> {
    utc.with_timezone(&Kolkata).fixed_offset()
}

/// Render a GMT cell as HHMM text. Numeric cells lose their leading zero in
/// the sheet (`930.0`), so they are truncated and zero-padded to four digits.
pub fn format_hhmm(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Number(n) if *n >= 0.0 => Some(format!("{:04}", n.trunc() as u64)),
        Cell::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_serial_with_time() {
        let decoded = decode_excel_datetime(Some(45000.0), Some("0930")).unwrap();
        assert_eq!(decoded, Utc.with_ymd_and_hms(2023, 3, 15, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_serial_ten_is_ninth_of_january_1900() {
        let decoded = decode_excel_datetime(Some(10.0), None).unwrap();
        assert_eq!(decoded, Utc.with_ymd_and_hms(1900, 1, 9, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_serial_zero_is_epoch() {
        let decoded = decode_excel_datetime(Some(0.0), Some("2359")).unwrap();
        assert_eq!(decoded, Utc.with_ymd_and_hms(1899, 12, 30, 23, 59, 0).unwrap());
    }

    #[test]
    fn test_time_formats() {
        assert_eq!(parse_hhmm("0930"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_hhmm("930"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_hhmm("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_hhmm(" 23:59 "), NaiveTime::from_hms_opt(23, 59, 0));
        assert_eq!(parse_hhmm("9:05"), NaiveTime::from_hms_opt(9, 5, 0));
    }

    #[test]
    fn test_invalid_time_falls_back_to_midnight() {
        for raw in ["2560", "1275", "ab12", "12", "12345", "12:3", "1:23:", ":930", "12:345", "1:2:3"] {
            let decoded = decode_excel_datetime(Some(45000.0), Some(raw)).unwrap();
            assert_eq!((decoded.hour(), decoded.minute()), (0, 0), "time {:?}", raw);
        }
    }

    #[test]
    fn test_reference_decodings() {
        let decoded = decode_excel_datetime(Some(1.0), Some("1330")).unwrap();
        assert_eq!(decoded, Utc.with_ymd_and_hms(1899, 12, 31, 13, 30, 0).unwrap());

        assert!(decode_excel_datetime(Some(2_000_000.0), Some("1330")).is_none());

        let decoded = decode_excel_datetime(Some(10.0), Some("2575")).unwrap();
        assert_eq!(decoded, Utc.with_ymd_and_hms(1900, 1, 9, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_fractional_serial_truncated() {
        let decoded = decode_excel_datetime(Some(45000.75), None).unwrap();
        assert_eq!(decoded, Utc.with_ymd_and_hms(2023, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_out_of_range_or_missing_serial() {
        assert!(decode_excel_datetime(None, Some("0930")).is_none());
        assert!(decode_excel_datetime(Some(-1.0), None).is_none());
        assert!(decode_excel_datetime(Some(1_000_001.0), None).is_none());
        assert!(decode_excel_datetime(Some(f64::NAN), None).is_none());
        assert!(decode_excel_datetime(Some(MAX_SERIAL), None).is_some());
    }

    #[test]
    fn test_local_time_is_ist() {
        let utc = Utc.with_ymd_and_hms(2023, 3, 15, 20, 0, 0).unwrap();
        let local = to_local(utc);
        assert_eq!(local.to_rfc3339(), "2023-03-16T01:30:00+05:30");
    }

    #[test]
    fn test_format_hhmm() {
        assert_eq!(format_hhmm(&Cell::Number(930.0)).as_deref(), Some("0930"));
        assert_eq!(format_hhmm(&Cell::Number(1445.0)).as_deref(), Some("1445"));
        assert_eq!(format_hhmm(&Cell::Text(" 09:30 ".into())).as_deref(), Some("09:30"));
        assert_eq!(format_hhmm(&Cell::Empty), None);
    }
}
