//! Common data types used across the data_capture subsystem.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error_handling::types::CaptureError;

/// Column names of the data unit stream, written once as the first row of every session file.
pub const HEADER_FIELDS: [&str; 11] = [
    "Unix-timestamp",
    "Milliseconds since 00:00:00 (ms)",
    "Time",
    "Jx (g)",
    "Jy (g)",
    "Jz (g)",
    "Temperature (°C)",
    "Humidity (%)",
    "Pressure (mbar)",
    "Parabola",
    "Announcement",
];

pub const FIELD_DELIMITER: char = ';';

pub fn header_row() -> String {
    HEADER_FIELDS.join(&FIELD_DELIMITER.to_string())
}

/// Where a session writes its rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OutputTarget {
    /// `<prefix>_YYYYMMDD-HHhMMmSSs.csv` inside the configured output directory
    #[default]
    Generate,
    /// A file chosen by the caller; must be missing or empty
    Explicit(PathBuf),
}

/// Local reception time of a datagram.
///
/// Rendered as Unix seconds with microsecond resolution, e.g. `1730000000.123456`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CaptureTimestamp(DateTime<Utc>);

impl CaptureTimestamp {
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for CaptureTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl fmt::Display for CaptureTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06}",
            self.0.timestamp(),
            self.0.timestamp_subsec_micros()
        )
    }
}

/// Hands out capture timestamps that never go backwards within one session,
/// even if the wall clock is stepped.
#[derive(Debug, Default)]
pub struct CaptureClock {
    last: Option<DateTime<Utc>>,
}

impl CaptureClock {
    pub fn stamp(&mut self) -> CaptureTimestamp {
        self.stamp_at(Utc::now())
    }

    pub fn stamp_at(&mut self, now: DateTime<Utc>) -> CaptureTimestamp {
        let ts = match self.last {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last = Some(ts);
        CaptureTimestamp(ts)
    }
}

/// One received datagram, decoded and stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub captured_at: CaptureTimestamp,
    pub payload: String,
}

impl Record {
    /// Decodes a datagram as UTF-8 text.
    ///
    /// The trailing line terminator is removed and embedded line breaks become spaces, so a
    /// record always occupies exactly one row of the output file.
    pub fn decode_payload(bytes: &[u8]) -> Result<String, CaptureError> {
        let text = std::str::from_utf8(bytes).map_err(CaptureError::Decode)?;
        let text = text.trim_end_matches(['\r', '\n']);
        if text.contains(['\r', '\n']) {
            Ok(text.replace("\r\n", " ").replace(['\r', '\n'], " "))
        } else {
            Ok(text.to_string())
        }
    }

    /// `<capture timestamp>;<payload>`, without line terminator.
    pub fn to_row(&self) -> String {
        format!("{}{}{}", self.captured_at, FIELD_DELIMITER, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_header_row() {
        assert_eq!(
            header_row(),
            "Unix-timestamp;Milliseconds since 00:00:00 (ms);Time;Jx (g);Jy (g);Jz (g);\
             Temperature (°C);Humidity (%);Pressure (mbar);Parabola;Announcement"
        );
    }

    #[test]
    fn test_timestamp_display_has_microseconds() {
        let dt = Utc.timestamp_opt(1_730_000_000, 5_000).unwrap();
        assert_eq!(CaptureTimestamp::from(dt).to_string(), "1730000000.000005");
    }

    #[test]
    fn test_clock_never_goes_backwards() {
        let mut clock = CaptureClock::default();
        let later = Utc.timestamp_opt(1_730_000_010, 0).unwrap();
        let earlier = Utc.timestamp_opt(1_730_000_000, 0).unwrap();

        let first = clock.stamp_at(later);
        let second = clock.stamp_at(earlier);
        assert_eq!(first, second);

        let third = clock.stamp();
        assert!(third >= second);
    }

    #[test]
    fn test_decode_payload() {
        assert_eq!(
            Record::decode_payload(b"36000000,10:00:00.000,0.01\r\n").unwrap(),
            "36000000,10:00:00.000,0.01"
        );
        assert_eq!(Record::decode_payload(b"a\nb\r\nc").unwrap(), "a b c");
        assert_eq!(
            Record::decode_payload("Temp 21°C".as_bytes()).unwrap(),
            "Temp 21°C"
        );
        assert!(matches!(
            Record::decode_payload(&[0xff, 0xfe, 0x41]),
            Err(CaptureError::Decode(_))
        ));
    }

    #[test]
    fn test_to_row() {
        let record = Record {
            captured_at: Utc.timestamp_opt(1_730_000_000, 123_456_000).unwrap().into(),
            payload: "1,2,3".into(),
        };
        assert_eq!(record.to_row(), "1730000000.123456;1,2,3");
    }
}
