//! String formats for format-constrained fields.
//!
//! Date-times are stored as UTC ISO-8601 strings with a trailing `Z`; bytes
//! are stored as standard base64. Decimals and fractions are strings
//! (`"12.50"`, `"3/4"`) so no precision is lost to JSON numbers, and
//! coordinates are a `[latitude, longitude]` pair.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use base64::Engine;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]|[-_.])+@([a-zA-Z0-9]|-){2,63}\.([a-zA-Z0-9]{2,63}\.?)+$")
        .expect("email pattern is valid")
});

/// Returns `true` if `value` looks like an email address.
pub fn is_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

/// Parse a stored date-time.
///
/// Accepts RFC 3339 (any offset, normalized to UTC) and the naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]Z` layout written by older clients.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = value.strip_suffix('Z')?;
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Render a date-time in the stored layout.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Encode bytes for storage.
pub fn encode_bytes(value: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(value)
}

/// Decode stored bytes.
pub fn decode_bytes(value: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD.decode(value).ok()
}

/// Parse a stored decimal.
pub fn parse_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(value.trim()).ok()
}

/// A geographic coordinate in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatLong {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLong {
    /// `None` unless latitude is within ±90 and longitude within ±180.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }

    /// The stored `[latitude, longitude]` form.
    pub fn to_value(self) -> Value {
        Value::from(vec![self.latitude, self.longitude])
    }
}

/// Parse a stored `[latitude, longitude]` pair.
pub fn parse_lat_long(value: &Value) -> Option<LatLong> {
    match value.as_array()?.as_slice() {
        [lat, long] => LatLong::new(lat.as_f64()?, long.as_f64()?),
        _ => None,
    }
}

/// An exact ratio, always kept in lowest terms with a positive denominator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fraction {
    numerator: i64,
    denominator: i64,
}

impl Fraction {
    /// `None` for a zero denominator.
    pub fn new(numerator: i64, denominator: i64) -> Option<Self> {
        if denominator == 0 {
            return None;
        }
        let divisor = gcd(numerator.unsigned_abs(), denominator.unsigned_abs()).max(1);
        let sign = if denominator < 0 { -1 } else { 1 };
        let divisor = i64::try_from(divisor).ok()?;
        Some(Self {
            numerator: (numerator / divisor).checked_mul(sign)?,
            denominator: (denominator / divisor).checked_mul(sign)?,
        })
    }

    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    pub fn denominator(&self) -> i64 {
        self.denominator
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Parse a stored `"n/d"` fraction.
pub fn parse_fraction(value: &str) -> Option<Fraction> {
    let (numerator, denominator) = value.split_once('/')?;
    Fraction::new(numerator.trim().parse().ok()?, denominator.trim().parse().ok()?)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_email("paul@glowinthedark.co.uk"));
        assert!(is_email("first.last-name_1@example.com"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_email("paul"));
        assert!(!is_email("paul@"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("paul@x.com"));
        assert!(!is_email("pa ul@example.com"));
    }

    #[test]
    fn datetime_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2024, 2, 29, 13, 5, 9).unwrap();
        let stored = format_datetime(&dt);
        assert_eq!(stored, "2024-02-29T13:05:09Z");
        assert_eq!(parse_datetime(&stored), Some(dt));
    }

    #[test]
    fn datetime_offsets_are_normalized() {
        let parsed = parse_datetime("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn legacy_fractional_layout() {
        let parsed = parse_datetime("2015-06-01T10:11:12.123Z").unwrap();
        assert_eq!(parsed.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn rejects_non_datetimes() {
        assert_eq!(parse_datetime("yesterday"), None);
        assert_eq!(parse_datetime("2015-13-01T10:11:12Z"), None);
    }

    #[test]
    fn bytes_roundtrip() {
        let encoded = encode_bytes(b"\x00\x01woof");
        assert_eq!(decode_bytes(&encoded).unwrap(), b"\x00\x01woof");
        assert_eq!(decode_bytes("not base64!"), None);
    }

    #[test]
    fn decimals_keep_their_scale() {
        let parsed = parse_decimal("12.50").unwrap();
        assert_eq!(parsed.to_string(), "12.50");
        assert_eq!(parse_decimal("-0.001").unwrap().scale(), 3);
        assert_eq!(parse_decimal("twelve"), None);
    }

    #[test]
    fn lat_long_range_checks() {
        let here = LatLong::new(51.2345, -1.4533).unwrap();
        assert_eq!(parse_lat_long(&here.to_value()), Some(here));
        assert!(LatLong::new(90.5, 0.0).is_none());
        assert!(LatLong::new(0.0, -180.5).is_none());
        assert_eq!(parse_lat_long(&json!([1.0])), None);
        assert_eq!(parse_lat_long(&json!(["51", "1"])), None);
    }

    #[test]
    fn fractions_are_reduced() {
        let half = parse_fraction("2/4").unwrap();
        assert_eq!((half.numerator(), half.denominator()), (1, 2));
        assert_eq!(parse_fraction("3/-6").unwrap().to_string(), "-1/2");
        assert_eq!(parse_fraction("0/5").unwrap().to_string(), "0/1");
        assert_eq!(parse_fraction("1/0"), None);
        assert_eq!(parse_fraction("1.5/2"), None);
        assert_eq!(parse_fraction("half"), None);
    }
}
