//! Normalization of repository timestamps.
//!
//! The resource index reports dates with or without milliseconds and with or
//! without a trailing `Z`. The variant is chosen by string length alone.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{RepositoryError, Result};

/// Supported lexical forms, keyed by exact length.
///
/// All forms are read as UTC. Offset forms (`+01:00`) are not supported.
pub const DATE_FORMATS: &[(usize, &str)] = &[
    (19, "%Y-%m-%dT%H:%M:%S"),
    (20, "%Y-%m-%dT%H:%M:%SZ"),
    (23, "%Y-%m-%dT%H:%M:%S%.3f"),
    (24, "%Y-%m-%dT%H:%M:%S%.3fZ"),
];

/// Look up the format for a timestamp of the given length.
pub fn format_for_len(len: usize) -> Option<&'static str> {
    DATE_FORMATS
        .iter()
        .find(|(expected, _)| *expected == len)
        .map(|(_, format)| *format)
}

/// Parse a lexical timestamp into an instant.
///
/// # Returns
/// * `Ok(instant)` in UTC
/// * `Err(RepositoryError::UnparsableDate)` carrying the input if its length
///   is unsupported or it does not match the format for that length
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use fedora_oai_driver::date::parse_date;
///
/// let date = parse_date("2020-01-01T00:00:00Z").unwrap();
/// assert_eq!(date, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
/// assert!(parse_date("2020-01-01").is_err());
/// ```
pub fn parse_date(lexical: &str) -> Result<DateTime<Utc>> {
    let unparsable = || RepositoryError::UnparsableDate(lexical.to_string());

    let format = format_for_len(lexical.len()).ok_or_else(unparsable)?;
    let naive = NaiveDateTime::parse_from_str(lexical, format).map_err(|_| unparsable())?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    #[test]
    fn test_each_length_renders_back_identically() {
        for input in [
            "2005-04-13T09:30:12",
            "2005-04-13T09:30:12Z",
            "2005-04-13T09:30:12.345",
            "2005-04-13T09:30:12.345Z",
        ] {
            let parsed = parse_date(input).unwrap();
            let format = format_for_len(input.len()).unwrap();
            assert_eq!(parsed.format(format).to_string(), input);
        }
    }

    #[test]
    fn test_zulu_seconds() {
        assert_eq!(
            parse_date("2020-01-01T00:00:00Z").unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_milliseconds_are_kept() {
        let parsed = parse_date("2020-01-01T00:00:00.120Z").unwrap();
        assert_eq!(parsed.nanosecond(), 120_000_000);
    }

    #[test]
    fn test_unsupported_lengths_fail() {
        for input in [
            "",
            "2020-01-01",
            "2020-01-01T00:00",
            "2020-01-01T00:00:00.1Z",
            "2020-01-01T00:00:00+01:00",
            "2020-01-01T00:00:00.000+01:00",
        ] {
            match parse_date(input) {
                Err(RepositoryError::UnparsableDate(s)) => assert_eq!(s, input),
                other => panic!("expected UnparsableDate for {input:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_right_length_wrong_shape_fails() {
        // 20 characters, but no trailing Z
        assert!(parse_date("2020-01-01T00:00:00X").is_err());
        // 19 characters, invalid month
        assert!(parse_date("2020-13-01T00:00:00").is_err());
        // 23 characters, comma instead of dot
        assert!(parse_date("2020-01-01T00:00:00,000").is_err());
    }
}
