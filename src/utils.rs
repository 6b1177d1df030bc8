use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DurationError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid number '{0}' in duration")]
    InvalidNumber(String),
    #[error("unknown duration unit '{0}' (use ms, s, m or h)")]
    UnknownUnit(String),
    #[error("duration '{0}' is too large")]
    OutOfRange(String),
}

const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

pub fn parse_headers(headers: &[String]) -> Result<HashMap<String, String>> {
    let mut parsed = HashMap::new();

    for header in headers {
        let (key, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid header format: {}", header))?;
        parsed.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(parsed)
}

/// Parses time strings such as `10s`, `500ms`, `1m30s` or `0.5s`.
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DurationError::Empty);
    }

    if input.chars().all(|c| c.is_ascii_digit() || c == '.') {
        let nanos = decimal_nanos(input, NANOS_PER_SEC, input)?;
        return nanos_to_duration(nanos, input);
    }

    let mut total: u128 = 0;
    let mut rest = input;

    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        if number.is_empty() {
            return Err(DurationError::InvalidNumber(rest.to_string()));
        }

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let unit_nanos = match unit {
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            other => return Err(DurationError::UnknownUnit(other.to_string())),
        };

        total = total
            .checked_add(decimal_nanos(number, unit_nanos, input)?)
            .ok_or_else(|| DurationError::OutOfRange(input.to_string()))?;
        rest = next;
    }

    nanos_to_duration(total, input)
}

/// `number` (plain decimal, no sign or exponent) times `unit_nanos`, exactly.
fn decimal_nanos(number: &str, unit_nanos: u128, input: &str) -> Result<u128, DurationError> {
    let invalid = || DurationError::InvalidNumber(number.to_string());
    let out_of_range = || DurationError::OutOfRange(input.to_string());

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| out_of_range())?
    };
    let mut nanos = whole.checked_mul(unit_nanos).ok_or_else(out_of_range)?;

    // Digits past nanosecond resolution cannot contribute
    let fraction = &fraction[..fraction.len().min(18)];
    if !fraction.is_empty() {
        let digits: u128 = fraction.parse().map_err(|_| invalid())?;
        let scale = 10u128.pow(fraction.len() as u32);
        let part = digits.checked_mul(unit_nanos).ok_or_else(out_of_range)? / scale;
        nanos = nanos.checked_add(part).ok_or_else(out_of_range)?;
    }

    Ok(nanos)
}

fn nanos_to_duration(nanos: u128, input: &str) -> Result<Duration, DurationError> {
    let secs = u64::try_from(nanos / NANOS_PER_SEC)
        .map_err(|_| DurationError::OutOfRange(input.to_string()))?;
    Ok(Duration::new(secs, (nanos % NANOS_PER_SEC) as u32))
}

/// Renders a duration back into the same time-string form `parse_duration` reads.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos % NANOS_PER_SEC != 0 {
        let millis = nanos / NANOS_PER_MILLI;
        let fraction = nanos % NANOS_PER_MILLI;
        if fraction == 0 {
            return format!("{}ms", millis);
        }
        let digits = format!("{:06}", fraction);
        return format!("{}.{}ms", millis, digits.trim_end_matches('0'));
    }

    let mut secs = duration.as_secs();
    let mut out = String::new();
    if secs >= 3600 {
        out.push_str(&format!("{}h", secs / 3600));
        secs %= 3600;
    }
    if secs >= 60 {
        out.push_str(&format!("{}m", secs / 60));
        secs %= 60;
    }
    if secs > 0 {
        out.push_str(&format!("{}s", secs));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("0.5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1h2m3s").unwrap(), Duration::from_secs(3723));
    }

    #[test]
    fn test_parse_bare_number_is_seconds() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("0.5").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_duration(""), Err(DurationError::Empty));
        assert_eq!(
            parse_duration("10x"),
            Err(DurationError::UnknownUnit("x".to_string()))
        );
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("-1").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(10)), "10s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert_eq!(
            parse_duration("99999999999999999999h"),
            Err(DurationError::OutOfRange("99999999999999999999h".to_string()))
        );
        assert!(matches!(
            parse_duration("18446744073709551615s1s"),
            Err(DurationError::OutOfRange(_))
        ));
        assert!(parse_duration("1e30").is_err());
        assert!(parse_duration("1e30s").is_err());
        assert!(parse_duration("1.2.3s").is_err());
        assert!(parse_duration(".").is_err());
    }

    #[test]
    fn test_parse_fraction_is_exact() {
        assert_eq!(parse_duration("1.5ms").unwrap(), Duration::from_micros(1500));
        assert_eq!(parse_duration("0.1s").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("0.000000001s").unwrap(), Duration::from_nanos(1));
        assert_eq!(parse_duration(".5m").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_format_keeps_sub_millisecond_precision() {
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_nanos(1)), "0.000001ms");
        assert_eq!(format_duration(Duration::new(2, 250_000_000)), "2250ms");

        for d in [
            Duration::from_micros(1500),
            Duration::from_nanos(123_456_789),
            Duration::new(90, 1),
            Duration::from_secs(3723),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }

    #[test]
    fn test_parse_headers() {
        let headers = vec!["Accept: application/json".to_string()];
        let parsed = parse_headers(&headers).unwrap();
        assert_eq!(parsed.get("Accept"), Some(&"application/json".to_string()));

        assert!(parse_headers(&["no-colon".to_string()]).is_err());
    }
}
