use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Time value cannot be empty.")]
    EmptyTime,

    #[error("Invalid time value '{0}'. Expected a number followed by a unit (e.g., '4fs', '100 ps', '1ns').")]
    InvalidTime(String),

    #[error("Unknown time unit '{unit}' in '{value}'. Expected one of: fs, ps, ns, us.")]
    UnknownTimeUnit { unit: String, value: String },

    #[error("Invalid --set format: '{0}'. Expected KEY=VALUE.")]
    InvalidKeyValue(String),
}

/// Parses a time value into picoseconds.
///
/// A bare number is taken to be in picoseconds. Otherwise the number must be followed,
/// optionally after whitespace, by one of `fs`, `ps`, `ns` or `us`.
pub fn parse_time(value: &str) -> Result<f64, ParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyTime);
    }

    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let magnitude: f64 = number
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidTime(value.to_string()))?;
    if !magnitude.is_finite() {
        return Err(ParseError::InvalidTime(value.to_string()));
    }

    let scale = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ps" => 1.0,
        "fs" => 1e-3,
        "ns" => 1e3,
        "us" => 1e6,
        other => {
            return Err(ParseError::UnknownTimeUnit {
                unit: other.to_string(),
                value: value.to_string(),
            });
        }
    };
    Ok(magnitude * scale)
}

/// Splits a `KEY=VALUE` pair at the first `=`.
pub fn parse_key_value(pair: &str) -> Result<(&str, &str), ParseError> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
        _ => Err(ParseError::InvalidKeyValue(pair.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn bare_numbers_are_picoseconds() {
        assert!(close(parse_time("2.5").unwrap(), 2.5));
        assert!(close(parse_time(" 100 ").unwrap(), 100.0));
        assert!(close(parse_time("1e3").unwrap(), 1000.0));
    }

    #[test]
    fn units_are_converted_to_picoseconds() {
        assert!(close(parse_time("4fs").unwrap(), 0.004));
        assert!(close(parse_time("100 ps").unwrap(), 100.0));
        assert!(close(parse_time("1ns").unwrap(), 1000.0));
        assert!(close(parse_time("2 NS").unwrap(), 2000.0));
        assert!(close(parse_time("0.5us").unwrap(), 500_000.0));
        assert!(close(parse_time("2e-3ns").unwrap(), 2.0));
    }

    #[test]
    fn malformed_times_are_rejected() {
        assert_eq!(parse_time(""), Err(ParseError::EmptyTime));
        assert_eq!(
            parse_time("ps"),
            Err(ParseError::InvalidTime("ps".to_string()))
        );
        assert!(matches!(
            parse_time("3 hours"),
            Err(ParseError::UnknownTimeUnit { .. })
        ));
        assert!(matches!(parse_time("inf"), Err(ParseError::InvalidTime(_))));
    }

    #[test]
    fn key_value_pairs_split_at_the_first_equals_sign() {
        assert_eq!(
            parse_key_value("output.directory=a=b").unwrap(),
            ("output.directory", "a=b")
        );
        assert_eq!(
            parse_key_value("dynamics.runtime = 1ns").unwrap(),
            ("dynamics.runtime", "1ns")
        );
        assert!(parse_key_value("dynamics.runtime").is_err());
        assert!(parse_key_value("=3").is_err());
    }
}
