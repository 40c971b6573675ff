//! Parsing of `dDhHmMsS` duration specifications
//!
//! Each component is optional but must appear in day, hour, minute, second
//! order, and units are case-insensitive: `30S`, `1h30m`, `2D12H`. The bare
//! string `0` is accepted and means "no limit".

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::ConfigError;

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?i)(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$")
            .expect("duration pattern is valid")
    })
}

/// Parse a duration specification such as `30S` or `1D2H3M4S`
pub fn parse_duration(spec: &str) -> Result<Duration, ConfigError> {
    let spec = spec.trim();
    if spec == "0" {
        return Ok(Duration::ZERO);
    }
    if spec.is_empty() {
        return Err(ConfigError::InvalidDuration(spec.to_string()));
    }

    let caps = duration_pattern()
        .captures(spec)
        .ok_or_else(|| ConfigError::InvalidDuration(spec.to_string()))?;

    const UNITS: [u64; 4] = [86_400, 3_600, 60, 1];
    let mut total: u64 = 0;
    for (idx, unit) in UNITS.iter().enumerate() {
        if let Some(m) = caps.get(idx + 1) {
            let value: u64 = m
                .as_str()
                .parse()
                .map_err(|_| ConfigError::InvalidDuration(spec.to_string()))?;
            total = value
                .checked_mul(*unit)
                .and_then(|secs| total.checked_add(secs))
                .ok_or_else(|| ConfigError::InvalidDuration(spec.to_string()))?;
        }
    }

    Ok(Duration::from_secs(total))
}

/// Format a duration back into the canonical `dDhHmMsS` form
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0".to_string();
    }

    let mut out = String::new();
    for (unit, suffix) in [(86_400, 'D'), (3_600, 'H'), (60, 'M'), (1, 'S')] {
        let value = secs / unit;
        if value > 0 {
            out.push_str(&format!("{}{}", value, suffix));
            secs %= unit;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_duration("30S").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_compound() {
        let d = parse_duration("1D2H3M4S").unwrap();
        assert_eq!(d, Duration::from_secs(86_400 + 2 * 3_600 + 3 * 60 + 4));

        let d = parse_duration("1h30m").unwrap();
        assert_eq!(d, Duration::from_secs(5_400));
    }

    #[test]
    fn test_parse_zero() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0S").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "30", "S", "1S2M", "abc", "-5S", "1.5S", "1W"] {
            assert!(
                matches!(parse_duration(bad), Err(ConfigError::InvalidDuration(_))),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0");
        assert_eq!(format_duration(Duration::from_secs(30)), "30S");
        assert_eq!(format_duration(Duration::from_secs(5_400)), "1H30M");
        assert_eq!(format_duration(Duration::from_secs(90_061)), "1D1H1M1S");
    }
}
