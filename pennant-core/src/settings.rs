//! Parsing of configuration settings.
//!
//! Every `from_env` constructor goes through these helpers so that a value
//! which is set but malformed is reported instead of silently replaced by a
//! default. Unset values are `Ok(None)`.

use std::str::FromStr;

use crate::ConfigError;

/// Read a setting from the process environment.
pub fn env_setting(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Parse a raw setting value, trimming surrounding whitespace.
pub fn parse_setting<T: FromStr>(name: &str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::invalid(name, &raw, "could not parse value")),
        None => Ok(None),
    }
}

/// Parse a boolean setting. Accepts `true`/`false`/`1`/`0`, any case.
pub fn parse_flag(name: &str, raw: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(Some(true)),
        "false" | "0" => Ok(Some(false)),
        _ => Err(ConfigError::invalid(name, &raw, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setting() {
        assert_eq!(parse_setting::<u64>("N", Some(" 30 ".into())), Ok(Some(30)));
        assert_eq!(parse_setting::<u64>("N", None), Ok(None));

        let err = parse_setting::<u64>("PENNANT_CACHE_TTL_SECS", Some("5m".into()));
        assert!(matches!(
            err,
            Err(ConfigError::InvalidValue { field, value, .. })
                if field == "PENNANT_CACHE_TTL_SECS" && value == "5m"
        ));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("F", Some("TRUE".into())), Ok(Some(true)));
        assert_eq!(parse_flag("F", Some("0".into())), Ok(Some(false)));
        assert_eq!(parse_flag("F", None), Ok(None));
        assert!(parse_flag("F", Some("nope".into())).is_err());
    }
}
