//! Human-readable duration formatting and parsing utilities

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid duration format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Duration too large: {0}")]
    Overflow(String),
}

/// Duration wrapper with human-readable parsing ("500ms", "5s", "2m", "1h").
///
/// A bare integer is read as milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn to_human_readable(&self) -> String {
        const UNITS: &[(&str, u128)] = &[
            ("h", 3_600_000),
            ("m", 60_000),
            ("s", 1_000),
        ];

        let ms = self.0.as_millis();
        for &(unit, divisor) in UNITS {
            if ms >= divisor && ms % divisor == 0 {
                return format!("{}{}", ms / divisor, unit);
            }
        }

        format!("{}ms", ms)
    }
}

impl From<HumanDuration> for Duration {
    fn from(value: HumanDuration) -> Self {
        value.0
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_human_readable())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct HumanDurationVisitor;

        impl<'de> serde::de::Visitor<'de> for HumanDurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as string (e.g., \"500ms\", \"5s\") or milliseconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(HumanDuration::from_millis(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(HumanDuration::from_millis)
                    .map_err(|_| E::custom(format!("negative duration: {}", v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<HumanDuration>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(HumanDurationVisitor)
    }
}

impl FromStr for HumanDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        if let Ok(ms) = s.parse::<u64>() {
            return Ok(HumanDuration::from_millis(ms));
        }

        let (num_str, unit) = if let Some(pos) = s.find(|c: char| !c.is_ascii_digit()) {
            (&s[..pos], &s[pos..])
        } else {
            return Err(ParseError::InvalidFormat(s.to_string()));
        };

        if num_str.is_empty() {
            return Err(ParseError::InvalidFormat(s.to_string()));
        }

        let num: u64 = num_str.parse()?;

        let secs_per_unit = match unit.trim() {
            "ms" => return Ok(HumanDuration(Duration::from_millis(num))),
            "s" | "sec" => 1,
            "m" | "min" => 60,
            "h" => 3600,
            _ => return Err(ParseError::InvalidUnit(unit.to_string())),
        };
        let secs = num
            .checked_mul(secs_per_unit)
            .ok_or_else(|| ParseError::Overflow(s.to_string()))?;
        let duration = Duration::from_secs(secs);

        Ok(HumanDuration(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("250".parse::<HumanDuration>().unwrap().0, Duration::from_millis(250));
        assert_eq!("500ms".parse::<HumanDuration>().unwrap().0, Duration::from_millis(500));
        assert_eq!("5s".parse::<HumanDuration>().unwrap().0, Duration::from_secs(5));
        assert_eq!("2m".parse::<HumanDuration>().unwrap().0, Duration::from_secs(120));
        assert_eq!("1H".parse::<HumanDuration>().unwrap().0, Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "5 weeks".parse::<HumanDuration>(),
            Err(ParseError::InvalidUnit(_))
        ));
        assert!(matches!(
            "ms".parse::<HumanDuration>(),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_to_human_readable() {
        assert_eq!(HumanDuration::from_millis(500).to_human_readable(), "500ms");
        assert_eq!(HumanDuration::from_secs(5).to_human_readable(), "5s");
        assert_eq!(HumanDuration::from_secs(90).to_human_readable(), "90s");
        assert_eq!(HumanDuration::from_secs(7200).to_human_readable(), "2h");
    }

    #[test]
    fn test_deserialize_string_and_number() {
        #[derive(Deserialize)]
        struct TestStruct {
            timeout: HumanDuration,
        }

        let parsed: TestStruct = serde_json::from_str(r#"{"timeout": "2s"}"#).unwrap();
        assert_eq!(parsed.timeout.as_duration(), Duration::from_secs(2));

        let parsed: TestStruct = serde_json::from_str(r#"{"timeout": 1500}"#).unwrap();
        assert_eq!(parsed.timeout.as_duration(), Duration::from_millis(1500));
    }

    #[test]
    fn test_overflowing_duration_is_rejected() {
        let result: Result<HumanDuration, _> = "9999999999999999999h".parse();
        assert!(matches!(result, Err(ParseError::Overflow(_))));

        let result: Result<HumanDuration, _> = "18446744073709551615m".parse();
        assert!(matches!(result, Err(ParseError::Overflow(_))));

        let max: HumanDuration = "18446744073709551615s".parse().unwrap();
        assert_eq!(max.as_duration(), Duration::from_secs(u64::MAX));
    }
}
