//! Serde helpers for human-readable durations in configuration and status output.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

/// `Duration` as seconds (number) or a humantime string such as `"24h"` or `"1h 30m"`
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "a duration as seconds (number) or human-readable string (e.g., '24h', '500ms', '1h30m')",
                )
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(seconds))
            }

            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(seconds)
                    .map(Duration::from_secs)
                    .map_err(|_| de::Error::custom(format!("Negative duration: {seconds}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                humantime::parse_duration(value)
                    .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(with = "super::duration")]
        value: Duration,
    }

    #[test]
    fn test_parses_strings_and_numbers() {
        let h: Holder = toml::from_str("value = \"1h 30m\"").unwrap();
        assert_eq!(h.value, Duration::from_secs(5400));

        let h: Holder = toml::from_str("value = 45").unwrap();
        assert_eq!(h.value, Duration::from_secs(45));

        let h: Holder = toml::from_str("value = \"250ms\"").unwrap();
        assert_eq!(h.value, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(toml::from_str::<Holder>("value = \"soon\"").is_err());
        assert!(toml::from_str::<Holder>("value = -5").is_err());
    }

    #[test]
    fn test_serializes_human_readable() {
        let json = serde_json::to_string(&Holder {
            value: Duration::from_secs(86400),
        })
        .unwrap();
        assert_eq!(json, r#"{"value":"1day"}"#);
    }
}
