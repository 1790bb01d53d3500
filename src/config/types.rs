use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::de::{Error, Unexpected, Visitor};
use serde::{Deserialize, Deserializer};

/// A duration config value: either an integer number of seconds or a string
/// such as `"90s"`, `"30m"`, `"1h30m"` or `"1d"`.
#[derive(Debug, Clone, Copy)]
pub struct Duration(std::time::Duration);

impl Duration {
    pub fn from_secs(seconds: u64) -> Self {
        Self(std::time::Duration::from_secs(seconds))
    }
}

impl From<std::time::Duration> for Duration {
    fn from(duration: std::time::Duration) -> Self {
        Self(duration)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(duration: Duration) -> Self {
        duration.0
    }
}

fn parse_duration_str(s: &str) -> Option<Duration> {
    static REGEXP: OnceLock<Regex> = OnceLock::new();

    let regexp = REGEXP.get_or_init(|| {
        Regex::new(r"^(?:(\d+)d)?\s*(?:(\d+)h)?\s*(?:(\d+)m)?\s*(?:(\d+)s)?$").unwrap()
    });
    let captures = regexp.captures(s)?;

    let part = |idx: usize| {
        captures
            .get(idx)
            .map(|m| m.as_str().parse::<u64>())
            .transpose()
            .ok()
            .flatten()
    };

    let (days, hours, minutes, seconds) = (part(1), part(2), part(3), part(4));

    if days.is_none() && hours.is_none() && minutes.is_none() && seconds.is_none() {
        return None;
    }

    days.unwrap_or(0)
        .checked_mul(24)
        .and_then(|h| h.checked_add(hours.unwrap_or(0)))
        .and_then(|h| h.checked_mul(60))
        .and_then(|m| m.checked_add(minutes.unwrap_or(0)))
        .and_then(|m| m.checked_mul(60))
        .and_then(|s| s.checked_add(seconds.unwrap_or(0)))
        .map(Duration::from_secs)
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a duration")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                self.visit_u64(v.try_into().map_err(E::custom)?)
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(Duration::from_secs(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                parse_duration_str(v)
                    .ok_or_else(|| E::invalid_value(Unexpected::Str(v), &"a duration"))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
