//! Configuration shapes for range sources and the matcher.

use std::{fmt, time::Duration};

use serde::{Deserialize, Deserializer, de};

/// Default time between refreshes of a remote source.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default bound on each fetch request of a remote source.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Refresh timing for remote sources.
///
/// Durations are either integer seconds or strings like `"90s"`, `"1.5h"` or `"1d12h"`. Absent,
/// zero or negative values fall back to [`DEFAULT_INTERVAL`] and [`DEFAULT_TIMEOUT`]. Unknown keys
/// are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    #[serde(default, deserialize_with = "deserialize_duration")]
    interval: Option<Duration>,

    #[serde(default, deserialize_with = "deserialize_duration")]
    timeout: Option<Duration>,
}

impl RefreshConfig {
    /// Sets time between refreshes.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Sets bound on each fetch request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the effective refresh interval.
    pub fn effective_interval(&self) -> Duration {
        non_zero_or(self.interval, DEFAULT_INTERVAL)
    }

    /// Returns the effective per-request timeout.
    pub fn effective_timeout(&self) -> Duration {
        non_zero_or(self.timeout, DEFAULT_TIMEOUT)
    }
}

fn non_zero_or(dur: Option<Duration>, default: Duration) -> Duration {
    dur.filter(|dur| !dur.is_zero()).unwrap_or(default)
}

/// Matcher configuration.
///
/// `providers` holds one source configuration in inline-key form, e.g.
/// `{ "source": "cloudflare", "interval": "1h" }`. It is resolved through a
/// [`SourceRegistry`](crate::SourceRegistry).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamicRemoteIpConfig {
    /// Raw configuration of the range source.
    #[serde(default)]
    pub providers: Option<serde_json::Value>,
}

pub(crate) fn deserialize_duration<'de, D>(de: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl<'de> de::Visitor<'de> for DurationVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number of seconds or a duration string like \"15s\" or \"1.5h\"")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, de: D) -> Result<Self::Value, D::Error> {
            de.deserialize_any(self)
        }

        fn visit_u64<E: de::Error>(self, secs: u64) -> Result<Self::Value, E> {
            Ok(Some(Duration::from_secs(secs)))
        }

        fn visit_i64<E: de::Error>(self, secs: i64) -> Result<Self::Value, E> {
            // negative durations are treated like unset ones
            Ok(u64::try_from(secs).ok().map(Duration::from_secs))
        }

        fn visit_str<E: de::Error>(self, val: &str) -> Result<Self::Value, E> {
            parse_duration(val).map_err(E::custom)
        }
    }

    de.deserialize_option(DurationVisitor)
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parses an optionally signed sequence of `<number><unit>` groups, e.g. `"1h30m"` or `"1.5d"`.
///
/// Numbers may have a decimal fraction. Units are `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h` and
/// `d`. A lone `"0"` needs no unit. Negative durations parse as `None`.
fn parse_duration(val: &str) -> Result<Option<Duration>, String> {
    let invalid = || format!("invalid duration {val:?}");

    let val_trimmed = val.trim();

    let (negative, mut rest) = match val_trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, val_trimmed.strip_prefix('+').unwrap_or(val_trimmed)),
    };

    if rest == "0" {
        return Ok(Some(Duration::ZERO));
    }

    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos = 0_u128;

    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(invalid)?;

        let (number, after) = rest.split_at(number_end);

        let unit_end = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());

        let (unit, after) = after.split_at(unit_end);

        let unit_nanos = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 60 * 60 * NANOS_PER_SEC,
            "d" => 24 * 60 * 60 * NANOS_PER_SEC,
            _ => return Err(invalid()),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));

        if (whole.is_empty() && fraction.is_empty())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole = match whole {
            "" => 0,
            digits => digits.parse::<u128>().map_err(|_| invalid())?,
        };

        // digits past nanosecond precision of the largest unit cannot change the result
        let fraction = &fraction[..fraction.len().min(18)];
        let fraction_nanos = match fraction {
            "" => 0,
            digits => {
                let scale = 10_u128.pow(digits.len() as u32);
                digits.parse::<u128>().map_err(|_| invalid())? * unit_nanos / scale
            }
        };

        total_nanos = whole
            .saturating_mul(unit_nanos)
            .saturating_add(fraction_nanos)
            .saturating_add(total_nanos);

        rest = after;
    }

    if negative {
        return Ok(None);
    }

    let secs = u64::try_from(total_nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    let nanos = (total_nanos % NANOS_PER_SEC) as u32;

    Ok(Some(Duration::new(secs, nanos)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn dur(val: &str) -> Duration {
        parse_duration(val).unwrap().unwrap()
    }

    #[test]
    fn duration_strings() {
        assert_eq!(dur("15s"), Duration::from_secs(15));
        assert_eq!(dur("250ms"), Duration::from_millis(250));
        assert_eq!(dur("1h30m"), Duration::from_secs(5400));
        assert_eq!(dur("0s"), Duration::ZERO);
        assert_eq!(dur("0"), Duration::ZERO);
        assert_eq!(dur("+2m"), Duration::from_secs(120));

        parse_duration("").unwrap_err();
        parse_duration("15").unwrap_err();
        parse_duration("s").unwrap_err();
        parse_duration("1w").unwrap_err();
        parse_duration(".s").unwrap_err();
        parse_duration("1.2.3s").unwrap_err();
        parse_duration("-").unwrap_err();
    }

    #[test]
    fn duration_days_and_small_units() {
        assert_eq!(dur("1d"), Duration::from_secs(24 * 60 * 60));
        assert_eq!(dur("1d12h"), Duration::from_secs(36 * 60 * 60));
        assert_eq!(dur("500us"), Duration::from_micros(500));
        assert_eq!(dur("500µs"), Duration::from_micros(500));
        assert_eq!(dur("750ns"), Duration::from_nanos(750));
    }

    #[test]
    fn duration_fractions() {
        assert_eq!(dur("1.5h"), Duration::from_secs(5400));
        assert_eq!(dur("0.25s"), Duration::from_millis(250));
        assert_eq!(dur(".5m"), Duration::from_secs(30));
        assert_eq!(dur("1.s"), Duration::from_secs(1));
        assert_eq!(dur("1.5d"), Duration::from_secs(36 * 60 * 60));
    }

    #[test]
    fn negative_duration_strings_are_unset() {
        assert_eq!(parse_duration("-5s").unwrap(), None);
        assert_eq!(parse_duration("-1h30m").unwrap(), None);

        let config =
            serde_json::from_value::<RefreshConfig>(json!({ "interval": "-5s", "timeout": "-1m" }))
                .unwrap();
        assert_eq!(config.effective_interval(), DEFAULT_INTERVAL);
        assert_eq!(config.effective_timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn go_style_duration_values() {
        let config = serde_json::from_value::<RefreshConfig>(
            json!({ "interval": "1d", "timeout": "1.5s" }),
        )
        .unwrap();
        assert_eq!(config.effective_interval(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.effective_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn defaults_when_absent() {
        let config = serde_json::from_value::<RefreshConfig>(json!({})).unwrap();
        assert_eq!(config.effective_interval(), DEFAULT_INTERVAL);
        assert_eq!(config.effective_timeout(), DEFAULT_TIMEOUT);

        let config =
            serde_json::from_value::<RefreshConfig>(json!({ "interval": null })).unwrap();
        assert_eq!(config.effective_interval(), DEFAULT_INTERVAL);
    }

    #[test]
    fn defaults_when_zero_or_negative() {
        let config =
            serde_json::from_value::<RefreshConfig>(json!({ "interval": 0, "timeout": "0s" }))
                .unwrap();
        assert_eq!(config.effective_interval(), DEFAULT_INTERVAL);
        assert_eq!(config.effective_timeout(), DEFAULT_TIMEOUT);

        let config = serde_json::from_value::<RefreshConfig>(json!({ "timeout": -3 })).unwrap();
        assert_eq!(config.effective_timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn explicit_values() {
        let config =
            serde_json::from_value::<RefreshConfig>(json!({ "interval": "10m", "timeout": 5 }))
                .unwrap();
        assert_eq!(config.effective_interval(), Duration::from_secs(600));
        assert_eq!(config.effective_timeout(), Duration::from_secs(5));

        // no upper bound
        let config = RefreshConfig::default().interval(Duration::from_secs(60 * 60 * 24 * 365));
        assert_eq!(
            config.effective_interval(),
            Duration::from_secs(60 * 60 * 24 * 365)
        );
    }

    #[test]
    fn bad_duration_is_rejected() {
        serde_json::from_value::<RefreshConfig>(json!({ "interval": "soon" })).unwrap_err();
        serde_json::from_value::<RefreshConfig>(json!({ "timeout": true })).unwrap_err();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_json::from_value::<RefreshConfig>(json!({ "intreval": "1m" })).unwrap_err();
        assert!(err.to_string().contains("intreval"));

        serde_json::from_value::<DynamicRemoteIpConfig>(json!({ "provider": {} })).unwrap_err();
    }

    #[test]
    fn matcher_config_without_providers() {
        let config = serde_json::from_value::<DynamicRemoteIpConfig>(json!({})).unwrap();
        assert!(config.providers.is_none());
    }
}
