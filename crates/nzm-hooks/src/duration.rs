//! Duration text such as `30s`, `5m30s`, `1.5s` or `-10s`.
//!
//! Hook timeouts are signed: zero and negative values are the "unset"
//! sentinel and are resolved by the hook model, not rejected here.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid duration {input:?}: {reason}")]
pub struct DurationParseError {
    input: String,
    reason: &'static str,
}

/// A declared hook timeout. Positive values are real bounds; zero and
/// negative values mean "not set".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct HookTimeout {
    nanos: i64,
}

impl HookTimeout {
    pub const UNSET: HookTimeout = HookTimeout { nanos: 0 };

    pub const fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self {
            nanos: millis.saturating_mul(NANOS_PER_MILLI as i64),
        }
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self {
            nanos: secs.saturating_mul(NANOS_PER_SEC as i64),
        }
    }

    pub fn as_nanos(&self) -> i64 {
        self.nanos
    }

    /// The bound as a [`Duration`] when strictly positive.
    pub fn positive(&self) -> Option<Duration> {
        (self.nanos > 0).then(|| Duration::from_nanos(self.nanos as u64))
    }

    pub fn is_negative(&self) -> bool {
        self.nanos < 0
    }
}

impl From<Duration> for HookTimeout {
    fn from(d: Duration) -> Self {
        Self {
            nanos: i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        }
    }
}

impl fmt::Display for HookTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_nanos(self.nanos as i128))
    }
}

impl FromStr for HookTimeout {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_nanos(s).map(Self::from_nanos)
    }
}

impl TryFrom<String> for HookTimeout {
    type Error = DurationParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HookTimeout> for String {
    fn from(timeout: HookTimeout) -> Self {
        timeout.to_string()
    }
}

/// Render a duration the same way timeouts are written in config.
pub fn format_duration(d: &Duration) -> String {
    format_nanos(d.as_nanos() as i128)
}

/// `#[serde(serialize_with)]` helper emitting whole milliseconds.
pub(crate) fn serialize_millis<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn parse_nanos(input: &str) -> Result<i64, DurationParseError> {
    let fail = |reason| DurationParseError {
        input: input.to_string(),
        reason,
    };

    let mut rest = input.trim();
    let negative = match rest.as_bytes().first() {
        Some(b'-') => {
            rest = &rest[1..];
            true
        }
        Some(b'+') => {
            rest = &rest[1..];
            false
        }
        _ => false,
    };

    if rest == "0" {
        return Ok(0);
    }
    if rest.is_empty() {
        return Err(fail("empty duration"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, after_int) = rest.split_at(int_len);

        let (frac_digits, after_number) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(fail("expected a number"));
        }

        let unit_len = after_number
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after_number.len());
        let (unit, next) = after_number.split_at(unit_len);
        let unit_nanos = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => NANOS_PER_MIN,
            "h" => NANOS_PER_HOUR,
            "" => return Err(fail("missing unit")),
            _ => return Err(fail("unknown unit")),
        };

        let whole: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| fail("number too large"))?
        };
        let mut value = whole
            .checked_mul(unit_nanos)
            .ok_or_else(|| fail("number too large"))?;

        // Fractions beyond nanosecond precision contribute nothing.
        let frac_digits = &frac_digits[..frac_digits.len().min(18)];
        if !frac_digits.is_empty() {
            let frac: u128 = frac_digits.parse().map_err(|_| fail("bad fraction"))?;
            let scale = 10u128.pow(frac_digits.len() as u32);
            value += frac * unit_nanos / scale;
        }

        total = total
            .checked_add(value)
            .filter(|t| *t <= i64::MAX as u128)
            .ok_or_else(|| fail("duration too large"))?;
        rest = next;
    }

    let nanos = total as i64;
    Ok(if negative { -nanos } else { nanos })
}

fn format_nanos(nanos: i128) -> String {
    if nanos == 0 {
        return "0s".to_string();
    }
    let sign = if nanos < 0 { "-" } else { "" };
    let n = nanos.unsigned_abs();

    let body = if n < NANOS_PER_MICRO {
        format!("{n}ns")
    } else if n < NANOS_PER_MILLI {
        format!("{}µs", with_fraction(n, NANOS_PER_MICRO))
    } else if n < NANOS_PER_SEC {
        format!("{}ms", with_fraction(n, NANOS_PER_MILLI))
    } else {
        let hours = n / NANOS_PER_HOUR;
        let minutes = (n % NANOS_PER_HOUR) / NANOS_PER_MIN;
        let seconds = with_fraction(n % NANOS_PER_MIN, NANOS_PER_SEC);
        if hours > 0 {
            format!("{hours}h{minutes}m{seconds}s")
        } else if minutes > 0 {
            format!("{minutes}m{seconds}s")
        } else {
            format!("{seconds}s")
        }
    };
    format!("{sign}{body}")
}

fn with_fraction(n: u128, unit: u128) -> String {
    let whole = n / unit;
    let rem = n % unit;
    if rem == 0 {
        return whole.to_string();
    }
    let width = unit.ilog10() as usize;
    let frac = format!("{rem:0width$}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
