//! Relative time units used for expiry policies and range queries

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

const SECS_PER_MINUTE: f64 = 60.0;
const SECS_PER_HOUR: f64 = 60.0 * SECS_PER_MINUTE;
const SECS_PER_DAY: f64 = 24.0 * SECS_PER_HOUR;
/// Months are a flat 30 days, no calendar arithmetic
const SECS_PER_MONTH: f64 = 30.0 * SECS_PER_DAY;

/// Expiry instant used for `TimeSpec::Never`: 68 years after the Unix epoch
const NEVER_EXPIRES_SECS: i64 = 60 * 60 * 24 * 365 * 68;

/// A relative span of time.
///
/// Magnitudes may be negative or fractional. A negative expiry yields an
/// instant already in the past, which is how callers simulate expiration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeSpec {
    Seconds(f64),
    Minutes(f64),
    Hours(f64),
    Days(f64),
    Months(f64),
    /// Only meaningful as an expiry policy. As a range-query bound it
    /// collapses to "now".
    Never,
}

impl TimeSpec {
    /// Length of the span, or `None` for `Never`
    pub fn duration(&self) -> Option<Duration> {
        let secs = match *self {
            TimeSpec::Seconds(n) => n,
            TimeSpec::Minutes(n) => n * SECS_PER_MINUTE,
            TimeSpec::Hours(n) => n * SECS_PER_HOUR,
            TimeSpec::Days(n) => n * SECS_PER_DAY,
            TimeSpec::Months(n) => n * SECS_PER_MONTH,
            TimeSpec::Never => return None,
        };
        // Float-to-int casts saturate, so absurd magnitudes clamp instead of wrapping
        Some(Duration::microseconds((secs * 1_000_000.0).round() as i64))
    }

    /// The instant this span lies before `now`
    pub fn past_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.duration() {
            Some(span) => shift(now, -span),
            None => now,
        }
    }

    /// The instant this span lies after `now`
    pub fn future_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.duration() {
            Some(span) => shift(now, span),
            None => never_expires(),
        }
    }

    /// `past_from` against the wall clock
    pub fn to_past_instant(&self) -> DateTime<Utc> {
        self.past_from(Utc::now())
    }

    /// `future_from` against the wall clock
    pub fn to_future_instant(&self) -> DateTime<Utc> {
        self.future_from(Utc::now())
    }
}

/// Fixed far-future instant assigned to objects that never expire
pub fn never_expires() -> DateTime<Utc> {
    DateTime::from_timestamp(NEVER_EXPIRES_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn shift(now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    now.checked_add_signed(by).unwrap_or(if by < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSpec::Seconds(n) => write!(f, "{n}s"),
            TimeSpec::Minutes(n) => write!(f, "{n}m"),
            TimeSpec::Hours(n) => write!(f, "{n}h"),
            TimeSpec::Days(n) => write!(f, "{n}d"),
            TimeSpec::Months(n) => write!(f, "{n}mo"),
            TimeSpec::Never => write!(f, "never"),
        }
    }
}

/// Error returned when a `TimeSpec` literal cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeSpecError(String);

impl fmt::Display for ParseTimeSpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid time span '{}': expected <number><s|m|h|d|mo> or 'never'",
            self.0
        )
    }
}

impl std::error::Error for ParseTimeSpecError {}

impl FromStr for TimeSpec {
    type Err = ParseTimeSpecError;

    /// Parses literals such as `30s`, `-10s`, `5m`, `1.5h`, `7d`, `1mo` and `never`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("never") {
            return Ok(TimeSpec::Never);
        }

        let invalid = || ParseTimeSpecError(s.to_string());

        let (number, unit): (&str, fn(f64) -> TimeSpec) =
            if let Some(number) = trimmed.strip_suffix("mo") {
                (number, TimeSpec::Months)
            } else if let Some(number) = trimmed.strip_suffix('s') {
                (number, TimeSpec::Seconds)
            } else if let Some(number) = trimmed.strip_suffix('m') {
                (number, TimeSpec::Minutes)
            } else if let Some(number) = trimmed.strip_suffix('h') {
                (number, TimeSpec::Hours)
            } else if let Some(number) = trimmed.strip_suffix('d') {
                (number, TimeSpec::Days)
            } else {
                return Err(invalid());
            };

        let magnitude: f64 = number.trim().parse().map_err(|_| invalid())?;
        if !magnitude.is_finite() {
            return Err(invalid());
        }
        Ok(unit(magnitude))
    }
}
