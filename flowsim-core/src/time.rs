//! Virtual (simulated) time.
//!
//! [`VirtualTime`] is the non-negative instant/duration type used by the
//! whole crate. It has nothing to do with wall-clock time: it only moves
//! when the [`Scheduler`] pops an event.
//!
//! [`TimeDelta`] is its signed counterpart. It exists so that a caller can
//! express (and the scheduler can reject) a negative delay, and so that the
//! difference between two trace timestamps can be computed before being
//! clamped.
//!
//! [`Scheduler`]: crate::scheduler::Scheduler

use logos::{Lexer, Logos};
use std::{
    fmt,
    ops::{Add, AddAssign},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point in (or span of) simulated time, with nanosecond precision.
///
/// ```
/// # use flowsim_core::VirtualTime;
/// let t: VirtualTime = "1s 500ms".parse().unwrap();
/// assert_eq!(t, VirtualTime::from_millis(1_500));
/// assert_eq!(t.to_string(), "1.5s");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualTime(u64);

/// A signed difference between two [`VirtualTime`]s, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeDelta(i64);

/// Error returned when converting a floating point number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("virtual time must be a finite, non-negative number of seconds, got {0}")]
pub struct InvalidSeconds(pub f64);

/// Error returned when parsing a [`VirtualTime`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("unexpected input `{0}'")]
    UnexpectedToken(String),
    #[error("expecting duration to start with a number")]
    ExpectingNumber,
    #[error("expecting a unit (ns, us, ms, s, m) after `{0}'")]
    ExpectingUnit(String),
    #[error("number `{0}' is too large")]
    Overflow(String),
    #[error("empty duration")]
    Empty,
}

impl VirtualTime {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u64::MAX);

    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros.saturating_mul(NANOS_PER_MICRO))
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(NANOS_PER_MILLI))
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Build a [`VirtualTime`] from a floating point number of seconds.
    ///
    /// Sub-nanosecond precision is rounded to the nearest nanosecond.
    ///
    /// # Errors
    ///
    /// [`InvalidSeconds`] if `secs` is negative, NaN or infinite.
    pub fn from_secs_f64(secs: f64) -> Result<Self, InvalidSeconds> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(InvalidSeconds(secs));
        }
        let nanos = (secs * NANOS_PER_SEC as f64).round();
        if nanos >= u64::MAX as f64 {
            Ok(Self::MAX)
        } else {
            Ok(Self(nanos as u64))
        }
    }

    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    #[inline]
    pub fn into_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use = "function does not modify the current value"]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    #[must_use = "function does not modify the current value"]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// `|self - other|`
    pub const fn abs_diff(self, other: Self) -> Self {
        Self(self.0.abs_diff(other.0))
    }

    /// The signed distance from `earlier` to `self`.
    ///
    /// ```
    /// # use flowsim_core::{TimeDelta, VirtualTime};
    /// let a = VirtualTime::from_secs(1);
    /// let b = VirtualTime::from_secs(3);
    /// assert_eq!(b.delta_since(a), TimeDelta::from_secs(2));
    /// assert_eq!(a.delta_since(b), TimeDelta::from_secs(-2));
    /// ```
    pub fn delta_since(self, earlier: Self) -> TimeDelta {
        let delta = self.0 as i128 - earlier.0 as i128;
        TimeDelta(delta.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    /// Offset `self` by a signed delta, `None` if the result would be
    /// negative or overflow.
    pub fn checked_add_delta(self, delta: TimeDelta) -> Option<Self> {
        let value = self.0 as i128 + delta.0 as i128;
        u64::try_from(value).ok().map(Self)
    }
}

impl TimeDelta {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros.saturating_mul(NANOS_PER_MICRO as i64))
    }

    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(NANOS_PER_MILLI as i64))
    }

    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SEC as i64))
    }

    /// Saturating conversion from floating point seconds. NaN maps to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() {
            return Self::ZERO;
        }
        Self((secs * NANOS_PER_SEC as f64).round() as i64)
    }

    #[inline]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// The delta as a [`VirtualTime`], `None` if it is negative.
    pub const fn to_virtual_time(self) -> Option<VirtualTime> {
        if self.0 < 0 {
            None
        } else {
            Some(VirtualTime(self.0 as u64))
        }
    }

    /// `max(0, self)`
    pub const fn clamp_non_negative(self) -> VirtualTime {
        if self.0 < 0 {
            VirtualTime::ZERO
        } else {
            VirtualTime(self.0 as u64)
        }
    }
}

impl From<Duration> for VirtualTime {
    fn from(value: Duration) -> Self {
        Self(u64::try_from(value.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<VirtualTime> for Duration {
    fn from(value: VirtualTime) -> Self {
        value.into_duration()
    }
}

impl From<VirtualTime> for TimeDelta {
    fn from(value: VirtualTime) -> Self {
        Self(i64::try_from(value.0).unwrap_or(i64::MAX))
    }
}

impl From<Duration> for TimeDelta {
    fn from(value: Duration) -> Self {
        VirtualTime::from(value).into()
    }
}

impl Add for VirtualTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl AddAssign for VirtualTime {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl std::iter::Sum for VirtualTime {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Duration as fmt::Debug>::fmt(&self.into_duration(), f)
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            f.write_str("-")?;
        }
        let magnitude = Duration::from_nanos(self.0.unsigned_abs());
        <Duration as fmt::Debug>::fmt(&magnitude, f)
    }
}

impl FromStr for VirtualTime {
    type Err = DurationParseError;

    /// Parses a sum of `<number><unit>` terms, e.g. `"1s 200ms"` or
    /// `"1.5s"`. Fractions finer than a nanosecond are truncated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, Token>::new(s);
        let mut total = Self::ZERO;
        let mut terms = 0usize;

        while let Some(next) = lex.next() {
            let number =
                next.map_err(|()| DurationParseError::UnexpectedToken(lex.slice().to_owned()))?;
            if number != Token::Value {
                return Err(DurationParseError::ExpectingNumber);
            }
            let literal = lex.slice().to_owned();

            let Some(Ok(unit)) = lex.next() else {
                return Err(DurationParseError::ExpectingUnit(literal));
            };
            let unit_nanos = match unit {
                Token::NanoSeconds => 1,
                Token::MicroSeconds => NANOS_PER_MICRO,
                Token::MilliSeconds => NANOS_PER_MILLI,
                Token::Seconds => NANOS_PER_SEC,
                Token::Minutes => 60 * NANOS_PER_SEC,
                Token::Value => return Err(DurationParseError::ExpectingUnit(literal)),
            };
            let term = scale(&literal, unit_nanos)
                .ok_or_else(|| DurationParseError::Overflow(literal.clone()))?;
            total += Self(term);
            terms += 1;
        }

        if terms == 0 {
            return Err(DurationParseError::Empty);
        }
        Ok(total)
    }
}

/// `literal` (digits with an optional fraction) times `unit_nanos`, exact
/// down to the nanosecond.
fn scale(literal: &str, unit_nanos: u64) -> Option<u64> {
    let (whole, fraction) = literal.split_once('.').unwrap_or((literal, ""));
    let whole = whole.parse::<u64>().ok()?.checked_mul(unit_nanos)?;

    // a unit is at most 6e10ns, 19 fraction digits are already below 1ns
    let fraction = &fraction[..fraction.len().min(19)];
    if fraction.is_empty() {
        return Some(whole);
    }
    let numerator = fraction.parse::<u128>().ok()? * u128::from(unit_nanos);
    let denominator = 10u128.pow(fraction.len() as u32);
    whole.checked_add((numerator / denominator) as u64)
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|µs|μs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Value,
}
