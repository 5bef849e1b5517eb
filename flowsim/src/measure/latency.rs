use flowsim_core::{VirtualTime, time::DurationParseError};
use std::{fmt, str::FromStr, time::Duration};

/// One-way propagation delay of a [`Link`].
///
/// Every packet that is not dropped takes at least this long to reach the
/// other end.
///
/// ```
/// # use flowsim::measure::Latency;
/// let latency: Latency = "2ms".parse().unwrap();
/// assert_eq!(latency, Latency::from_millis(2));
/// assert_eq!(Latency::default().to_string(), "5ms");
/// ```
///
/// [`Link`]: crate::link::Link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Latency(VirtualTime);

impl Latency {
    pub const ZERO: Self = Self::new(VirtualTime::ZERO);

    #[inline(always)]
    pub const fn new(time: VirtualTime) -> Self {
        Self(time)
    }

    #[inline(always)]
    pub const fn from_millis(millis: u64) -> Self {
        Self(VirtualTime::from_millis(millis))
    }

    #[inline(always)]
    pub fn into_time(self) -> VirtualTime {
        self.0
    }
}

impl From<VirtualTime> for Latency {
    fn from(value: VirtualTime) -> Self {
        Self::new(value)
    }
}

impl From<Duration> for Latency {
    fn from(value: Duration) -> Self {
        Self::new(value.into())
    }
}

impl From<Latency> for VirtualTime {
    fn from(value: Latency) -> Self {
        value.into_time()
    }
}

impl Default for Latency {
    fn default() -> Self {
        crate::defaults::DEFAULT_LATENCY
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Latency {
    type Err = DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default() {
        assert_eq!(Latency::default(), crate::defaults::DEFAULT_LATENCY);
    }

    #[test]
    fn display() {
        assert_eq!(Latency::from_millis(150).to_string(), "150ms");
        assert_eq!(Latency::from_millis(1_542).to_string(), "1.542s");
        assert_eq!(Latency::new(VirtualTime::from_nanos(1_542)).to_string(), "1.542µs");
    }

    #[test]
    fn parse() {
        assert_eq!(Latency::from_millis(150), "150ms".parse().unwrap());
        assert_eq!(Latency::from_millis(1_542), "1s542ms".parse().unwrap());
        assert_eq!(Latency::new(VirtualTime::from_micros(1)), "1µs".parse().unwrap());
    }

    #[test]
    fn parse_invalid_strings() {
        assert!("150".parse::<Latency>().is_err());
        assert!("abc".parse::<Latency>().is_err());
        assert!("".parse::<Latency>().is_err());
    }

    #[test]
    fn display_round_trip() {
        let original = Latency::from_millis(1_542);
        let parsed: Latency = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn conversions() {
        let latency: Latency = Duration::from_millis(42).into();
        assert_eq!(latency, Latency::from_millis(42));
        assert_eq!(VirtualTime::from(latency), VirtualTime::from_millis(42));
    }
}
