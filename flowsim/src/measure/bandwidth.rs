use anyhow::{bail, ensure};
use flowsim_core::VirtualTime;
use logos::{Lexer, Logos};
use std::{fmt, str::FromStr};

/// Data rate of a [`Link`], in bits per second.
///
/// It only determines the serialisation delay of a packet (the time it
/// takes to put its bytes on the wire). There is no queueing: two packets
/// sent at the same instant are serialised in parallel.
///
/// Units are decimal, `1kbps` is `1_000bps`.
///
/// ```
/// # use flowsim::measure::Bandwidth;
/// # use flowsim_core::VirtualTime;
/// let bw: Bandwidth = "5mbps".parse().unwrap();
/// assert_eq!(bw.bits_per_sec(), 5_000_000);
/// // 1_250 bytes is 10_000 bits, 2ms at 5mbps
/// assert_eq!(bw.transmission_time(1_250), VirtualTime::from_millis(2));
/// ```
///
/// [`Link`]: crate::link::Link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bandwidth(u64);

const K: u64 = 1_000;
const M: u64 = 1_000 * K;
const G: u64 = 1_000 * M;

const NANOS_PER_SEC: u128 = 1_000_000_000;

impl Bandwidth {
    /// No serialisation delay at all.
    pub const UNLIMITED: Self = Self(u64::MAX);

    #[inline(always)]
    pub const fn new(bits_per_sec: u64) -> Self {
        Self(bits_per_sec)
    }

    #[inline(always)]
    pub const fn from_kbps(kbps: u64) -> Self {
        Self(kbps.saturating_mul(K))
    }

    #[inline(always)]
    pub const fn from_mbps(mbps: u64) -> Self {
        Self(mbps.saturating_mul(M))
    }

    #[inline(always)]
    pub const fn bits_per_sec(self) -> u64 {
        self.0
    }

    pub const fn is_unlimited(self) -> bool {
        self.0 == u64::MAX
    }

    /// Time to serialise `size` bytes, rounded up to the nanosecond.
    ///
    /// A zero bandwidth never finishes: the result is [`VirtualTime::MAX`].
    pub fn transmission_time(self, size: u32) -> VirtualTime {
        if self.is_unlimited() {
            return VirtualTime::ZERO;
        }
        if self.0 == 0 {
            return VirtualTime::MAX;
        }
        let bits = u128::from(size) * 8;
        let nanos = (bits * NANOS_PER_SEC).div_ceil(u128::from(self.0));
        VirtualTime::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Default for Bandwidth {
    fn default() -> Self {
        crate::defaults::DEFAULT_BANDWIDTH
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;

        if self.is_unlimited() {
            f.write_str("unlimited")
        } else if v < K || v % K != 0 {
            write!(f, "{v}bps")
        } else if v < M || v % M != 0 {
            write!(f, "{}kbps", v / K)
        } else if v < G || v % G != 0 {
            write!(f, "{}mbps", v / M)
        } else {
            write!(f, "{}gbps", v / G)
        }
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum BandwidthToken {
    #[token("bps")]
    Bps,
    #[token("kbps")]
    Kbps,
    #[token("mbps")]
    Mbps,
    #[token("gbps")]
    Gbps,
    #[token("unlimited")]
    Unlimited,

    #[regex("[0-9]+")]
    Value,
}

impl FromStr for Bandwidth {
    type Err = anyhow::Error;

    /// Parses `<integer><unit>` with the unit one of `bps`, `kbps`, `mbps`
    /// or `gbps` (case insensitive), or `unlimited`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.to_ascii_lowercase();
        let mut lex = Lexer::<'_, BandwidthToken>::new(&input);

        let number: u64 = match lex.next() {
            Some(Ok(BandwidthToken::Value)) => lex.slice().parse()?,
            Some(Ok(BandwidthToken::Unlimited)) => {
                ensure!(lex.next().is_none(), "Unexpected input after `unlimited' in `{s}'");
                return Ok(Self::UNLIMITED);
            }
            _ => bail!("Expecting to parse a number, cannot parse `{s}'"),
        };
        let Some(Ok(token)) = lex.next() else {
            bail!("Expecting to parse a unit (bps, kbps, mbps, gbps) in `{s}'")
        };
        let multiplier = match token {
            BandwidthToken::Bps => 1,
            BandwidthToken::Kbps => K,
            BandwidthToken::Mbps => M,
            BandwidthToken::Gbps => G,
            BandwidthToken::Value | BandwidthToken::Unlimited => {
                bail!("Expecting to parse a unit (bps, kbps, mbps, gbps) in `{s}'")
            }
        };
        let Some(bps) = number.checked_mul(multiplier) else {
            bail!("Bandwidth `{s}' is too large")
        };

        ensure!(
            lex.next().is_none(),
            "Not expecting any other tokens to parse a bandwidth: `{s}'"
        );

        Ok(Self::new(bps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bandwidth() {
        macro_rules! assert_bandwidth {
            ($string:literal == $value:expr) => {
                assert_eq!($string.parse::<Bandwidth>().unwrap(), Bandwidth::new($value));
            };
        }

        assert_bandwidth!("0bps" == 0);
        assert_bandwidth!("42bps" == 42);
        assert_bandwidth!("42kbps" == 42_000);
        assert_bandwidth!("42mbps" == 42_000_000);
        assert_bandwidth!("5Mbps" == 5_000_000);
        assert_bandwidth!("1 gbps" == 1_000_000_000);
        assert_bandwidth!("unlimited" == u64::MAX);
    }

    #[test]
    fn print_bandwidth() {
        assert_eq!(Bandwidth::new(0).to_string(), "0bps");
        assert_eq!(Bandwidth::new(1_500).to_string(), "1500bps");
        assert_eq!(Bandwidth::from_kbps(448).to_string(), "448kbps");
        assert_eq!(Bandwidth::from_mbps(5).to_string(), "5mbps");
        assert_eq!(Bandwidth::from_mbps(2_000).to_string(), "2gbps");
        assert_eq!(Bandwidth::UNLIMITED.to_string(), "unlimited");
    }

    #[test]
    fn display_round_trip() {
        for bw in [
            Bandwidth::new(7),
            Bandwidth::from_kbps(1_001),
            Bandwidth::from_mbps(100),
            Bandwidth::UNLIMITED,
        ] {
            assert_eq!(bw.to_string().parse::<Bandwidth>().unwrap(), bw);
        }
    }

    #[test]
    fn transmission_time() {
        let bw = Bandwidth::from_mbps(8);
        assert_eq!(bw.transmission_time(1_000), VirtualTime::from_millis(1));
        assert_eq!(bw.transmission_time(0), VirtualTime::ZERO);

        // a byte at 3bps is 8/3 of a second, rounded up
        assert_eq!(
            Bandwidth::new(3).transmission_time(1),
            VirtualTime::from_nanos(2_666_666_667)
        );
    }

    #[test]
    fn extreme_bandwidths() {
        assert_eq!(Bandwidth::UNLIMITED.transmission_time(u32::MAX), VirtualTime::ZERO);
        assert_eq!(Bandwidth::new(0).transmission_time(1), VirtualTime::MAX);
        // does not fit in a u64 of nanoseconds
        assert_eq!(Bandwidth::new(1).transmission_time(u32::MAX), VirtualTime::MAX);
    }

    #[test]
    fn parse_invalid_strings() {
        assert!("42".parse::<Bandwidth>().is_err()); // no unit
        assert!("mbps".parse::<Bandwidth>().is_err()); // no number
        assert!("".parse::<Bandwidth>().is_err());
        assert!("42mbps extra".parse::<Bandwidth>().is_err());
        assert!("99999999999999999gbps".parse::<Bandwidth>().is_err());
    }

    #[test]
    fn ordering() {
        assert!(Bandwidth::from_kbps(1) < Bandwidth::from_mbps(1));
        assert!(Bandwidth::from_mbps(1) < Bandwidth::UNLIMITED);
    }
}
