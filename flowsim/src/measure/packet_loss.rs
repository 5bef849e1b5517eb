use logos::{Lexer, Logos};
use rand_core::Rng;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Which packets a [`Link`] drops.
///
/// Drops are decided when the packet is handed to the link, so a dropped
/// packet is reported to the monitor at its send time.
///
/// ```
/// use flowsim::measure::PacketLoss;
///
/// let lossy: PacketLoss = "5%".parse().unwrap();
/// assert_eq!(lossy, PacketLoss::rate(0.05).unwrap());
///
/// // drop exactly the 3rd and the 8th packet sent on the link
/// let listed: PacketLoss = "list[2, 7]".parse().unwrap();
/// assert_eq!(listed.to_string(), "list[2,7]");
/// ```
///
/// [`Link`]: crate::link::Link
#[derive(Default, Debug, Clone, PartialEq)]
pub enum PacketLoss {
    /// Every packet gets through.
    #[default]
    None,
    /// Each packet is dropped independently with the given probability,
    /// drawn from the caller's random number generator.
    Rate(LossRate),
    /// Drop exactly the packets with these sequence numbers (0-based, in
    /// send order on the link), sorted and deduplicated.
    List(Vec<u64>),
}

/// A probability in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossRate(f64);

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("packet loss rate must be in [0.0, 1.0], got {0}")]
pub struct LossRateError(f64);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PacketLossParseError {
    #[error("unexpected input `{0}'")]
    UnexpectedToken(String),
    #[error("expecting a percentage (`5%') or a list (`list[1,2]')")]
    Expecting,
    #[error("invalid number `{0}'")]
    InvalidNumber(String),
    #[error("unexpected trailing input")]
    TrailingInput,
    #[error("{0}")]
    OutOfRange(#[from] LossRateError),
}

impl PacketLoss {
    /// # Errors
    ///
    /// [`LossRateError`] if `rate` is not in `[0.0, 1.0]` (NaN included).
    pub fn rate(rate: f64) -> Result<Self, LossRateError> {
        LossRate::new(rate).map(Self::Rate)
    }

    pub fn list(sequences: impl IntoIterator<Item = u64>) -> Self {
        let mut sequences: Vec<_> = sequences.into_iter().collect();
        sequences.sort_unstable();
        sequences.dedup();
        Self::List(sequences)
    }

    /// Whether the packet with the given link `sequence` number is dropped.
    ///
    /// Only [`PacketLoss::Rate`] draws from `rng`, so adding a
    /// deterministic loss model does not shift the random sequence of other
    /// links sharing the generator.
    pub fn should_drop<R: Rng>(&self, sequence: u64, rng: &mut R) -> bool {
        match self {
            Self::None => false,
            Self::Rate(rate) => {
                // 53 random bits give a uniform sample in [0, 1)
                let sample = (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64);
                sample < rate.0
            }
            Self::List(sequences) => sequences.binary_search(&sequence).is_ok(),
        }
    }
}

impl LossRate {
    pub fn new(rate: f64) -> Result<Self, LossRateError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(LossRateError(rate));
        }
        Ok(Self(rate))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for LossRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let percent = self.0 * 100.0;
        if percent.fract() == 0.0 {
            write!(f, "{}%", percent as u64)
        } else {
            write!(f, "{percent:.2}%")
        }
    }
}

impl fmt::Display for PacketLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("0%"),
            Self::Rate(rate) => fmt::Display::fmt(rate, f),
            Self::List(sequences) => {
                f.write_str("list[")?;
                for (i, sequence) in sequences.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{sequence}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[derive(Logos, Debug, PartialEq, Clone, Copy)]
#[logos(skip r"[ \t\n\f]+")]
enum LossToken {
    #[token("%")]
    Percent,
    #[token("list")]
    List,
    #[token("[")]
    Open,
    #[token("]")]
    Close,
    #[token(",")]
    Comma,
    #[token("-")]
    Minus,
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,
}

impl FromStr for PacketLoss {
    type Err = PacketLossParseError;

    /// Parses `"<percent>%"` (`"0%"` is [`PacketLoss::None`]) or
    /// `"list[<seq>, ...]"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, LossToken>::new(s);

        let loss = match next(&mut lex)? {
            LossToken::Number => {
                let literal = lex.slice();
                let percent: f64 = literal
                    .parse()
                    .map_err(|_| PacketLossParseError::InvalidNumber(literal.to_owned()))?;
                if next(&mut lex)? != LossToken::Percent {
                    return Err(PacketLossParseError::Expecting);
                }
                if percent == 0.0 {
                    Self::None
                } else {
                    Self::rate(percent / 100.0)?
                }
            }
            LossToken::Minus => {
                if next(&mut lex)? != LossToken::Number {
                    return Err(PacketLossParseError::Expecting);
                }
                let literal = lex.slice();
                let percent: f64 = literal
                    .parse()
                    .map_err(|_| PacketLossParseError::InvalidNumber(literal.to_owned()))?;
                return Err(LossRateError(-percent / 100.0).into());
            }
            LossToken::List => parse_list(&mut lex)?,
            _ => return Err(PacketLossParseError::Expecting),
        };

        if lex.next().is_some() {
            return Err(PacketLossParseError::TrailingInput);
        }
        Ok(loss)
    }
}

fn next(lex: &mut Lexer<'_, LossToken>) -> Result<LossToken, PacketLossParseError> {
    match lex.next() {
        Some(Ok(token)) => Ok(token),
        Some(Err(())) => Err(PacketLossParseError::UnexpectedToken(lex.slice().to_owned())),
        None => Err(PacketLossParseError::Expecting),
    }
}

fn parse_list(lex: &mut Lexer<'_, LossToken>) -> Result<PacketLoss, PacketLossParseError> {
    if next(lex)? != LossToken::Open {
        return Err(PacketLossParseError::Expecting);
    }

    let mut sequences: Vec<u64> = Vec::new();
    loop {
        match next(lex)? {
            LossToken::Close if sequences.is_empty() => break,
            LossToken::Number => {
                let literal = lex.slice();
                let sequence = literal
                    .parse()
                    .map_err(|_| PacketLossParseError::InvalidNumber(literal.to_owned()))?;
                sequences.push(sequence);
            }
            _ => return Err(PacketLossParseError::Expecting),
        }
        match next(lex)? {
            LossToken::Comma => continue,
            LossToken::Close => break,
            _ => return Err(PacketLossParseError::Expecting),
        }
    }

    Ok(PacketLoss::list(sequences))
}
