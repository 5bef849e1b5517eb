//! Recorded traffic traces.
//!
//! A trace is an ordered, finite sequence of [`TraceEvent`]s: "send `size`
//! bytes `relative_time` after the start of the trace".
//!
//! # Text format
//!
//! One event per line, the time (non-negative decimal seconds) then the
//! size (positive integer byte count), separated by whitespace and/or a
//! comma. Blank lines and `#` comments are ignored.
//!
//! ```text
//! # time, size
//! 0.000, 1400
//! 0.020  1400
//! 0.045,512
//! ```
//!
//! Sortedness is not checked here, [`TraceReplay::start`] rejects
//! unsorted traces.
//!
//! [`TraceReplay::start`]: crate::replay::TraceReplay::start

use crate::time::VirtualTime;
use logos::{Lexer, Logos};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub relative_time: VirtualTime,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct TraceParseError {
    /// 1-based line number in the input
    pub line: usize,
    pub kind: TraceParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceParseErrorKind {
    #[error("unexpected input `{0}'")]
    UnexpectedToken(String),
    #[error("expecting a time then a size")]
    MissingField,
    #[error("unexpected trailing input `{0}'")]
    TrailingInput(String),
    #[error("time cannot be negative")]
    NegativeTime,
    #[error("invalid time `{0}'")]
    InvalidTime(String),
    #[error("invalid size `{0}', expecting a positive integer")]
    InvalidSize(String),
}

#[derive(Logos, Debug, PartialEq, Clone, Copy)]
#[logos(skip r"[ \t\r\f]+")]
enum TraceToken {
    #[token(",")]
    Comma,
    #[token("-")]
    Minus,
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?")]
    Number,
}

impl TraceEvent {
    pub const fn new(relative_time: VirtualTime, size: u32) -> Self {
        Self {
            relative_time,
            size,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.relative_time.as_secs_f64(), self.size)
    }
}

/// Parse a trace in the text format described in the [module](self)
/// documentation.
///
/// ```
/// # use flowsim_core::{parse_trace, VirtualTime};
/// let trace = parse_trace("0 100\n1, 200\n\n# gap\n3.5,150\n").unwrap();
/// assert_eq!(trace.len(), 3);
/// assert_eq!(trace[2].relative_time, VirtualTime::from_millis(3_500));
/// assert_eq!(trace[2].size, 150);
/// ```
pub fn parse_trace(input: &str) -> Result<Vec<TraceEvent>, TraceParseError> {
    let mut events = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let content = match line.split_once('#') {
            Some((content, _comment)) => content,
            None => line,
        };
        if content.trim().is_empty() {
            continue;
        }

        let event = parse_line(content).map_err(|kind| TraceParseError {
            line: index + 1,
            kind,
        })?;
        events.push(event);
    }

    Ok(events)
}

fn parse_line(line: &str) -> Result<TraceEvent, TraceParseErrorKind> {
    let mut lex = Lexer::<'_, TraceToken>::new(line);

    let time = next_number(&mut lex, line, Field::Time)?;
    let relative_time = time
        .parse::<f64>()
        .ok()
        .and_then(|secs| VirtualTime::from_secs_f64(secs).ok())
        .ok_or_else(|| TraceParseErrorKind::InvalidTime(time.to_owned()))?;

    if lex.clone().next() == Some(Ok(TraceToken::Comma)) {
        lex.next();
    }

    let size = next_number(&mut lex, line, Field::Size)?;
    let size = size
        .parse::<u32>()
        .ok()
        .filter(|size| *size > 0)
        .ok_or_else(|| TraceParseErrorKind::InvalidSize(size.to_owned()))?;

    if lex.next().is_some() {
        let rest = &line[lex.span().start..];
        return Err(TraceParseErrorKind::TrailingInput(rest.trim().to_owned()));
    }

    Ok(TraceEvent {
        relative_time,
        size,
    })
}

#[derive(Clone, Copy)]
enum Field {
    Time,
    Size,
}

fn next_number<'a>(
    lex: &mut Lexer<'a, TraceToken>,
    line: &str,
    field: Field,
) -> Result<&'a str, TraceParseErrorKind> {
    match lex.next() {
        Some(Ok(TraceToken::Number)) => Ok(lex.slice()),
        Some(Ok(TraceToken::Minus)) => match field {
            Field::Time => Err(TraceParseErrorKind::NegativeTime),
            Field::Size => {
                let rest = line[lex.span().start..].trim();
                Err(TraceParseErrorKind::InvalidSize(rest.to_owned()))
            }
        },
        Some(Ok(TraceToken::Comma)) | None => Err(TraceParseErrorKind::MissingField),
        Some(Err(())) => Err(TraceParseErrorKind::UnexpectedToken(lex.slice().to_owned())),
    }
}
