//! Rejection diagnostics
//!
//! A [`Diagnostic`] is a snapshot of the active path through a grammar at the
//! moment a byte was rejected. Building one never touches parser state.

use std::fmt;

use super::accumulator::{Bound, Reading};
use super::error::ParseError;

/// A byte rendered the way the console shows it: `'x'` or `0x0A`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Printable(pub u8);

impl fmt::Display for Printable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0x20..=0x7E => write!(f, "'{}'", self.0 as char),
            other => write!(f, "0x{:02X}", other),
        }
    }
}

/// Local state of one node on the active path
#[derive(Debug, Clone, PartialEq)]
pub enum Detail {
    None,
    Expected(u8),
    Literal {
        matched: usize,
        text: &'static str,
    },
    Number {
        bound: Bound,
        so_far: Reading,
    },
    Captured {
        len: usize,
        capacity: usize,
        dropped: usize,
    },
    Discarded {
        count: usize,
        first_seen: Option<u8>,
    },
    OneOf(&'static str),
    /// Position inside a sequence
    Step {
        index: usize,
        len: usize,
    },
    /// Alternative an alternate committed to
    Chose(usize),
    /// Every alternative tried, when none matched
    Alternatives(Vec<&'static str>),
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detail::None => Ok(()),
            Detail::Expected(byte) => write!(f, "expected {}", Printable(*byte)),
            Detail::Literal { matched, text } => write!(f, "[{}] {:?}", matched, text),
            Detail::Number { bound, so_far } => write!(f, "{} so far {}", bound, so_far),
            Detail::Captured {
                len,
                capacity,
                dropped,
            } => write!(f, "captured {}/{} dropped {}", len, capacity, dropped),
            Detail::Discarded { count, first_seen } => match first_seen {
                Some(first) => write!(f, "discarded {} from {}", count, Printable(*first)),
                None => write!(f, "discarded {}", count),
            },
            Detail::OneOf(set) => write!(f, "expected one of {:?}", set),
            Detail::Step { index, len } => write!(f, "sequence[{}] of {}", index, len),
            Detail::Chose(index) => write!(f, "alternative[{}]", index),
            Detail::Alternatives(whys) => write!(f, "expected one of: {}", whys.join(", ")),
        }
    }
}

/// One node on the active path
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub why: &'static str,
    pub error: Option<ParseError>,
    pub detail: Detail,
}

/// Why a byte was rejected, outermost node first
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub byte: u8,
    pub frames: Vec<Frame>,
}

impl Diagnostic {
    /// The innermost node that has an error
    pub fn culprit(&self) -> Option<&Frame> {
        self.frames.iter().rev().find(|frame| frame.error.is_some())
    }

    pub fn error(&self) -> Option<ParseError> {
        self.culprit().and_then(|frame| frame.error)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in self.frames.iter().rev() {
            write!(f, "# Bad input during {} {}", frame.why, Printable(self.byte))?;
            if let Some(error) = frame.error {
                write!(f, " {}", error)?;
            }
            writeln!(f)?;
            if frame.detail != Detail::None {
                writeln!(f, "#  {}", frame.detail)?;
            }
        }
        Ok(())
    }
}
