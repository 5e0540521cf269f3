//! Leaf parsers
//!
//! Terminal matchers with no children. Each leaf decides the fate of a single
//! byte and reports it as a [`Step`]; the grammar arena owns the shared node
//! status (`done`, `at_start`, error) and the completion hooks.

use std::cell::{Cell, RefCell};
use std::fmt;

use tracing::{debug, trace, warn};

use super::accumulator::Accumulator;
use super::diagnostic::{Detail, Printable};
use super::error::ParseError;

/// Outcome of offering one byte to a parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Accepted, more input expected
    Pending,
    /// Accepted, and this byte completed the grammar
    Complete,
    /// Not valid at this position
    Reject(ParseError),
}

/// Exactly one byte, optionally stored
pub(crate) struct CharMatch<'a> {
    expected: u8,
    dest: Option<&'a Cell<u8>>,
}

impl<'a> CharMatch<'a> {
    pub(crate) fn new(expected: u8, dest: Option<&'a Cell<u8>>) -> Self {
        Self { expected, dest }
    }

    fn consume(&mut self, byte: u8) -> Step {
        if byte != self.expected {
            return Step::Reject(ParseError::UnexpectedCharacter);
        }
        if let Some(dest) = self.dest {
            dest.set(byte);
        }
        Step::Complete
    }
}

/// An exact string, no partial-prefix retry
pub(crate) struct Literal {
    text: &'static str,
    cursor: usize,
}

impl Literal {
    pub(crate) fn new(text: &'static str) -> Self {
        Self { text, cursor: 0 }
    }

    fn consume(&mut self, byte: u8) -> Step {
        match self.text.as_bytes().get(self.cursor) {
            Some(&expected) if expected == byte => {
                self.cursor += 1;
                if self.cursor == self.text.len() {
                    Step::Complete
                } else {
                    Step::Pending
                }
            }
            _ => Step::Reject(ParseError::DidNotMatchLiteral),
        }
    }
}

/// Everything up to a delimiter, into a bounded caller buffer
///
/// Never rejects. Bytes past `capacity` are dropped.
pub(crate) struct Capture<'a> {
    delimiter: u8,
    dest: &'a RefCell<Vec<u8>>,
    capacity: usize,
    len: usize,
    dropped: usize,
}

impl<'a> Capture<'a> {
    pub(crate) fn new(dest: &'a RefCell<Vec<u8>>, capacity: usize, delimiter: u8) -> Self {
        if let Ok(mut buffer) = dest.try_borrow_mut() {
            let additional = capacity.saturating_sub(buffer.len());
            buffer.reserve(additional);
        }
        Self {
            delimiter,
            dest,
            capacity,
            len: 0,
            dropped: 0,
        }
    }

    fn consume(&mut self, at_start: bool, byte: u8) -> Step {
        let Ok(mut buffer) = self.dest.try_borrow_mut() else {
            if byte == self.delimiter {
                return Step::Complete;
            }
            warn!("capture buffer is borrowed elsewhere, dropping {}", Printable(byte));
            self.dropped += 1;
            return Step::Pending;
        };
        if at_start {
            buffer.clear();
        }
        if byte == self.delimiter {
            return Step::Complete;
        }
        if self.len < self.capacity {
            buffer.push(byte);
            self.len += 1;
        } else {
            self.dropped += 1;
            debug!(
                "excess character dropped {} at [{}/{}]",
                Printable(byte),
                self.len,
                self.capacity
            );
        }
        Step::Pending
    }
}

/// Accept anything up to a terminator
pub(crate) struct Discard {
    terminator: u8,
    count: usize,
    first_seen: Option<u8>,
}

impl Discard {
    pub(crate) fn new(terminator: u8) -> Self {
        Self {
            terminator,
            count: 0,
            first_seen: None,
        }
    }

    fn consume(&mut self, byte: u8) -> Step {
        if byte == self.terminator {
            if let Some(first) = self.first_seen {
                debug!("discarded from {} ct {}", Printable(first), self.count);
            }
            return Step::Complete;
        }
        self.first_seen.get_or_insert(byte);
        self.count += 1;
        Step::Pending
    }
}

/// Any single member of a set
pub(crate) struct OneOf {
    set: &'static str,
    matched: Option<u8>,
}

impl OneOf {
    pub(crate) fn new(set: &'static str) -> Self {
        Self { set, matched: None }
    }

    fn consume(&mut self, byte: u8) -> Step {
        if self.set.as_bytes().contains(&byte) {
            self.matched = Some(byte);
            Step::Complete
        } else {
            Step::Reject(ParseError::UnexpectedCharacter)
        }
    }
}

/// `?`, raising a caller flag
pub(crate) struct HelpFlag<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> HelpFlag<'a> {
    pub(crate) fn new(flag: &'a Cell<bool>) -> Self {
        Self { flag }
    }

    fn consume(&mut self, byte: u8) -> Step {
        if byte == b'?' {
            self.flag.set(true);
            Step::Complete
        } else {
            Step::Reject(ParseError::UnexpectedCharacter)
        }
    }
}

/// Closed set of leaf kinds
pub(crate) enum Leaf<'a> {
    Char(CharMatch<'a>),
    Literal(Literal),
    Capture(Capture<'a>),
    Number(Accumulator<'a>),
    Discard(Discard),
    OneOf(OneOf),
    HelpFlag(HelpFlag<'a>),
}

impl<'a> Leaf<'a> {
    pub(crate) fn consume(&mut self, at_start: bool, byte: u8) -> Step {
        let step = match self {
            Leaf::Char(leaf) => leaf.consume(byte),
            Leaf::Literal(leaf) => leaf.consume(byte),
            Leaf::Capture(leaf) => leaf.consume(at_start, byte),
            Leaf::Number(leaf) => leaf.consume(byte),
            Leaf::Discard(leaf) => leaf.consume(byte),
            Leaf::OneOf(leaf) => leaf.consume(byte),
            Leaf::HelpFlag(leaf) => leaf.consume(byte),
        };
        trace!(byte = %Printable(byte), ?step, "leaf step");
        step
    }

    pub(crate) fn reset(&mut self) {
        match self {
            Leaf::Char(_) => {}
            Leaf::Literal(leaf) => leaf.cursor = 0,
            Leaf::Capture(leaf) => {
                leaf.len = 0;
                leaf.dropped = 0;
            }
            Leaf::Number(leaf) => leaf.reset(),
            Leaf::Discard(leaf) => {
                leaf.count = 0;
                leaf.first_seen = None;
            }
            Leaf::OneOf(leaf) => leaf.matched = None,
            Leaf::HelpFlag(leaf) => leaf.flag.set(false),
        }
    }

    /// Local state for diagnostics
    pub(crate) fn detail(&self) -> Detail {
        match self {
            Leaf::Char(leaf) => Detail::Expected(leaf.expected),
            Leaf::Literal(leaf) => Detail::Literal {
                matched: leaf.cursor,
                text: leaf.text,
            },
            Leaf::Capture(leaf) => Detail::Captured {
                len: leaf.len,
                capacity: leaf.capacity,
                dropped: leaf.dropped,
            },
            Leaf::Number(leaf) => Detail::Number {
                bound: leaf.bound(),
                so_far: leaf.reading(),
            },
            Leaf::Discard(leaf) => Detail::Discarded {
                count: leaf.count,
                first_seen: leaf.first_seen,
            },
            Leaf::OneOf(leaf) => Detail::OneOf(leaf.set),
            Leaf::HelpFlag(_) => Detail::Expected(b'?'),
        }
    }

    /// Grammar fragment for help output
    pub(crate) fn syntax(&self) -> Syntax<'_, 'a> {
        Syntax(self)
    }
}

pub(crate) struct Syntax<'l, 'a>(&'l Leaf<'a>);

impl fmt::Display for Syntax<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Leaf::Char(leaf) => write!(f, "{}", Printable(leaf.expected)),
            Leaf::Literal(leaf) => write!(f, "{:?}", leaf.text),
            Leaf::Capture(leaf) => write!(
                f,
                "<text, up to {}> {}",
                leaf.capacity,
                Printable(leaf.delimiter)
            ),
            Leaf::Number(leaf) => write!(
                f,
                "<digits, {}> {}",
                leaf.bound(),
                Printable(leaf.delimiter())
            ),
            Leaf::Discard(leaf) => write!(f, "<anything> {}", Printable(leaf.terminator)),
            Leaf::OneOf(leaf) => write!(f, "one of {:?}", leaf.set),
            Leaf::HelpFlag(_) => write!(f, "'?' # print help"),
        }
    }
}
