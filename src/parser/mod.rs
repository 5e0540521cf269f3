//! Incremental parser combinators
//!
//! A grammar is a tree of parser nodes fed one byte at a time. Leaves match
//! bytes directly (characters, strings, bounded numbers, captures) and
//! composites combine them (sequence, alternate, loop). Every node answers
//! each byte synchronously with accept or reject, so the caller never blocks
//! and never buffers a line.

mod accumulator;
mod diagnostic;
mod error;
mod grammar;
mod leaf;

pub use accumulator::{Bound, Fraction, Integer, Reading};
pub use diagnostic::{Detail, Diagnostic, Frame, Printable};
pub use error::{GrammarError, GrammarResult, ParseError};
pub use grammar::{Grammar, LoopReport, NodeId, Phase};
