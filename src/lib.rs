//! Charwise
//!
//! Byte-at-a-time parser combinators for command protocols on serial links.
//! This crate provides:
//!
//! - `parser`: the combinator engine (leaves, sequence, alternate, loop)
//! - `commands`: ready-made command grammars (ping, single-character
//!   commands, the multi-field motor command)
//! - `driver`: the byte pump that feeds a command loop and surfaces events
//! - `config`: driver configuration
//! - `registry`: claim registry for identifiers that may be bound only once

pub mod commands;
pub mod config;
pub mod driver;
pub mod parser;
pub mod registry;

pub use parser::{Grammar, NodeId, ParseError};
