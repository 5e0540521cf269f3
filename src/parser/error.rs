//! Error types for parsing and grammar construction

use super::NodeId;

/// Why a node rejected a byte.
///
/// Stored in the node's error slot after `consume` returns `false`. All
/// variants are local and recoverable: `reset()` clears them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("wrong character")]
    UnexpectedCharacter,

    #[error("didn't match string")]
    DidNotMatchLiteral,

    #[error("too large")]
    NumericOverflow,

    #[error("too small")]
    NumericUnderflow,

    #[error("digit expected before delimiter")]
    EmptyBeforeDelimiter,

    #[error("was none of the alternatives")]
    NoAlternativeMatched,
}

/// Error type for building a grammar
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("node {0:?} does not belong to this grammar")]
    UnknownNode(NodeId),

    #[error("node {child:?} already belongs to composite {parent:?}")]
    AlreadyAdopted { child: NodeId, parent: NodeId },

    #[error("destination for {why:?} is already bound to another parser")]
    DestinationAlreadyBound { why: &'static str },

    #[error("composite {why:?} needs at least one child")]
    EmptyComposite { why: &'static str },

    #[error("literal for {why:?} is empty")]
    EmptyLiteral { why: &'static str },

    #[error("character set for {why:?} is empty")]
    EmptyCharacterSet { why: &'static str },

    #[error("node {0:?} is not a loop")]
    NotALoop(NodeId),
}

/// Result type for grammar construction
pub type GrammarResult<T> = Result<T, GrammarError>;
