//! Grammar arena
//!
//! A [`Grammar`] owns every node of a parser tree in one flat store. Nodes are
//! addressed by [`NodeId`] and composites refer to their children by id, so a
//! tree is built once and then walked byte by byte without allocating.
//!
//! Every node, leaf or composite, follows the same state machine:
//!
//! ```text
//! AtStart -> InProgress -> Done
//!                      \-> Errored
//! ```
//!
//! `reset()` is the only way back to `AtStart`.

use std::cell::{Cell, RefCell};
use std::fmt;

use tracing::{debug, info, trace, warn};

use super::accumulator::{Accumulator, Fraction, Integer};
use super::diagnostic::{Detail, Diagnostic, Frame, Printable};
use super::error::{GrammarError, GrammarResult, ParseError};
use super::leaf::{Capture, CharMatch, Discard, HelpFlag, Leaf, Literal, OneOf, Step};
use crate::registry::Registry;

/// Handle to a node inside a [`Grammar`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Where a node is in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AtStart,
    InProgress,
    Done,
    Errored,
}

/// Something a loop wants its driver to know about
#[derive(Debug, Clone, PartialEq)]
pub enum LoopReport {
    /// A partially parsed command was abandoned
    Rejected(Diagnostic),
    /// `?` arrived on a loop with help enabled
    HelpRequested,
}

/// Completion hook
enum Hook<'a> {
    Action(Box<dyn FnMut() + 'a>),
    WithByte(Box<dyn FnMut(u8) + 'a>),
}

impl Hook<'_> {
    fn fire(&mut self, byte: u8) {
        match self {
            Hook::Action(action) => action(),
            Hook::WithByte(action) => action(byte),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Status {
    done: bool,
    at_start: bool,
    error: Option<ParseError>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            done: false,
            at_start: true,
            error: None,
        }
    }
}

enum Kind<'a> {
    Leaf(Leaf<'a>),
    Sequence {
        children: Vec<NodeId>,
        index: usize,
    },
    Alternate {
        children: Vec<NodeId>,
        committed: Option<usize>,
    },
    Loop {
        child: NodeId,
        help: bool,
        /// Completed commands, kept across resets
        completions: u64,
        report: Option<LoopReport>,
    },
}

struct Node<'a> {
    why: &'static str,
    status: Status,
    kind: Kind<'a>,
    hook: Option<Hook<'a>>,
    parent: Option<NodeId>,
}

/// A parser tree and the destination cells it writes into
pub struct Grammar<'a> {
    nodes: Vec<Node<'a>>,
    /// Addresses of bound destination cells
    bindings: Registry<usize>,
}

impl Default for Grammar<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Grammar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("nodes", &self.nodes.len())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

fn address<T>(cell: &T) -> usize {
    cell as *const T as usize
}

impl<'a> Grammar<'a> {
    /// Create an empty grammar
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            bindings: Registry::new(),
        }
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    fn push(&mut self, why: &'static str, kind: Kind<'a>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            why,
            status: Status::default(),
            kind,
            hook: None,
            parent: None,
        });
        trace!(?id, why, "node added");
        id
    }

    fn leaf(&mut self, why: &'static str, leaf: Leaf<'a>) -> NodeId {
        self.push(why, Kind::Leaf(leaf))
    }

    fn bind<T>(&mut self, why: &'static str, dest: &T) -> GrammarResult<()> {
        if self.bindings.claim(address(dest)) {
            Ok(())
        } else {
            Err(GrammarError::DestinationAlreadyBound { why })
        }
    }

    /// Check that `children` exist and have no parent yet
    fn check_orphans(&self, why: &'static str, children: &[NodeId]) -> GrammarResult<()> {
        if children.is_empty() {
            return Err(GrammarError::EmptyComposite { why });
        }
        let parent = NodeId(self.nodes.len());
        for (i, &child) in children.iter().enumerate() {
            let node = self
                .nodes
                .get(child.0)
                .ok_or(GrammarError::UnknownNode(child))?;
            if let Some(owner) = node.parent {
                return Err(GrammarError::AlreadyAdopted {
                    child,
                    parent: owner,
                });
            }
            if children[..i].contains(&child) {
                return Err(GrammarError::AlreadyAdopted { child, parent });
            }
        }
        Ok(())
    }

    fn adopt(&mut self, parent: NodeId, children: &[NodeId]) {
        for &child in children {
            self.nodes[child.0].parent = Some(parent);
        }
    }

    /// Exactly `expected`
    pub fn char(&mut self, why: &'static str, expected: u8) -> NodeId {
        self.leaf(why, Leaf::Char(CharMatch::new(expected, None)))
    }

    /// Exactly `expected`, stored into `dest` when matched
    pub fn char_into(
        &mut self,
        why: &'static str,
        dest: &'a Cell<u8>,
        expected: u8,
    ) -> GrammarResult<NodeId> {
        self.bind(why, dest)?;
        Ok(self.leaf(why, Leaf::Char(CharMatch::new(expected, Some(dest)))))
    }

    pub fn space(&mut self) -> NodeId {
        self.char("space", b' ')
    }

    pub fn eol(&mut self) -> NodeId {
        self.char("eol", b'\n')
    }

    /// Exactly the bytes of `text`
    pub fn literal(&mut self, why: &'static str, text: &'static str) -> GrammarResult<NodeId> {
        if text.is_empty() {
            return Err(GrammarError::EmptyLiteral { why });
        }
        Ok(self.leaf(why, Leaf::Literal(Literal::new(text))))
    }

    /// Bytes up to `delimiter`, at most `capacity` of them kept in `dest`
    pub fn capture(
        &mut self,
        why: &'static str,
        dest: &'a RefCell<Vec<u8>>,
        capacity: usize,
        delimiter: u8,
    ) -> GrammarResult<NodeId> {
        self.bind(why, dest)?;
        Ok(self.leaf(why, Leaf::Capture(Capture::new(dest, capacity, delimiter))))
    }

    /// Decimal digits into `dest`, at most `max_value`, ended by `delimiter`
    pub fn integer<T: Integer + 'a>(
        &mut self,
        why: &'static str,
        dest: &'a Cell<T>,
        max_value: T,
        delimiter: u8,
    ) -> GrammarResult<NodeId> {
        self.bind(why, dest)?;
        let accumulator = Accumulator::integer(dest, max_value.to_bound(), delimiter);
        Ok(self.leaf(why, Leaf::Number(accumulator)))
    }

    /// Digits after a decimal point into `dest`, ended by `delimiter`
    ///
    /// The final value must be at least `min_accepted_value`; this is only
    /// checked when the delimiter arrives.
    pub fn fraction<T: Fraction + 'a>(
        &mut self,
        why: &'static str,
        dest: &'a Cell<T>,
        min_accepted_value: f64,
        delimiter: u8,
    ) -> GrammarResult<NodeId> {
        self.bind(why, dest)?;
        let accumulator = Accumulator::fraction(dest, min_accepted_value, delimiter);
        Ok(self.leaf(why, Leaf::Number(accumulator)))
    }

    /// Anything up to and including `terminator`
    pub fn discard(&mut self, why: &'static str, terminator: u8) -> NodeId {
        self.leaf(why, Leaf::Discard(Discard::new(terminator)))
    }

    /// Any single byte of `set`
    pub fn one_of(&mut self, why: &'static str, set: &'static str) -> GrammarResult<NodeId> {
        if set.is_empty() {
            return Err(GrammarError::EmptyCharacterSet { why });
        }
        Ok(self.leaf(why, Leaf::OneOf(OneOf::new(set))))
    }

    /// `?`, setting `flag`. Resetting the node lowers the flag again.
    pub fn help_flag(&mut self, flag: &'a Cell<bool>) -> GrammarResult<NodeId> {
        self.bind("print help", flag)?;
        Ok(self.leaf("print help", Leaf::HelpFlag(HelpFlag::new(flag))))
    }

    /// `children` in order
    pub fn sequence(&mut self, why: &'static str, children: &[NodeId]) -> GrammarResult<NodeId> {
        self.check_orphans(why, children)?;
        let id = self.push(
            why,
            Kind::Sequence {
                children: children.to_vec(),
                index: 0,
            },
        );
        self.adopt(id, children);
        Ok(id)
    }

    /// The first of `children` that accepts the first byte
    pub fn alternate(&mut self, why: &'static str, children: &[NodeId]) -> GrammarResult<NodeId> {
        self.check_orphans(why, children)?;
        let id = self.push(
            why,
            Kind::Alternate {
                children: children.to_vec(),
                committed: None,
            },
        );
        self.adopt(id, children);
        Ok(id)
    }

    /// `child` over and over, recovering from rejections
    ///
    /// With `help` set, a `?` between commands, or one that `child` rejects
    /// mid-command, is answered with a [`LoopReport::HelpRequested`].
    pub fn repeat(
        &mut self,
        why: &'static str,
        child: NodeId,
        help: bool,
    ) -> GrammarResult<NodeId> {
        self.check_orphans(why, &[child])?;
        let id = self.push(
            why,
            Kind::Loop {
                child,
                help,
                completions: 0,
                report: None,
            },
        );
        self.adopt(id, &[child]);
        Ok(id)
    }

    /// Run `action` each time `id` completes
    pub fn on_complete(&mut self, id: NodeId, action: impl FnMut() + 'a) -> GrammarResult<()> {
        self.set_hook(id, Hook::Action(Box::new(action)))
    }

    /// Run `action` with the completing byte each time `id` completes
    ///
    /// For a one-of node the completing byte is the matched member.
    pub fn on_complete_with_byte(
        &mut self,
        id: NodeId,
        action: impl FnMut(u8) + 'a,
    ) -> GrammarResult<()> {
        self.set_hook(id, Hook::WithByte(Box::new(action)))
    }

    fn set_hook(&mut self, id: NodeId, hook: Hook<'a>) -> GrammarResult<()> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(GrammarError::UnknownNode(id))?;
        node.hook = Some(hook);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    //
    // These index the arena directly and panic on a `NodeId` from another
    // grammar, like slice indexing.
    // ------------------------------------------------------------------

    pub fn why(&self, id: NodeId) -> &'static str {
        self.nodes[id.0].why
    }

    pub fn is_done(&self, id: NodeId) -> bool {
        self.nodes[id.0].status.done
    }

    pub fn is_at_start(&self, id: NodeId) -> bool {
        self.nodes[id.0].status.at_start
    }

    pub fn error(&self, id: NodeId) -> Option<ParseError> {
        self.nodes[id.0].status.error
    }

    pub fn phase(&self, id: NodeId) -> Phase {
        let status = self.nodes[id.0].status;
        if status.done {
            Phase::Done
        } else if status.error.is_some() {
            Phase::Errored
        } else if status.at_start {
            Phase::AtStart
        } else {
            Phase::InProgress
        }
    }

    /// How many times the loop `id` completed its child
    pub fn completions(&self, id: NodeId) -> GrammarResult<u64> {
        match self.nodes.get(id.0).map(|node| &node.kind) {
            Some(Kind::Loop { completions, .. }) => Ok(*completions),
            _ => Err(GrammarError::NotALoop(id)),
        }
    }

    /// Take the pending report of the loop `id`
    pub fn take_report(&mut self, id: NodeId) -> GrammarResult<Option<LoopReport>> {
        match self.nodes.get_mut(id.0).map(|node| &mut node.kind) {
            Some(Kind::Loop { report, .. }) => Ok(report.take()),
            _ => Err(GrammarError::NotALoop(id)),
        }
    }

    fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        match &self.nodes[id.0].kind {
            Kind::Leaf(_) => None,
            Kind::Sequence { children, .. } | Kind::Alternate { children, .. } => {
                children.get(index).copied()
            }
            Kind::Loop { child, .. } => (index == 0).then_some(*child),
        }
    }

    // ------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------

    /// Offer one byte to `id`
    ///
    /// Returns true if the byte was accepted, including the byte that
    /// completes the node. Returns false if it is not valid here; the
    /// node's error is then set and it should be reset before more input.
    pub fn consume(&mut self, id: NodeId, byte: u8) -> bool {
        let node = &self.nodes[id.0];
        if node.status.done {
            warn!(why = node.why, "Fail, already done");
            return false;
        }
        match node.kind {
            Kind::Leaf(_) => self.consume_leaf(id, byte),
            Kind::Sequence { .. } => self.consume_sequence(id, byte),
            Kind::Alternate { .. } => self.consume_alternate(id, byte),
            Kind::Loop { .. } => self.consume_loop(id, byte),
        }
    }

    /// Offer each byte of `bytes` to `id`, returning how many were accepted
    pub fn feed(&mut self, id: NodeId, bytes: &[u8]) -> usize {
        bytes
            .iter()
            .filter(|&&byte| self.consume(id, byte))
            .count()
    }

    /// Mark `id` done and run its hook
    fn finish(&mut self, id: NodeId, byte: u8) {
        let node = &mut self.nodes[id.0];
        node.status.done = true;
        trace!(why = node.why, "done");
        if let Some(hook) = node.hook.as_mut() {
            hook.fire(byte);
        }
    }

    fn consume_leaf(&mut self, id: NodeId, byte: u8) -> bool {
        let node = &mut self.nodes[id.0];
        let Kind::Leaf(leaf) = &mut node.kind else {
            return false;
        };
        match leaf.consume(node.status.at_start, byte) {
            Step::Pending => {
                node.status.at_start = false;
                true
            }
            Step::Complete => {
                node.status.at_start = false;
                self.finish(id, byte);
                true
            }
            Step::Reject(error) => {
                node.status.error = Some(error);
                false
            }
        }
    }

    fn consume_sequence(&mut self, id: NodeId, byte: u8) -> bool {
        let (current, index, len) = match &self.nodes[id.0].kind {
            Kind::Sequence { children, index } => match children.get(*index) {
                Some(&current) => (current, *index, children.len()),
                None => return false,
            },
            _ => return false,
        };

        if self.nodes[id.0].status.at_start {
            self.reset(current);
            self.nodes[id.0].status.error = None;
        }

        if !self.consume(current, byte) {
            let error = self.nodes[current.0]
                .status
                .error
                .unwrap_or(ParseError::UnexpectedCharacter);
            let node = &mut self.nodes[id.0];
            node.status.error = Some(error);
            if !node.status.at_start {
                debug!(
                    why = node.why,
                    "unexpected {} at sequence[{}]: {}",
                    Printable(byte),
                    index,
                    error
                );
            }
            return false;
        }

        self.nodes[id.0].status.at_start = false;
        if !self.nodes[current.0].status.done {
            return true;
        }

        // Completed children keep their state until the whole sequence is
        // reset, so hooks can still read it.
        let next = index + 1;
        if let Kind::Sequence { index, .. } = &mut self.nodes[id.0].kind {
            *index = next;
        }
        debug!(
            why = self.nodes[id.0].why,
            "Done Seq [{}] {}",
            index,
            self.nodes[current.0].why
        );
        if next == len {
            self.finish(id, byte);
        }
        true
    }

    fn consume_alternate(&mut self, id: NodeId, byte: u8) -> bool {
        let (committed, len) = match &self.nodes[id.0].kind {
            Kind::Alternate {
                children,
                committed,
            } => (*committed, children.len()),
            _ => return false,
        };

        if let Some(index) = committed {
            let Some(child) = self.child(id, index) else {
                return false;
            };
            if self.consume(child, byte) {
                if self.nodes[child.0].status.done {
                    self.finish(id, byte);
                }
                return true;
            }
            let error = self.nodes[child.0]
                .status
                .error
                .unwrap_or(ParseError::UnexpectedCharacter);
            let node = &mut self.nodes[id.0];
            node.status.error = Some(error);
            debug!(
                why = node.why,
                "unexpected {} in alternative[{}]: {}",
                Printable(byte),
                index,
                error
            );
            return false;
        }

        // Trial phase: the first child to accept the byte wins
        self.nodes[id.0].status.error = None;
        for index in 0..len {
            let Some(child) = self.child(id, index) else {
                break;
            };
            self.reset(child);
            if !self.consume(child, byte) {
                continue;
            }
            let done = self.nodes[child.0].status.done;
            let child_why = self.nodes[child.0].why;
            let node = &mut self.nodes[id.0];
            if let Kind::Alternate { committed, .. } = &mut node.kind {
                *committed = Some(index);
            }
            node.status.at_start = false;
            trace!(why = node.why, alternative = child_why, "committed");
            if done {
                self.finish(id, byte);
            }
            return true;
        }

        self.nodes[id.0].status.error = Some(ParseError::NoAlternativeMatched);
        false
    }

    fn consume_loop(&mut self, id: NodeId, byte: u8) -> bool {
        let (child, help) = match &self.nodes[id.0].kind {
            Kind::Loop { child, help, .. } => (*child, *help),
            _ => return false,
        };
        self.nodes[id.0].status.error = None;

        // Between commands `?` belongs to the loop, even when a fallback
        // alternative would swallow it
        if help && byte == b'?' && self.nodes[child.0].status.at_start {
            self.answer_help(id, child);
            return true;
        }

        if self.consume(child, byte) {
            if self.nodes[child.0].status.done {
                let node = &mut self.nodes[id.0];
                if let Kind::Loop { completions, .. } = &mut node.kind {
                    *completions += 1;
                }
                debug!(why = node.why, "done");
                self.reset(child);
            }
            self.sync_loop_start(id, child);
            return true;
        }

        if help && byte == b'?' {
            self.answer_help(id, child);
            return true;
        }

        let error = self.nodes[child.0]
            .status
            .error
            .unwrap_or(ParseError::UnexpectedCharacter);
        if !self.nodes[child.0].status.at_start {
            let diagnostic = self.diagnose(child, byte);
            debug!("{}", diagnostic.to_string().trim_end());
            self.set_report(id, LoopReport::Rejected(diagnostic));
        }
        self.reset(child);
        let node = &mut self.nodes[id.0];
        node.status.error = Some(error);
        node.status.at_start = true;
        false
    }

    /// Abandon any partial command and queue a help report
    fn answer_help(&mut self, id: NodeId, child: NodeId) {
        self.reset(child);
        self.set_report(id, LoopReport::HelpRequested);
        info!(why = self.nodes[id.0].why, "help requested");
        self.sync_loop_start(id, child);
    }

    /// A loop is at its start whenever its child is between commands
    fn sync_loop_start(&mut self, id: NodeId, child: NodeId) {
        let at_start = self.nodes[child.0].status.at_start;
        self.nodes[id.0].status.at_start = at_start;
    }

    fn set_report(&mut self, id: NodeId, new: LoopReport) {
        if let Kind::Loop { report, .. } = &mut self.nodes[id.0].kind {
            *report = Some(new);
        }
    }

    /// Return `id` and everything below it to the initial state
    ///
    /// Never consumes input or runs hooks. Calling it twice is the same as
    /// calling it once.
    pub fn reset(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.0];
        node.status = Status::default();
        match &mut node.kind {
            Kind::Leaf(leaf) => leaf.reset(),
            Kind::Sequence { index, .. } => *index = 0,
            Kind::Alternate { committed, .. } => *committed = None,
            Kind::Loop { report, .. } => *report = None,
        }
        let mut index = 0;
        while let Some(child) = self.child(id, index) {
            self.reset(child);
            index += 1;
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Snapshot of the active path below `id` for a rejected `byte`
    pub fn diagnose(&self, id: NodeId, byte: u8) -> Diagnostic {
        let mut frames = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current.0];
            let (detail, next) = match &node.kind {
                Kind::Leaf(leaf) => (leaf.detail(), None),
                Kind::Sequence { children, index } => (
                    Detail::Step {
                        index: *index,
                        len: children.len(),
                    },
                    children.get(*index).copied(),
                ),
                Kind::Alternate {
                    children,
                    committed: Some(index),
                } => (Detail::Chose(*index), children.get(*index).copied()),
                Kind::Alternate {
                    children,
                    committed: None,
                } => (
                    Detail::Alternatives(children.iter().map(|c| self.nodes[c.0].why).collect()),
                    None,
                ),
                Kind::Loop { child, .. } => (Detail::None, Some(*child)),
            };
            frames.push(Frame {
                why: node.why,
                error: node.status.error,
                detail,
            });
            cursor = next;
        }
        Diagnostic { byte, frames }
    }

    /// Indented help text for the grammar below `id`
    pub fn describe(&self, id: NodeId, indent: usize) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.describe_into(id, indent, &mut out);
        out
    }

    fn describe_into(&self, id: NodeId, indent: usize, out: &mut impl fmt::Write) -> fmt::Result {
        let node = &self.nodes[id.0];
        match &node.kind {
            Kind::Leaf(leaf) => writeln!(out, "{:indent$}{} {}", "", node.why, leaf.syntax()),
            Kind::Sequence { children, .. } => {
                writeln!(out, "{:indent$}{}", "", node.why)?;
                for &child in children {
                    self.describe_into(child, indent + 2, out)?;
                }
                Ok(())
            }
            Kind::Alternate { children, .. } => {
                writeln!(out, "{:indent$}{}, one of:", "", node.why)?;
                for &child in children {
                    self.describe_into(child, indent + 2, out)?;
                }
                Ok(())
            }
            Kind::Loop { child, help, .. } => {
                writeln!(out, "{:indent$}{}", "", node.why)?;
                self.describe_into(*child, indent + 2, out)?;
                if *help {
                    writeln!(out, "{:indent$}? : print help", "", indent = indent + 2)?;
                }
                Ok(())
            }
        }
    }
}
