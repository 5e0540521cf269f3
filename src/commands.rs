//! Ready-made command grammars
//!
//! Each builder adds one command to a [`Grammar`] and returns its root node.
//! [`command_set`] wraps a list of commands into the usual top level: a loop
//! over an alternate of the commands, with a discard-to-newline fallback so a
//! garbled line is skipped and the next one parses cleanly.

use std::cell::Cell;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parser::{Grammar, GrammarResult, NodeId};

/// `#\n`, a liveness check
pub fn ping<'a>(grammar: &mut Grammar<'a>, action: impl FnMut() + 'a) -> GrammarResult<NodeId> {
    let start = grammar.char("start: #", b'#');
    let eol = grammar.eol();
    let ping = grammar.sequence("ping #", &[start, eol])?;
    grammar.on_complete(ping, action)?;
    Ok(ping)
}

/// `<command>\n`, bound to `action`
pub fn single_command<'a>(
    grammar: &mut Grammar<'a>,
    why: &'static str,
    command: u8,
    action: impl FnMut() + 'a,
) -> GrammarResult<NodeId> {
    let name = grammar.char("command", command);
    let eol = grammar.eol();
    let seq = grammar.sequence(why, &[name, eol])?;
    grammar.on_complete(seq, action)?;
    Ok(seq)
}

/// Destination cells for the motor command
#[derive(Debug, Default)]
pub struct MotorFields {
    pub motor: Cell<u32>,
    pub hz_whole: Cell<u32>,
    pub hz_fraction: Cell<f64>,
    pub direction: Cell<u8>,
    pub steps: Cell<i64>,
}

/// A parsed motor command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorCommand {
    pub motor: u32,
    pub hz: f64,
    /// Negative for `-`
    pub steps: i64,
}

impl MotorFields {
    /// Current contents as a command
    pub fn command(&self) -> MotorCommand {
        let steps = self.steps.get();
        MotorCommand {
            motor: self.motor.get(),
            hz: f64::from(self.hz_whole.get()) + self.hz_fraction.get(),
            steps: if self.direction.get() == b'-' { -steps } else { steps },
        }
    }
}

/// `G <motor> <hz>.<fraction> <+|-><steps>\n`
///
/// e.g. `G 1 200.5 +1000\n`. `action` receives the parsed command once the
/// newline arrives.
pub fn motor_command<'a>(
    grammar: &mut Grammar<'a>,
    fields: &'a MotorFields,
    mut action: impl FnMut(MotorCommand) + 'a,
) -> GrammarResult<NodeId> {
    let start = grammar.char("start G", b'G');
    let space = grammar.space();
    let motor = grammar.integer("motor", &fields.motor, 999, b' ')?;
    let hz_whole = grammar.integer("hz<", &fields.hz_whole, 99_999, b'.')?;
    let hz_fraction = grammar.fraction("hz>", &fields.hz_fraction, 0.0, b' ')?;
    let sign = grammar.one_of("+-", "+-")?;
    grammar.on_complete_with_byte(sign, move |byte| fields.direction.set(byte))?;
    let steps = grammar.integer("steps", &fields.steps, i64::MAX - 1, b'\n')?;

    let go = grammar.sequence(
        "G motor hz.hz +-steps",
        &[start, space, motor, hz_whole, hz_fraction, sign, steps],
    )?;
    grammar.on_complete(go, move || {
        let command = fields.command();
        debug!(?command, "motor command");
        action(command);
    })?;
    Ok(go)
}

/// Loop over `commands`, falling back to discarding the rest of the line
pub fn command_set<'a>(
    grammar: &mut Grammar<'a>,
    commands: &[NodeId],
    help: bool,
) -> GrammarResult<NodeId> {
    let discard = grammar.discard("Discarding till eol", b'\n');
    let mut alternatives = commands.to_vec();
    alternatives.push(discard);
    let commands = grammar.alternate("commands", &alternatives)?;
    grammar.repeat("command loop", commands, help)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_ping() {
        let pings = Cell::new(0);
        let mut g = Grammar::new();
        let p = ping(&mut g, || pings.set(pings.get() + 1)).unwrap();
        assert_eq!(g.feed(p, b"#\n"), 2);
        assert!(g.is_done(p));
        drop(g);
        assert_eq!(pings.get(), 1);
    }

    #[test]
    fn test_single_command_needs_eol() {
        let stops = Cell::new(0);
        let mut g = Grammar::new();
        let stop = single_command(&mut g, "stop", b's', || stops.set(stops.get() + 1)).unwrap();
        assert!(g.consume(stop, b's'));
        assert!(!g.consume(stop, b'x'));
        g.reset(stop);
        assert_eq!(g.feed(stop, b"s\n"), 2);
        drop(g);
        assert_eq!(stops.get(), 1);
    }

    #[test]
    fn test_motor_command() {
        let fields = MotorFields::default();
        let seen = RefCell::new(Vec::new());
        let mut g = Grammar::new();
        let go = motor_command(&mut g, &fields, |c| seen.borrow_mut().push(c)).unwrap();

        let input = b"G 12 200.5 -1000\n";
        assert_eq!(g.feed(go, input), input.len());
        assert!(g.is_done(go));
        drop(g);
        assert_eq!(
            seen.into_inner(),
            vec![MotorCommand {
                motor: 12,
                hz: 200.5,
                steps: -1000
            }]
        );
    }

    #[test]
    fn test_motor_number_too_large() {
        let fields = MotorFields::default();
        let mut g = Grammar::new();
        let go = motor_command(&mut g, &fields, |_| {}).unwrap();
        assert_eq!(g.feed(go, b"G 1000"), 5);
        assert_eq!(g.error(go), Some(crate::ParseError::NumericOverflow));
    }

    #[test]
    fn test_command_set_recovers_from_garbage() {
        let pings = Cell::new(0);
        let stops = Cell::new(0);
        let mut g = Grammar::new();
        let p = ping(&mut g, || pings.set(pings.get() + 1)).unwrap();
        let s = single_command(&mut g, "stop", b's', || stops.set(stops.get() + 1)).unwrap();
        let top = command_set(&mut g, &[p, s], true).unwrap();

        for &byte in b"hello there\n#\nsx\ns\n#\n" {
            g.consume(top, byte);
        }
        // the rejected 'x' leaves its newline to the discard fallback
        assert_eq!(g.completions(top), Ok(5));
        drop(g);
        assert_eq!(pings.get(), 2);
        assert_eq!(stops.get(), 1);
    }
}
