//! Command driver
//!
//! Pumps bytes from a [`ByteSource`] into a command loop one at a time and
//! turns what the loop reports into [`Event`]s. The driver also owns the only
//! notion of time in the crate: with an idle timeout configured, a command
//! left half-received for too long is abandoned with `reset()`.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::parser::{Diagnostic, Grammar, GrammarError, LoopReport, NodeId};

/// Error type for driver operations
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Failed to read from byte source: {0}")]
    Read(#[source] io::Error),

    #[error("Invalid command loop: {0}")]
    Grammar(#[from] GrammarError),
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Something that may have a byte ready
pub trait ByteSource {
    /// Return the next byte if one is available, without waiting for one
    fn poll_byte(&mut self) -> DriverResult<Option<u8>>;
}

impl ByteSource for VecDeque<u8> {
    fn poll_byte(&mut self) -> DriverResult<Option<u8>> {
        Ok(self.pop_front())
    }
}

/// Byte source over any reader
///
/// A non-blocking reader returning `WouldBlock` reads as "no byte yet".
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    exhausted: bool,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            exhausted: false,
        }
    }

    /// True once the reader reported end of file
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn poll_byte(&mut self) -> DriverResult<Option<u8>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(DriverError::Read(e)),
            }
        }
    }
}

/// What happened to one byte
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Accepted,
    /// Rejected; a diagnostic is attached when a command was abandoned midway
    Rejected(Option<Diagnostic>),
    /// `?` was received; carries the help text
    Help(String),
}

/// Running totals
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriverStats {
    pub bytes: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub completions: u64,
    pub idle_resets: u64,
}

/// Feeds a command loop
pub struct Driver<'a> {
    grammar: Grammar<'a>,
    root: NodeId,
    idle_timeout: Option<Duration>,
    last_byte_at: Option<Instant>,
    stats: DriverStats,
}

impl<'a> Driver<'a> {
    /// Drive the loop `root` of `grammar`
    pub fn new(grammar: Grammar<'a>, root: NodeId, config: &Config) -> DriverResult<Self> {
        // Fails early if root is not a loop
        grammar.completions(root)?;
        Ok(Self {
            grammar,
            root,
            idle_timeout: config.idle_timeout(),
            last_byte_at: None,
            stats: DriverStats::default(),
        })
    }

    pub fn grammar(&self) -> &Grammar<'a> {
        &self.grammar
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Help text for the whole command loop
    pub fn help_text(&self) -> String {
        self.grammar.describe(self.root, 0)
    }

    /// Feed one byte received now
    pub fn feed_byte(&mut self, byte: u8) -> DriverResult<Event> {
        self.feed_byte_at(byte, Instant::now())
    }

    /// Feed one byte received at `now`
    pub fn feed_byte_at(&mut self, byte: u8, now: Instant) -> DriverResult<Event> {
        self.expire_idle(now);
        self.last_byte_at = Some(now);
        self.stats.bytes += 1;

        let accepted = self.grammar.consume(self.root, byte);
        self.stats.completions = self.grammar.completions(self.root)?;
        let report = self.grammar.take_report(self.root)?;

        let event = match (accepted, report) {
            (_, Some(LoopReport::HelpRequested)) => Event::Help(self.help_text()),
            (true, _) => Event::Accepted,
            (false, Some(LoopReport::Rejected(diagnostic))) => Event::Rejected(Some(diagnostic)),
            (false, None) => Event::Rejected(None),
        };
        if accepted {
            self.stats.accepted += 1;
        } else {
            self.stats.rejected += 1;
        }
        Ok(event)
    }

    /// Feed a chunk of bytes, returning every event other than `Accepted`
    pub fn process(&mut self, data: &[u8]) -> DriverResult<Vec<Event>> {
        let mut events = Vec::new();
        for &byte in data {
            let event = self.feed_byte(byte)?;
            if event != Event::Accepted {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Drain whatever `source` has ready right now
    pub fn pump<S: ByteSource>(&mut self, source: &mut S) -> DriverResult<Vec<Event>> {
        let mut events = Vec::new();
        while let Some(byte) = source.poll_byte()? {
            let event = self.feed_byte(byte)?;
            if event != Event::Accepted {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Abandon a half-received command if the line went quiet
    ///
    /// Returns true if the command loop was reset.
    pub fn expire_idle(&mut self, now: Instant) -> bool {
        let (Some(timeout), Some(last)) = (self.idle_timeout, self.last_byte_at) else {
            return false;
        };
        if self.grammar.is_at_start(self.root) || now.duration_since(last) < timeout {
            return false;
        }
        info!(
            "Abandoning partial command after {:?} idle",
            now.duration_since(last)
        );
        self.grammar.reset(self.root);
        self.stats.idle_resets += 1;
        true
    }

    /// Abandon any partial command
    pub fn reset(&mut self) {
        debug!("Driver reset");
        self.grammar.reset(self.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{command_set, ping};
    use std::cell::Cell;

    fn ping_loop<'a>(pings: &'a Cell<u32>, config: &Config) -> Driver<'a> {
        let mut grammar = Grammar::new();
        let p = ping(&mut grammar, move || pings.set(pings.get() + 1)).unwrap();
        let root = command_set(&mut grammar, &[p], config.help_enabled).unwrap();
        Driver::new(grammar, root, config).unwrap()
    }

    #[test]
    fn test_driver_rejects_non_loop_root() {
        let mut grammar = Grammar::new();
        let c = grammar.char("c", b'c');
        assert!(matches!(
            Driver::new(grammar, c, &Config::default()),
            Err(DriverError::Grammar(GrammarError::NotALoop(_)))
        ));
    }

    #[test]
    fn test_process_counts() {
        let pings = Cell::new(0);
        let mut driver = ping_loop(&pings, &Config::default());
        let events = driver.process(b"#\n#x\n#\n").unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Rejected(Some(diagnostic)) => assert_eq!(diagnostic.byte, b'x'),
            other => panic!("expected a diagnostic, got {:?}", other),
        }
        let stats = driver.stats();
        assert_eq!(stats.bytes, 7);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.accepted, 6);
        // two pings plus the discarded tail of the bad line
        assert_eq!(stats.completions, 3);
        drop(driver);
        assert_eq!(pings.get(), 2);
    }

    #[test]
    fn test_help_at_line_start() {
        let pings = Cell::new(0);
        let mut driver = ping_loop(&pings, &Config::default());
        let events = driver.process(b"?\n").unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Help(text) => assert!(text.contains("ping #")),
            other => panic!("expected help, got {:?}", other),
        }
        assert_eq!(driver.stats().rejected, 0);

        driver.process(b"#\n").unwrap();
        drop(driver);
        assert_eq!(pings.get(), 1);
    }

    #[test]
    fn test_help_disabled_discards_question_mark() {
        let pings = Cell::new(0);
        let config = Config {
            help_enabled: false,
            ..Config::default()
        };
        let mut driver = ping_loop(&pings, &config);
        assert!(driver.process(b"?\n").unwrap().is_empty());
    }

    #[test]
    fn test_help_event_mid_command() {
        let pings = Cell::new(0);
        let mut driver = ping_loop(&pings, &Config::default());
        match driver.feed_byte(b'#').unwrap() {
            Event::Accepted => {}
            other => panic!("unexpected {:?}", other),
        }
        match driver.feed_byte(b'?').unwrap() {
            Event::Help(text) => {
                assert!(text.contains("ping #"));
                assert!(text.contains("? : print help"));
            }
            other => panic!("expected help, got {:?}", other),
        }
    }

    #[test]
    fn test_idle_timeout_abandons_partial_command() {
        let pings = Cell::new(0);
        let config = Config {
            idle_timeout_ms: 100,
            ..Config::default()
        };
        let mut driver = ping_loop(&pings, &config);
        let start = Instant::now();

        assert_eq!(driver.feed_byte_at(b'#', start).unwrap(), Event::Accepted);
        assert!(!driver.expire_idle(start + Duration::from_millis(50)));
        assert!(driver.expire_idle(start + Duration::from_millis(150)));
        assert!(driver.grammar().is_at_start(driver.root()));
        assert_eq!(driver.stats().idle_resets, 1);

        // a lone newline after the reset is discarded, not a ping
        let later = start + Duration::from_millis(200);
        assert_eq!(driver.feed_byte_at(b'\n', later).unwrap(), Event::Accepted);
        drop(driver);
        assert_eq!(pings.get(), 0);
    }

    #[test]
    fn test_no_idle_reset_between_commands() {
        let pings = Cell::new(0);
        let config = Config {
            idle_timeout_ms: 10,
            ..Config::default()
        };
        let mut driver = ping_loop(&pings, &config);
        let start = Instant::now();
        driver.feed_byte_at(b'#', start).unwrap();
        driver.feed_byte_at(b'\n', start).unwrap();
        assert!(!driver.expire_idle(start + Duration::from_secs(1)));
    }

    #[test]
    fn test_pump_reader_source() {
        let pings = Cell::new(0);
        let mut driver = ping_loop(&pings, &Config::default());
        let mut source = ReaderSource::new(&b"#\n#\n"[..]);
        let events = driver.pump(&mut source).unwrap();
        assert!(events.is_empty());
        assert!(source.is_exhausted());

        let mut queue: VecDeque<u8> = b"#\n".iter().copied().collect();
        driver.pump(&mut queue).unwrap();
        drop(driver);
        assert_eq!(pings.get(), 3);
    }
}
