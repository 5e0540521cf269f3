//! Property-based tests for arbitrary byte streams
//!
//! Whatever arrives on the line, the command loop must never panic, and the
//! first well-formed command after a newline must still parse.

use std::cell::Cell;

use charwise::commands::{command_set, motor_command, ping, single_command, MotorFields};
use charwise::Grammar;
use proptest::prelude::*;

proptest! {
    #[test]
    fn garbage_then_newline_resynchronizes(
        noise in proptest::collection::vec(any::<u8>(), 0..256)
    ) {
        let pings = Cell::new(0u32);
        let fields = MotorFields::default();
        let mut g = Grammar::new();
        let p = ping(&mut g, || pings.set(pings.get() + 1)).unwrap();
        let s = single_command(&mut g, "stop", b's', || {}).unwrap();
        let go = motor_command(&mut g, &fields, |_| {}).unwrap();
        let top = command_set(&mut g, &[p, s, go], true).unwrap();

        for &byte in &noise {
            g.consume(top, byte);
            let _ = g.take_report(top);
        }

        // a newline either finishes or abandons whatever was in progress
        g.consume(top, b'\n');
        prop_assert!(g.is_at_start(top));

        let before = pings.get();
        prop_assert_eq!(g.feed(top, b"#\n"), 2);
        prop_assert_eq!(pings.get(), before + 1);
        prop_assert!(!g.is_done(top));
    }

    #[test]
    fn integer_accepts_exactly_up_to_max(n in 0u32..5000) {
        let value = Cell::new(0u32);
        let mut g = Grammar::new();
        let id = g.integer("n", &value, 999, b' ').unwrap();
        let digits = n.to_string();
        let accepted = g.feed(id, digits.as_bytes());

        if n <= 999 {
            prop_assert_eq!(accepted, digits.len());
            prop_assert!(g.consume(id, b' '));
            prop_assert!(g.is_done(id));
            prop_assert_eq!(value.get(), n);
        } else {
            prop_assert!(!g.is_done(id));
            prop_assert_eq!(g.error(id), Some(charwise::ParseError::NumericOverflow));
        }
    }

    #[test]
    fn fraction_value_matches_digits(digits in "[0-9]{1,12}") {
        let value = Cell::new(0.0f64);
        let mut g = Grammar::new();
        let id = g.fraction("f", &value, 0.0, b'\n').unwrap();
        g.feed(id, digits.as_bytes());
        prop_assert!(g.consume(id, b'\n'));

        let expected: f64 = format!("0.{}", digits).parse().unwrap();
        prop_assert!((value.get() - expected).abs() < 1e-12);
    }
}
