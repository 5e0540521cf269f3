//! Bounded decimal accumulation
//!
//! The integer and decimal-fraction leaves share one accumulator. They differ
//! only in how a digit maps onto the value (place value vs. a growing
//! divisor) and in the direction of their bound:
//!
//! - integers carry an upper bound (`max_value`), checked on every digit
//! - fractions carry a lower bound (`min_accepted_value`), checked once the
//!   delimiter arrives

use std::cell::Cell;
use std::fmt;

use super::error::ParseError;
use super::leaf::Step;

/// Integer types an integer leaf can write into.
///
/// Signed types accept only their non-negative range; signs are parsed by a
/// separate grammar node.
pub trait Integer: Copy {
    /// Widen to the accumulator's domain, clamping negatives to zero
    fn to_bound(self) -> u64;
    /// Narrow from the accumulator's domain, saturating at `Self::MAX`
    fn from_bound(value: u64) -> Self;
}

macro_rules! impl_integer {
    ($($t:ty),* $(,)?) => {
        $(
            impl Integer for $t {
                fn to_bound(self) -> u64 {
                    u64::try_from(self).unwrap_or(0)
                }

                fn from_bound(value: u64) -> Self {
                    <$t>::try_from(value).unwrap_or(<$t>::MAX)
                }
            }
        )*
    };
}

impl_integer!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// Floating point types a fraction leaf can write into
pub trait Fraction: Copy {
    fn from_f64(value: f64) -> Self;
}

impl Fraction for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
}

impl Fraction for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

/// Type-erased integer destination cell
pub(crate) trait IntegerCell {
    fn store(&self, value: u64);
}

impl<T: Integer> IntegerCell for Cell<T> {
    fn store(&self, value: u64) {
        self.set(T::from_bound(value));
    }
}

/// Type-erased fraction destination cell
pub(crate) trait FractionCell {
    fn store(&self, value: f64);
}

impl<T: Fraction> FractionCell for Cell<T> {
    fn store(&self, value: f64) {
        self.set(T::from_f64(value));
    }
}

/// Bound on an accumulated number, with its direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// Every intermediate value must stay at or below this
    AtMost(u64),
    /// The final value must be at or above this
    AtLeast(f64),
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::AtMost(max) => write!(f, "max {}", max),
            Bound::AtLeast(min) => write!(f, "min {}", min),
        }
    }
}

/// Value accumulated so far, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Integer(u64),
    Fraction(f64),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Integer(v) => write!(f, "{}", v),
            Reading::Fraction(v) => write!(f, "{}", v),
        }
    }
}

/// How a digit maps onto the destination
enum Mapping<'a> {
    /// `value = value * 10 + digit`
    Integer(&'a dyn IntegerCell),
    /// `value = numerator / 10^scale`
    Fraction(&'a dyn FractionCell),
}

pub(crate) struct Accumulator<'a> {
    mapping: Mapping<'a>,
    bound: Bound,
    delimiter: u8,
    /// A digit was accepted in this attempt
    seen_digit: bool,
    numerator: u64,
    /// Fraction digits folded into `numerator`
    scale: i32,
}

impl<'a> Accumulator<'a> {
    pub(crate) fn integer(dest: &'a dyn IntegerCell, max_value: u64, delimiter: u8) -> Self {
        Self::new(Mapping::Integer(dest), Bound::AtMost(max_value), delimiter)
    }

    pub(crate) fn fraction(
        dest: &'a dyn FractionCell,
        min_accepted_value: f64,
        delimiter: u8,
    ) -> Self {
        Self::new(
            Mapping::Fraction(dest),
            Bound::AtLeast(min_accepted_value),
            delimiter,
        )
    }

    fn new(mapping: Mapping<'a>, bound: Bound, delimiter: u8) -> Self {
        Self {
            mapping,
            bound,
            delimiter,
            seen_digit: false,
            numerator: 0,
            scale: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.seen_digit = false;
        self.numerator = 0;
        self.scale = 0;
    }

    pub(crate) fn bound(&self) -> Bound {
        self.bound
    }

    pub(crate) fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub(crate) fn reading(&self) -> Reading {
        match self.mapping {
            Mapping::Integer(_) => Reading::Integer(self.numerator),
            Mapping::Fraction(_) => Reading::Fraction(self.fraction_value()),
        }
    }

    pub(crate) fn consume(&mut self, byte: u8) -> Step {
        match byte {
            b'0'..=b'9' => self.push_digit(u64::from(byte - b'0')),
            _ if byte == self.delimiter => {
                if !self.seen_digit {
                    Step::Reject(ParseError::EmptyBeforeDelimiter)
                } else {
                    self.finish()
                }
            }
            _ => Step::Reject(ParseError::UnexpectedCharacter),
        }
    }

    fn push_digit(&mut self, digit: u64) -> Step {
        let next = self
            .numerator
            .checked_mul(10)
            .and_then(|n| n.checked_add(digit));

        match self.mapping {
            Mapping::Integer(dest) => {
                let Some(next) = next else {
                    return Step::Reject(ParseError::NumericOverflow);
                };
                if let Bound::AtMost(max) = self.bound {
                    if next > max {
                        return Step::Reject(ParseError::NumericOverflow);
                    }
                }
                self.numerator = next;
                self.seen_digit = true;
                dest.store(next);
            }
            Mapping::Fraction(dest) => {
                // Past 19 digits the numerator is full; further digits are
                // below f64 precision and are accepted without effect.
                if let Some(next) = next {
                    self.numerator = next;
                    self.scale = self.scale.saturating_add(1);
                }
                self.seen_digit = true;
                dest.store(self.fraction_value());
            }
        }
        Step::Pending
    }

    fn finish(&self) -> Step {
        match self.bound {
            Bound::AtLeast(min) if self.value() < min => Step::Reject(ParseError::NumericUnderflow),
            _ => Step::Complete,
        }
    }

    fn value(&self) -> f64 {
        match self.mapping {
            Mapping::Integer(_) => self.numerator as f64,
            Mapping::Fraction(_) => self.fraction_value(),
        }
    }

    fn fraction_value(&self) -> f64 {
        self.numerator as f64 / 10f64.powi(self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(acc: &mut Accumulator<'_>, input: &[u8]) -> Vec<Step> {
        input.iter().map(|&b| acc.consume(b)).collect()
    }

    #[test]
    fn test_integer_accumulates_place_value() {
        let dest = Cell::new(0u32);
        let mut acc = Accumulator::integer(&dest, 999, b' ');
        let steps = feed(&mut acc, b"123 ");
        assert_eq!(
            steps,
            vec![Step::Pending, Step::Pending, Step::Pending, Step::Complete]
        );
        assert_eq!(dest.get(), 123);
        assert_eq!(acc.reading(), Reading::Integer(123));
    }

    #[test]
    fn test_integer_bound_is_checked_per_digit() {
        let dest = Cell::new(0u32);
        let mut acc = Accumulator::integer(&dest, 999, b' ');
        let steps = feed(&mut acc, b"1234");
        assert_eq!(steps[3], Step::Reject(ParseError::NumericOverflow));
        assert_eq!(dest.get(), 123);
    }

    #[test]
    fn test_integer_u64_overflow_is_rejected() {
        let dest = Cell::new(0u64);
        let mut acc = Accumulator::integer(&dest, u64::MAX, b'\n');
        let steps = feed(&mut acc, b"99999999999999999999");
        assert_eq!(steps.last(), Some(&Step::Reject(ParseError::NumericOverflow)));
    }

    #[test]
    fn test_delimiter_without_digits() {
        let dest = Cell::new(0u8);
        let mut acc = Accumulator::integer(&dest, 200, b' ');
        assert_eq!(
            acc.consume(b' '),
            Step::Reject(ParseError::EmptyBeforeDelimiter)
        );
    }

    #[test]
    fn test_non_digit_is_unexpected() {
        let dest = Cell::new(0u8);
        let mut acc = Accumulator::integer(&dest, 200, b' ');
        assert_eq!(acc.consume(b'x'), Step::Reject(ParseError::UnexpectedCharacter));
    }

    #[test]
    fn test_fraction_meets_minimum_exactly() {
        let dest = Cell::new(0.0f64);
        let mut acc = Accumulator::fraction(&dest, 0.0001, b'\n');
        let steps = feed(&mut acc, b"0001\n");
        assert_eq!(steps.last(), Some(&Step::Complete));
        assert_eq!(dest.get(), 0.0001);
    }

    #[test]
    fn test_fraction_below_minimum() {
        let dest = Cell::new(0.0f64);
        let mut acc = Accumulator::fraction(&dest, 0.0001, b'\n');
        let steps = feed(&mut acc, b"00001\n");
        assert!(steps[..5].iter().all(|s| *s == Step::Pending));
        assert_eq!(steps[5], Step::Reject(ParseError::NumericUnderflow));
    }

    #[test]
    fn test_fraction_ignores_digits_past_precision() {
        let dest = Cell::new(0.0f32);
        let mut acc = Accumulator::fraction(&dest, 0.0, b' ');
        let steps = feed(&mut acc, b"5000000000000000000000000 ");
        assert_eq!(steps.last(), Some(&Step::Complete));
        assert!((dest.get() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_long_run_of_zeros() {
        let dest = Cell::new(7u32);
        let mut acc = Accumulator::integer(&dest, 999, b' ');
        assert!(feed(&mut acc, &[b'0'; 10_000]).iter().all(|s| *s == Step::Pending));
        assert_eq!(acc.consume(b' '), Step::Complete);
        assert_eq!(dest.get(), 0);
    }

    #[test]
    fn test_fraction_scale_saturates() {
        let dest = Cell::new(1.0f64);
        let mut acc = Accumulator::fraction(&dest, 0.0, b' ');
        acc.scale = i32::MAX;
        assert_eq!(acc.consume(b'0'), Step::Pending);
        assert_eq!(acc.scale, i32::MAX);
        assert_eq!(acc.consume(b' '), Step::Complete);
        assert_eq!(dest.get(), 0.0);
    }

    #[test]
    fn test_reset_clears_progress() {
        let dest = Cell::new(0u16);
        let mut acc = Accumulator::integer(&dest, 99, b' ');
        feed(&mut acc, b"9");
        acc.reset();
        assert_eq!(acc.reading(), Reading::Integer(0));
        assert_eq!(
            acc.consume(b' '),
            Step::Reject(ParseError::EmptyBeforeDelimiter)
        );
    }

    #[test]
    fn test_signed_destination_clamps() {
        assert_eq!((-5i64).to_bound(), 0);
        assert_eq!(i8::from_bound(300), i8::MAX);
        assert_eq!(u16::from_bound(65535), u16::MAX);
    }
}
